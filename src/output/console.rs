//! Console output utilities.

use console::{style, StyledObject};

fn line(tag: StyledObject<&str>, message: &str) -> String {
    format!("{:>6} {}", tag, message)
}

/// Print an informational line.
pub fn print_info(message: &str) {
    println!("{}", line(style("info").cyan().bold(), message));
}

/// Print a line for something that finished well.
pub fn print_success(message: &str) {
    println!("{}", line(style("done").green().bold(), message));
}

pub fn print_warning(message: &str) {
    println!("{}", line(style("warn").yellow().bold(), message));
}

/// Print an error line to stderr.
pub fn print_error(message: &str) {
    eprintln!("{}", line(style("error").red().bold(), message));
}

/// Print the application banner.
pub fn print_banner() {
    let banner = format!(
        r#"
╔═══════════════════════════════════════════════════════╗
║     modsync {:<42}║
║     Mod collection manager                            ║
╚═══════════════════════════════════════════════════════╝
"#,
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style(banner).cyan());
}

/// Print configuration summary.
pub fn print_config_summary(game_id: u64, storage_root: &str, retries: u8) {
    println!();
    println!("{}", style("Configuration:").bold());
    if game_id == 0 {
        println!("  Game:    {}", style("not configured").yellow());
    } else {
        println!("  Game:    {}", game_id);
    }
    println!("  Storage: {}", storage_root);
    println!("  Retries: {} per session", retries);
    println!();
}
