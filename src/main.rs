//! modsync - CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use modsync::{
    cli::{Args, Command},
    collection::{ModId, UserId},
    config::{validate_api_config, validate_config, Config},
    error::{exit_codes, Error, ErrorCategory, ErrorCode},
    install::ModInstaller,
    output::{
        print_banner, print_collection, print_config_summary, print_error, print_events,
        print_info, print_queue, print_success, print_warning, print_work_report,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_)) => {
            exit_codes::CONFIG_ERROR
        }
        Some(Error::Http(_) | Error::UrlParse(_)) => exit_codes::NETWORK_ERROR,
        Some(Error::Operation(code)) if code.category() == ErrorCategory::Http => {
            exit_codes::NETWORK_ERROR
        }
        Some(
            Error::Operation(_)
            | Error::RetriesExhausted(_)
            | Error::InProgress(_)
            | Error::UnknownMod(_),
        ) => exit_codes::INSTALL_ERROR,
        _ => exit_codes::UNEXPECTED_ERROR,
    }
}

async fn run() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    print_banner();

    // Load configuration
    let config_path = args.config.clone();
    if !config_path.exists() {
        print_warning(&format!(
            "Configuration file not found: {}",
            config_path.display()
        ));
        print_info("Using default configuration with CLI arguments");
    }
    let mut config = Config::load_or_default(&config_path)?;

    args.merge_into_config(&mut config);

    validate_config(&config)?;

    if let Command::Init { force } = args.command {
        if config_path.exists() && !force {
            return Err(Error::Config(format!(
                "{} already exists, pass --force to overwrite",
                config_path.display()
            ))
            .into());
        }
        config.save(&config_path)?;
        print_success(&format!("Wrote {}", config_path.display()));
        return Ok(());
    }
    if args.command.needs_network() {
        validate_api_config(&config)?;
    }

    print_config_summary(
        config.api.game_id,
        &config.root_directory().display().to_string(),
        config.mod_management.default_retries,
    );

    let installer = ModInstaller::from_config(config)?;

    // Ctrl-C cancels whatever operation is in flight; state is rolled back and persisted.
    let cancel = installer.context().cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });

    match args.command {
        Command::Status => {
            let collection = installer.collection();
            let collection = collection.read();
            print_collection(collection.entries());
        }
        Command::Queue => {
            let queue = installer.collection().read().sort_entries_by_retry_priority();
            print_queue(&queue);
        }
        Command::Install { user, mod_id } => {
            // An explicit request gets another attempt this session.
            if let Some(entry) = installer.entry(ModId(mod_id)) {
                entry.clear_no_retry();
            }
            let result = installer.ensure_installed(UserId(user), ModId(mod_id)).await;
            print_events(&installer.drain_events());
            let state = result?;
            print_success(&format!("Mod {} is {}", mod_id, state));
        }
        Command::Unsubscribe { user, mod_id } => {
            let remaining = installer.unsubscribe(UserId(user), ModId(mod_id))?;
            if remaining == 0 {
                print_info(&format!(
                    "Mod {} has no subscribers left and will be uninstalled",
                    mod_id
                ));
            } else {
                print_info(&format!("Mod {} still has {} subscriber(s)", mod_id, remaining));
            }
        }
        Command::Uninstall => {
            let report = installer.process_uninstalls().await?;
            print_events(&installer.drain_events());
            print_work_report(&report);
            fail_on_report(report.failed.len())?;
        }
        Command::Init { .. } => {}
        Command::Sync => {
            for (id, code) in installer.refresh_metadata().await? {
                print_warning(&format!("Could not refresh mod {}: {}", id, code));
            }
            let report = installer.run_pending().await?;
            print_events(&installer.drain_events());
            print_work_report(&report);
            fail_on_report(report.failed.len())?;
        }
    }

    Ok(())
}

fn fail_on_report(failed: usize) -> anyhow::Result<()> {
    if failed > 0 {
        return Err(anyhow::Error::new(Error::Operation(ErrorCode::RetryableInstallError))
            .context(format!("{} mod(s) failed", failed)));
    }
    Ok(())
}
