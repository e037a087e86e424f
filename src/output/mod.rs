//! Output module for console output and reports.
//!
//! Provides:
//! - Colored console output
//! - Collection, queue and work reports

pub mod console;
pub mod report;

pub use console::{
    print_banner, print_config_summary, print_error, print_info, print_success, print_warning,
};
pub use report::{print_collection, print_events, print_queue, print_work_report};
