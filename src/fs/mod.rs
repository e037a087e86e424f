//! Filesystem module.
//!
//! Provides:
//! - Positional file channels for the operation layer
//! - Install and staging path management
//! - Filename sanitizing for remote names

pub mod channel;
pub mod naming;
pub mod paths;

pub use channel::{FileChannel, FileMode, IoOutcome, IoStart, PendingIo, StdFileChannel};
pub use naming::{installed_file_name, sanitize_filename, staging_file_name};
pub use paths::{dir_size, ensure_dir, installed_file_path, mod_install_path, staging_path};
