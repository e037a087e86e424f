//! Integrity checks for downloaded mod files.

use std::sync::Arc;

use md5::{Digest, Md5};
use tracing::{debug, warn};

use crate::collection::FileInfo;
use crate::error::{ErrorCode, OpResult};
use crate::fs::FileChannel;
use crate::ops::{drive, PollSettings, ReadSomeFromFile};

/// Check a downloaded file against the size and MD5 the server published.
///
/// Missing expectations are skipped. A mismatch is a retryable install failure.
pub async fn verify_download(
    channel: Arc<dyn FileChannel>,
    file: &FileInfo,
    chunk_size: usize,
    poll: PollSettings,
) -> OpResult<()> {
    let chunk_size = chunk_size.max(1);
    let mut hasher = Md5::new();
    let mut length: u64 = 0;

    loop {
        let bytes = drive(ReadSomeFromFile::new(channel.clone(), length, chunk_size, poll)).await?;
        hasher.update(&bytes);
        length += bytes.len() as u64;
        if bytes.len() < chunk_size {
            break;
        }
    }

    if file.filesize != 0 && file.filesize != length {
        warn!(
            "Size mismatch for {}: expected {} bytes, got {}",
            channel.path().display(),
            file.filesize,
            length
        );
        return Err(ErrorCode::RetryableInstallError);
    }

    if let Some(expected) = file.filehash_md5.as_deref().filter(|hash| !hash.is_empty()) {
        let actual = format!("{:x}", hasher.finalize());
        if !expected.eq_ignore_ascii_case(&actual) {
            warn!(
                "Hash mismatch for {}: expected {}, got {}",
                channel.path().display(),
                expected,
                actual
            );
            return Err(ErrorCode::RetryableInstallError);
        }
    }

    debug!("Verified {} ({} bytes)", channel.path().display(), length);
    Ok(())
}
