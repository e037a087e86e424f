//! Positional file access that can complete later.
//!
//! Small transfers finish inline. Larger ones run on the blocking pool and are
//! polled for completion, the way a native overlapped handle would be.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::error::{ErrorCode, OpResult, Result};
use crate::ops::{CancellationToken, Completion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    ReadOnly,
    ReadWrite,
}

/// What a finished transfer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoOutcome {
    Written(usize),
    Read(Bytes),
}

/// A transfer still running in the background.
#[derive(Debug)]
pub struct PendingIo {
    completion: Completion<IoOutcome>,
    task: Option<JoinHandle<()>>,
}

impl PendingIo {
    pub fn new(completion: Completion<IoOutcome>, task: Option<JoinHandle<()>>) -> Self {
        Self { completion, task }
    }

    /// The result, once the transfer has finished.
    pub fn poll(&mut self) -> Option<OpResult<IoOutcome>> {
        let result = self.completion.take();
        if result.is_some() {
            self.task = None;
        }
        result
    }

    /// Stop waiting for the transfer. A write already handed to the OS may
    /// still land.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// How a transfer started.
#[derive(Debug)]
pub enum IoStart {
    Complete(IoOutcome),
    Pending(PendingIo),
}

/// An open file that supports positional transfers.
pub trait FileChannel: Send + Sync {
    fn path(&self) -> &Path;

    fn mode(&self) -> FileMode;

    /// Whether operations on this file should stop.
    fn should_cancel(&self) -> bool;

    fn begin_write(&self, offset: u64, data: Bytes) -> OpResult<IoStart>;

    fn begin_read(&self, offset: u64, len: usize) -> OpResult<IoStart>;
}

/// [`FileChannel`] over a `std::fs::File`.
#[derive(Debug)]
pub struct StdFileChannel {
    path: PathBuf,
    mode: FileMode,
    file: Arc<Mutex<File>>,
    cancel: CancellationToken,
    sync_threshold: usize,
}

impl StdFileChannel {
    /// Open `path`. Read-write channels create the file if it does not exist.
    ///
    /// Transfers of at most `sync_threshold` bytes complete inline.
    pub fn open(
        path: impl Into<PathBuf>,
        mode: FileMode,
        cancel: CancellationToken,
        sync_threshold: usize,
    ) -> Result<Self> {
        let path = path.into();
        let file = match mode {
            FileMode::ReadOnly => File::open(&path)?,
            FileMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?,
        };
        Ok(Self {
            path,
            mode,
            file: Arc::new(Mutex::new(file)),
            cancel,
            sync_threshold,
        })
    }

    /// Flush written data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn run<F>(&self, inline: bool, job: F) -> OpResult<IoStart>
    where
        F: FnOnce(&Mutex<File>) -> OpResult<IoOutcome> + Send + 'static,
    {
        if inline {
            return job(&self.file).map(IoStart::Complete);
        }

        let runtime = Handle::try_current().map_err(|e| {
            warn!("No runtime available for background I/O: {}", e);
            ErrorCode::ResourceExhausted
        })?;
        let completion = Completion::new();
        let worker = completion.clone();
        let file = Arc::clone(&self.file);
        let task = runtime.spawn_blocking(move || worker.complete(job(&file)));
        Ok(IoStart::Pending(PendingIo::new(completion, Some(task))))
    }
}

fn write_at(file: &Mutex<File>, offset: u64, data: &[u8]) -> OpResult<IoOutcome> {
    let mut file = file.lock();
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(data))
        .map_err(|e| {
            error!("Write of {} bytes at {} failed: {}", data.len(), offset, e);
            match ErrorCode::from_io(&e) {
                ErrorCode::NoPermission => ErrorCode::NoPermission,
                _ => ErrorCode::WriteError,
            }
        })?;
    Ok(IoOutcome::Written(data.len()))
}

fn read_at(file: &Mutex<File>, offset: u64, len: usize) -> OpResult<IoOutcome> {
    let mut file = file.lock();
    let mut buffer = BytesMut::zeroed(len);
    let mut filled = 0;
    let result = file.seek(SeekFrom::Start(offset)).and_then(|_| {
        while filled < len {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    });
    if let Err(e) = result {
        error!("Read of {} bytes at {} failed: {}", len, offset, e);
        return Err(ErrorCode::ReadError);
    }
    buffer.truncate(filled);
    Ok(IoOutcome::Read(buffer.freeze()))
}

impl FileChannel for StdFileChannel {
    fn path(&self) -> &Path {
        &self.path
    }

    fn mode(&self) -> FileMode {
        self.mode
    }

    fn should_cancel(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn begin_write(&self, offset: u64, data: Bytes) -> OpResult<IoStart> {
        trace!("Begin write of {} bytes at {} to {}", data.len(), offset, self.path.display());
        let inline = data.len() <= self.sync_threshold;
        self.run(inline, move |file| write_at(file, offset, &data))
    }

    fn begin_read(&self, offset: u64, len: usize) -> OpResult<IoStart> {
        trace!("Begin read of {} bytes at {} from {}", len, offset, self.path.display());
        let inline = len <= self.sync_threshold;
        self.run(inline, move |file| read_at(file, offset, len))
    }
}
