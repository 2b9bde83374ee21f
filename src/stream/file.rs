//! Local-file transfer connector
//!
//! Reference transport for `file://` URLs and plain paths: a worker thread
//! reads fixed-size chunks and pushes them into the sink, honoring
//! suspend/resume through a flag-and-condvar pair and cancel through an
//! atomic. Network transports implement the same `TransferJob` seam.

use crate::error::{Error, Result};
use crate::stream::transfer::{TransferConnector, TransferJob, TransferSink};
use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use tracing::debug;

const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Connector producing file-backed transfer jobs
pub struct FileTransferConnector {
    chunk_size: usize,
}

impl FileTransferConnector {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl Default for FileTransferConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferConnector for FileTransferConnector {
    fn connect(&self, url: &str, sink: TransferSink) -> Result<Box<dyn TransferJob>> {
        let path = local_path(url)?;
        Ok(Box::new(FileTransferJob {
            path,
            chunk_size: self.chunk_size,
            sink: Some(sink),
            flow: Arc::new(FlowControl::default()),
        }))
    }
}

/// Map a URL to a local path; only `file://` and plain paths are local
fn local_path(url: &str) -> Result<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Ok(PathBuf::from(path))
    } else if url.contains("://") {
        Err(Error::Transfer(format!("unsupported url scheme: {}", url)))
    } else {
        Ok(PathBuf::from(url))
    }
}

/// Shared flow-control flags between the job handle and its worker thread
#[derive(Default)]
struct FlowControl {
    cancelled: AtomicBool,
    suspended: Mutex<bool>,
    resumed: Condvar,
}

impl FlowControl {
    /// Park while suspended; returns false once the job is cancelled
    fn wait_while_suspended(&self) -> bool {
        let mut suspended = self.suspended.lock().unwrap();
        while *suspended && !self.cancelled.load(Ordering::Acquire) {
            suspended = self.resumed.wait(suspended).unwrap();
        }
        !self.cancelled.load(Ordering::Acquire)
    }
}

struct FileTransferJob {
    path: PathBuf,
    chunk_size: usize,
    sink: Option<TransferSink>,
    flow: Arc<FlowControl>,
}

impl TransferJob for FileTransferJob {
    fn start(&mut self) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| Error::Internal("file transfer already started".to_string()))?;
        let path = self.path.clone();
        let flow = Arc::clone(&self.flow);
        let chunk_size = self.chunk_size;

        thread::Builder::new()
            .name("mountstream-file".to_string())
            .spawn(move || {
                let mut file = match File::open(&path) {
                    Ok(file) => file,
                    Err(e) => {
                        sink.failed(&format!("cannot open {}: {}", path.display(), e));
                        return;
                    }
                };
                if let Ok(metadata) = file.metadata() {
                    sink.set_total_size(metadata.len());
                }
                debug!("streaming {} in {} byte chunks", path.display(), chunk_size);

                let mut buf = vec![0u8; chunk_size];
                loop {
                    if !flow.wait_while_suspended() {
                        debug!("file transfer for {} cancelled", path.display());
                        return;
                    }
                    match file.read(&mut buf) {
                        Ok(0) => {
                            sink.finished();
                            return;
                        }
                        Ok(n) => sink.deliver(Bytes::copy_from_slice(&buf[..n])),
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            sink.failed(&format!("read error on {}: {}", path.display(), e));
                            return;
                        }
                    }
                }
            })?;
        Ok(())
    }

    fn suspend(&mut self) {
        *self.flow.suspended.lock().unwrap() = true;
    }

    fn resume(&mut self) {
        *self.flow.suspended.lock().unwrap() = false;
        self.flow.resumed.notify_all();
    }

    fn cancel(&mut self) {
        self.flow.cancelled.store(true, Ordering::Release);
        self.flow.resumed.notify_all();
    }
}
