//! Transfer job seam
//!
//! The streaming bridge does not implement any transport itself. A
//! `TransferConnector` builds a `TransferJob` for a URL; the job pushes
//! bytes, its total size, and its terminal result into the bridge through
//! the `TransferSink` it was given, from whatever execution context it
//! runs on.

use crate::error::Result;
use crate::stream::bridge::Shared;
use bytes::Bytes;
use std::sync::Arc;

/// An in-flight asynchronous byte fetch
///
/// Control methods are called by the bridge, sometimes from inside its own
/// lock: they must be non-blocking (flag flips, wakeups) and must never
/// call back into the sink synchronously. `cancel` is best-effort; late
/// callbacks after it are dropped by the sink's generation check.
pub trait TransferJob: Send {
    /// Begin the transfer; bytes start flowing into the sink
    fn start(&mut self) -> Result<()>;

    /// Stop producing until `resume` (preread backpressure or user pause)
    fn suspend(&mut self);

    /// Continue producing after a `suspend`
    fn resume(&mut self);

    /// Abort the transfer without waiting for it to wind down
    fn cancel(&mut self);
}

/// Factory turning a URL into a transfer job bound to a sink
pub trait TransferConnector: Send + Sync {
    fn connect(&self, url: &str, sink: TransferSink) -> Result<Box<dyn TransferJob>>;
}

/// Producer-side handle into the bridge's buffer
///
/// Cloneable and cheap; every call is tagged with the transfer generation
/// it was created for, so callbacks from a cancelled or replaced transfer
/// are discarded instead of corrupting the successor's buffer.
#[derive(Clone)]
pub struct TransferSink {
    shared: Arc<Shared>,
    generation: u64,
}

impl TransferSink {
    pub(crate) fn new(shared: Arc<Shared>, generation: u64) -> Self {
        Self { shared, generation }
    }

    /// Append an arrived chunk to the buffer
    pub fn deliver(&self, chunk: Bytes) {
        self.shared.deliver(self.generation, chunk);
    }

    /// Report the total resource size once the transport learns it
    pub fn set_total_size(&self, size: u64) {
        self.shared.set_total_size(self.generation, size);
    }

    /// Mark the transfer complete; buffered bytes remain readable
    pub fn finished(&self) {
        self.shared.finished(self.generation);
    }

    /// Mark the transfer failed
    pub fn failed(&self, message: &str) {
        self.shared.failed(self.generation, message);
    }
}
