//! Streaming I/O bridge
//!
//! Pull-based, backpressure-aware buffering over asynchronous transfers.

pub mod bridge;
pub mod file;
pub mod transfer;

pub use bridge::StreamingBridge;
pub use file::FileTransferConnector;
pub use transfer::{TransferConnector, TransferJob, TransferSink};
