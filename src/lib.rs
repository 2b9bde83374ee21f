//! # mountstream
//!
//! Mount-point resolution and buffered streaming I/O for media players.
//!
//! **Purpose:** let a media catalog persist tracks as stable
//! `(device id, relative path)` pairs that survive remounts of removable or
//! network-backed storage, and feed playback pipelines through a pull-based,
//! backpressure-aware streaming buffer.
//!
//! Two independent components:
//! - [`DeviceRegistry`](device::DeviceRegistry): live device-id → mount-path
//!   mapping with bidirectional path translation, pluggable device handlers,
//!   and collection root-folder policy.
//! - [`StreamingBridge`](stream::StreamingBridge): producer/consumer buffer
//!   turning an event-driven transfer job into a blocking read interface
//!   with preread flow control.
//!
//! Persistence (the media catalog) and transports (transfer jobs) are seams
//! implemented by the embedding application; SQLite and local-file backends
//! ship in-crate.

pub mod catalog;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod paths;
pub mod stream;

pub use config::{Config, StreamTuning};
pub use error::{Error, Result};
