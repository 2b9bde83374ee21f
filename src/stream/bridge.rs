//! Streaming bridge
//!
//! Turns a push-based transfer job into the blocking pull interface a
//! playback pipeline expects. Chunks arrive on the transfer's execution
//! context and accumulate in `BufferState`; the consumer thread blocks in
//! `read` until the minimum-read threshold is buffered or the transfer
//! terminates. When buffered bytes exceed the preread high-water mark the
//! job is suspended, and resumed once reads drain the buffer back under it.
//!
//! ## Threading
//!
//! One producer context and one consumer thread share `BufferState` under a
//! single mutex with one condition variable. `read` is the only call that
//! blocks, and it re-validates both its wake condition and the transfer
//! generation after every wakeup, so `close`/re-`open` from another thread
//! fail a blocked read instead of hanging it or feeding it the successor
//! transfer's bytes.
//!
//! ## Flow-control states
//!
//! ```text
//!            chunk over high water
//!   Running ----------------------> SuspendedForPreread
//!      |  ^                            |         ^
//!      |  '--- read drains below ------'         |
//!      |                                         | resume() while
//!      | pause()                        pause()  | still over mark
//!      v                                         |
//!   SuspendedForPause ---------------------------'
//!      |
//!      | resume() below mark
//!      '--> Running            (Done / Error are terminal)
//! ```

use crate::config::StreamTuning;
use crate::error::{Error, Result};
use crate::stream::transfer::{TransferConnector, TransferJob, TransferSink};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

/// Transfer flow-control state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferPhase {
    /// Transfer is producing (or about to)
    Running,

    /// Transfer self-suspended because the buffer is over the preread
    /// high-water mark; drains restart it
    SuspendedForPreread,

    /// Consumer explicitly paused; only `resume` restarts it
    SuspendedForPause,

    /// Transport reported a failure
    Error,

    /// Transport delivered everything
    Done,
}

impl TransferPhase {
    fn is_terminal(self) -> bool {
        matches!(self, TransferPhase::Error | TransferPhase::Done)
    }
}

/// Mutable streaming state, guarded by the `Shared` mutex
struct BufferState {
    /// A transfer is open (set by `open`, cleared by `close`/reset)
    open: bool,

    /// Incremented on every reset; blocked reads compare before/after wait
    generation: u64,

    /// Pending chunks in arrival order
    chunks: VecDeque<Bytes>,

    /// Read offset within the first pending chunk
    front_offset: usize,

    /// Unconsumed bytes across all pending chunks
    buffered: usize,

    /// Cumulative bytes handed to the consumer; monotonic per transfer
    cur_position: u64,

    /// Total resource size, -1 until the transport reports it
    file_size: i64,

    phase: TransferPhase,

    /// Message from the transport's error callback
    error_message: Option<String>,

    /// The in-flight job, owned for suspend/resume/cancel
    job: Option<Box<dyn TransferJob>>,
}

impl BufferState {
    fn new() -> Self {
        Self {
            open: false,
            generation: 0,
            chunks: VecDeque::new(),
            front_offset: 0,
            buffered: 0,
            cur_position: 0,
            file_size: -1,
            phase: TransferPhase::Running,
            error_message: None,
            job: None,
        }
    }

    /// Invalidate the current transfer: cancel the job, bump the
    /// generation, release buffered chunks. Caller wakes blocked readers.
    fn reset(&mut self) {
        if let Some(mut job) = self.job.take() {
            job.cancel();
        }
        self.open = false;
        self.generation += 1;
        self.chunks.clear();
        self.front_offset = 0;
        self.buffered = 0;
        self.cur_position = 0;
        self.file_size = -1;
        self.phase = TransferPhase::Running;
        self.error_message = None;
    }
}

/// State shared between the bridge and its transfer sinks
pub(crate) struct Shared {
    state: Mutex<BufferState>,
    /// Signals "more data available or terminal state reached"
    data_ready: Condvar,
    tuning: StreamTuning,
}

impl Shared {
    /// Producer-side chunk arrival
    pub(crate) fn deliver(&self, generation: u64, chunk: Bytes) {
        let mut guard = self.state.lock().unwrap();
        let st = &mut *guard;
        if st.generation != generation || !st.open {
            trace!("dropping {} bytes from a stale transfer", chunk.len());
            return;
        }
        if st.phase.is_terminal() {
            return;
        }

        st.buffered += chunk.len();
        st.chunks.push_back(chunk);

        if st.phase == TransferPhase::Running && st.buffered > self.tuning.preread_high_water {
            if let Some(job) = st.job.as_mut() {
                job.suspend();
            }
            st.phase = TransferPhase::SuspendedForPreread;
            debug!(
                "preread high-water mark exceeded ({} bytes buffered), suspending transfer",
                st.buffered
            );
        }

        // Only one consumer reads at a time; a single wake suffices
        if st.buffered >= self.tuning.min_read {
            self.data_ready.notify_one();
        }
    }

    /// Transport reported the total resource size
    pub(crate) fn set_total_size(&self, generation: u64, size: u64) {
        let mut st = self.state.lock().unwrap();
        if st.generation != generation || !st.open {
            return;
        }
        // Set-once for the lifetime of the transfer
        if st.file_size < 0 {
            st.file_size = size as i64;
            trace!("transfer size known: {} bytes", size);
        }
    }

    /// Transport completed; wake everything so terminal reads observe it
    pub(crate) fn finished(&self, generation: u64) {
        let mut st = self.state.lock().unwrap();
        if st.generation != generation || !st.open {
            return;
        }
        if !st.phase.is_terminal() {
            st.phase = TransferPhase::Done;
            st.job = None;
            debug!("transfer finished with {} bytes still buffered", st.buffered);
        }
        self.data_ready.notify_all();
    }

    /// Transport failed; wake everything so blocked reads observe it
    pub(crate) fn failed(&self, generation: u64, message: &str) {
        let mut st = self.state.lock().unwrap();
        if st.generation != generation || !st.open {
            return;
        }
        warn!("transfer failed: {}", message);
        st.phase = TransferPhase::Error;
        st.error_message = Some(message.to_string());
        st.job = None;
        self.data_ready.notify_all();
    }
}

/// Pull-based consumer interface over an asynchronous transfer
pub struct StreamingBridge {
    shared: Arc<Shared>,
    connector: Arc<dyn TransferConnector>,
}

impl StreamingBridge {
    pub fn new(connector: Arc<dyn TransferConnector>, tuning: StreamTuning) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BufferState::new()),
                data_ready: Condvar::new(),
                tuning,
            }),
            connector,
        }
    }

    /// Open a transfer for `url`, invalidating any previous one
    ///
    /// Safe to call while another thread is blocked in `read` on the old
    /// transfer; that read observes the invalidation and fails.
    pub fn open(&self, url: &str) -> Result<()> {
        let generation = {
            let mut st = self.shared.state.lock().unwrap();
            st.reset();
            self.shared.data_ready.notify_all();
            st.generation
        };

        // Connector runs outside the lock; callbacks cannot deadlock here
        let sink = TransferSink::new(Arc::clone(&self.shared), generation);
        let mut job = self.connector.connect(url, sink)?;

        let mut st = self.shared.state.lock().unwrap();
        if st.generation != generation {
            // Lost a race against a concurrent close/open
            job.cancel();
            return Err(Error::StreamInvalidated);
        }
        job.start()?;
        st.open = true;
        st.phase = TransferPhase::Running;
        st.job = Some(job);
        debug!("opened transfer for {}", url);
        Ok(())
    }

    /// Close the current transfer
    ///
    /// Cancels the job best-effort, invalidates the generation, wakes any
    /// blocked readers, and releases buffered chunks.
    pub fn close(&self) {
        let mut st = self.shared.state.lock().unwrap();
        st.reset();
        self.shared.data_ready.notify_all();
    }

    /// Blocking read of up to `max_bytes` (additionally capped by the
    /// configured maximum read size)
    ///
    /// Waits until the minimum-read threshold is buffered or the transfer
    /// terminates, then returns bytes in arrival order. Returns
    /// `EndOfStream` once a finished transfer is fully drained, `Transfer`
    /// after a transport failure, and `StreamInvalidated` if the transfer
    /// was closed or replaced mid-wait.
    pub fn read(&self, max_bytes: usize) -> Result<Bytes> {
        let max = max_bytes.min(self.shared.tuning.max_read);
        let min = self.shared.tuning.min_read;
        if max == 0 {
            return Ok(Bytes::new());
        }

        let mut guard = self.shared.state.lock().unwrap();
        if !guard.open {
            return Err(Error::NotOpen);
        }
        let generation = guard.generation;

        loop {
            if guard.generation != generation || !guard.open {
                return Err(Error::StreamInvalidated);
            }
            if guard.buffered >= min || (guard.phase.is_terminal() && guard.buffered > 0) {
                break;
            }
            if guard.phase.is_terminal() {
                return match guard.phase {
                    TransferPhase::Error => Err(Error::Transfer(
                        guard
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "transfer error".to_string()),
                    )),
                    _ => Err(Error::EndOfStream),
                };
            }
            guard = self.shared.data_ready.wait(guard).unwrap();
        }

        let st = &mut *guard;
        let first_remaining = st
            .chunks
            .front()
            .map(|c| c.len() - st.front_offset)
            .unwrap_or(0);

        // Fast path: the first chunk alone satisfies the threshold (or is
        // all that is left of a terminal transfer) and can be sliced
        // without copying.
        let out = if first_remaining >= min || (st.chunks.len() == 1 && st.phase.is_terminal()) {
            let take = first_remaining.min(max);
            let chunk = st.chunks.front().expect("non-empty by wake condition");
            let out = chunk.slice(st.front_offset..st.front_offset + take);
            let exhausted = st.front_offset + take == chunk.len();
            st.front_offset += take;
            st.buffered -= take;
            if exhausted {
                st.chunks.pop_front();
                st.front_offset = 0;
            }
            out
        } else {
            // Concatenate whole chunks until the threshold is reached (or
            // chunks run out), capped at the read size.
            let mut scratch: Vec<u8> = Vec::with_capacity(max.min(st.buffered));
            while scratch.len() < min && scratch.len() < max && !st.chunks.is_empty() {
                let chunk = st.chunks.front().expect("checked non-empty");
                let remaining = chunk.len() - st.front_offset;
                let take = remaining.min(max - scratch.len());
                scratch.extend_from_slice(&chunk[st.front_offset..st.front_offset + take]);
                let exhausted = st.front_offset + take == chunk.len();
                st.front_offset += take;
                st.buffered -= take;
                if exhausted {
                    st.chunks.pop_front();
                    st.front_offset = 0;
                }
            }
            Bytes::from(scratch)
        };

        st.cur_position += out.len() as u64;
        Self::resume_if_drained(st, &self.shared.tuning);
        Ok(out)
    }

    /// Explicit consumer pause (e.g. playback pause)
    ///
    /// A transfer already self-suspended for preread stays suspended, but
    /// the pause is recorded so a later `resume` does not restart it while
    /// the buffer is still over the mark.
    pub fn pause(&self) {
        let mut guard = self.shared.state.lock().unwrap();
        let st = &mut *guard;
        match st.phase {
            TransferPhase::Running => {
                if let Some(job) = st.job.as_mut() {
                    job.suspend();
                }
                st.phase = TransferPhase::SuspendedForPause;
                debug!("transfer paused");
            }
            TransferPhase::SuspendedForPreread => {
                st.phase = TransferPhase::SuspendedForPause;
                debug!("transfer paused (was already suspended for preread)");
            }
            _ => {}
        }
    }

    /// Undo an explicit pause
    ///
    /// If the buffer is still over the preread mark the restart is
    /// deferred: the state returns to `SuspendedForPreread` and the next
    /// sufficient drain restarts the job.
    pub fn resume(&self) {
        let mut guard = self.shared.state.lock().unwrap();
        let st = &mut *guard;
        if st.phase != TransferPhase::SuspendedForPause {
            return;
        }
        if st.buffered > self.shared.tuning.preread_high_water {
            st.phase = TransferPhase::SuspendedForPreread;
            debug!("resume deferred, buffer still over preread mark");
        } else {
            if let Some(job) = st.job.as_mut() {
                job.resume();
            }
            st.phase = TransferPhase::Running;
            debug!("transfer resumed");
        }
    }

    /// Cumulative bytes handed to the consumer on the open transfer
    pub fn current_position(&self) -> u64 {
        self.shared.state.lock().unwrap().cur_position
    }

    /// Total resource size, or -1 while the transport has not reported it
    ///
    /// Never a stale zero: callers can distinguish "unknown" from "empty".
    pub fn total_size(&self) -> i64 {
        self.shared.state.lock().unwrap().file_size
    }

    /// Whether a transfer is currently open
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().unwrap().open
    }

    fn resume_if_drained(st: &mut BufferState, tuning: &StreamTuning) {
        if st.phase == TransferPhase::SuspendedForPreread
            && st.buffered <= tuning.preread_high_water
        {
            if let Some(job) = st.job.as_mut() {
                job.resume();
            }
            st.phase = TransferPhase::Running;
            debug!("buffer drained to {} bytes, resuming transfer", st.buffered);
        }
    }

    #[cfg(test)]
    fn phase(&self) -> TransferPhase {
        self.shared.state.lock().unwrap().phase
    }
}

// Snapshot accessors take the same mutex as everything else; keep them out
// of hot audio paths.
impl std::fmt::Debug for StreamingBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st: MutexGuard<'_, BufferState> = self.shared.state.lock().unwrap();
        f.debug_struct("StreamingBridge")
            .field("open", &st.open)
            .field("generation", &st.generation)
            .field("buffered", &st.buffered)
            .field("cur_position", &st.cur_position)
            .field("file_size", &st.file_size)
            .field("phase", &st.phase)
            .finish()
    }
}
