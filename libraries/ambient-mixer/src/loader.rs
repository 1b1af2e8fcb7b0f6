//! Background buffer loader
//!
//! Decoding a loop means file I/O plus a full decode and resample, which can
//! take hundreds of milliseconds for long sources. The loader does that work
//! on a dedicated thread so neither the host thread nor the audio tick waits
//! on it.
//!
//! ```text
//! Host Thread                    Loader Thread
//!      │                              │
//!      │  request(id, source)         │
//!      │─────────────────────────────>│
//!      │                              │ SourceDecoder::decode()
//!      │                              │
//!      │  poll_ready() -> Some(res)   │
//!      │<─────────────────────────────│
//! ```
//!
//! After [`BufferLoader::shutdown`] any decode still in flight finishes but
//! its result is discarded.

use crate::buffer::{AudioSource, DecodedBuffer, SourceDecoder};
use crate::error::{MixerError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const QUEUE_CAPACITY: usize = 16;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Request to decode one track's source
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Track id
    pub id: String,
    /// Encoded source
    pub source: AudioSource,
}

/// Finished decode
#[derive(Debug)]
pub struct LoadResult {
    /// Track id
    pub id: String,
    /// Decoded buffer or the decoder's error
    pub result: Result<DecodedBuffer>,
}

/// Decodes sources on a background thread
pub struct BufferLoader {
    request_tx: Sender<LoadRequest>,
    result_rx: Receiver<LoadResult>,
    shutdown: Arc<AtomicBool>,
    /// Requests accepted whose result has not been polled yet
    in_flight: AtomicUsize,
}

impl BufferLoader {
    /// Spawn the loader thread
    ///
    /// # Errors
    /// Returns an IO error if the thread cannot be spawned.
    pub fn new(decoder: Arc<dyn SourceDecoder>, target_sample_rate: u32) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<LoadRequest>(QUEUE_CAPACITY);
        let (result_tx, result_rx) = bounded::<LoadResult>(QUEUE_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        thread::Builder::new()
            .name("buffer-loader".to_string())
            .spawn(move || {
                Self::loader_thread(
                    decoder.as_ref(),
                    target_sample_rate,
                    &request_rx,
                    &result_tx,
                    &shutdown_flag,
                );
            })?;

        Ok(Self {
            request_tx,
            result_rx,
            shutdown,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Queue a decode (non-blocking)
    ///
    /// # Errors
    /// [`MixerError::LoadQueueFull`] when too many decodes are pending,
    /// [`MixerError::Disposed`] once the loader has shut down.
    pub fn request(&self, id: impl Into<String>, source: AudioSource) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(MixerError::Disposed);
        }

        let request = LoadRequest {
            id: id.into(),
            source,
        };
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        match self.request_tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(request)) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(MixerError::LoadQueueFull(request.id))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(MixerError::Disposed)
            }
        }
    }

    /// Next finished decode, if any (non-blocking)
    pub fn poll_ready(&self) -> Option<LoadResult> {
        match self.result_rx.try_recv() {
            Ok(result) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Some(result)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Whether an accepted request has not been polled yet
    ///
    /// Counts the decode currently running on the loader thread too.
    pub fn is_loading(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire) && self.in_flight.load(Ordering::Acquire) > 0
    }

    /// Stop the loader thread; late results are dropped
    ///
    /// The thread is not joined: a decode in progress finishes on its own and
    /// the thread exits right after.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn loader_thread(
        decoder: &dyn SourceDecoder,
        target_sample_rate: u32,
        request_rx: &Receiver<LoadRequest>,
        result_tx: &Sender<LoadResult>,
        shutdown: &AtomicBool,
    ) {
        debug!("Buffer loader started");

        while !shutdown.load(Ordering::Acquire) {
            let request = match request_rx.recv_timeout(POLL_INTERVAL) {
                Ok(request) => request,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let start = Instant::now();
            let result = decoder.decode(&request.source, target_sample_rate);

            if shutdown.load(Ordering::Acquire) {
                debug!(id = %request.id, "Decode finished after shutdown, discarding");
                break;
            }

            match &result {
                Ok(buffer) => info!(
                    id = %request.id,
                    frames = buffer.frames(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Decoded in background"
                ),
                Err(e) => warn!(id = %request.id, error = %e, "Background decode failed"),
            }

            if result_tx
                .send(LoadResult {
                    id: request.id,
                    result,
                })
                .is_err()
            {
                break;
            }
        }

        debug!("Buffer loader exiting");
    }
}

impl Drop for BufferLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}
