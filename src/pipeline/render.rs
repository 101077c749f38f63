/// Background rendering: the request queue and its single worker.
///
/// One worker thread per image context serializes every pipeline
/// execution. The foreground posts (preset snapshot, size, purpose) jobs
/// and returns immediately; completions come back over a result channel
/// the foreground drains, so callbacks always run on the issuing side,
/// never on the worker.
///
/// Supersession is a monotonic sequence number per (caller, purpose):
/// a newer request makes every older one for the same identity stale.
/// Staleness is checked three times: before rendering, after rendering,
/// and again at delivery, so the UI can never watch an old preview
/// overwrite a fresher one. Cancellation is cooperative: an in-flight
/// render is never interrupted, its result is just dropped.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::imageops::{self, FilterType};

use crate::error::PipelineError;
use crate::pipeline::cache::{BitmapCache, BufferKind};
use crate::pipeline::preset::ImagePreset;
use crate::Bitmap;

/// What a render is for. Purpose picks the cache partition and decides
/// whether the working buffer may be downscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderingPurpose {
    Icon,
    Preview,
    Full,
}

impl RenderingPurpose {
    fn buffer_kind(self) -> BufferKind {
        match self {
            RenderingPurpose::Icon => BufferKind::Icon,
            RenderingPurpose::Preview => BufferKind::Preview,
            RenderingPurpose::Full => BufferKind::Full,
        }
    }
}

/// Identity of a requesting view/editor, minted by `CallerRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(u64);

/// Completion callback surface. `available` fires at most once per
/// request, with `None` on failure. Stale and detached requests fire
/// nothing at all.
pub trait RenderingRequestCaller {
    fn available(&mut self, bitmap: Option<Bitmap>);
}

/// Foreground-side book of live callers. Unregistering detaches a
/// caller: anything still in flight for it is dropped at delivery.
#[derive(Default)]
pub struct CallerRegistry {
    next_id: u64,
    handlers: HashMap<CallerId, Box<dyn RenderingRequestCaller>>,
}

impl CallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn RenderingRequestCaller>) -> CallerId {
        self.next_id += 1;
        let id = CallerId(self.next_id);
        self.handlers.insert(id, handler);
        id
    }

    pub fn unregister(&mut self, id: CallerId) {
        self.handlers.remove(&id);
    }

    pub fn is_registered(&self, id: CallerId) -> bool {
        self.handlers.contains_key(&id)
    }
}

/// One render job: an immutable value. The preset is a defensive
/// snapshot taken at post time, so the UI can keep editing its live
/// preset while this renders.
#[derive(Debug, Clone)]
struct RenderingRequest {
    preset: ImagePreset,
    width: u32,
    height: u32,
    purpose: RenderingPurpose,
    caller: CallerId,
    sequence: u64,
}

/// A finished render on its way back to the foreground.
#[derive(Debug)]
pub struct RenderingResult {
    pub caller: CallerId,
    pub purpose: RenderingPurpose,
    pub sequence: u64,
    /// `None` when the render failed; never a partial frame.
    pub bitmap: Option<Bitmap>,
}

enum WorkerMessage {
    Job(RenderingRequest),
    OneShot {
        preset: ImagePreset,
        width: u32,
        height: u32,
        purpose: RenderingPurpose,
        reply: mpsc::Sender<Result<Bitmap, PipelineError>>,
    },
    Recycle(Bitmap, BufferKind),
}

type LatestMap = Mutex<HashMap<(CallerId, RenderingPurpose), u64>>;

pub struct RenderQueue {
    submit_tx: mpsc::Sender<WorkerMessage>,
    result_rx: Mutex<mpsc::Receiver<RenderingResult>>,
    latest: Arc<LatestMap>,
    next_sequence: AtomicU64,
}

impl RenderQueue {
    /// Spin up the worker for one source image. The worker owns the
    /// source and the bitmap pool; it exits when the queue is dropped.
    pub fn new(source: Bitmap) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel::<WorkerMessage>();
        let (result_tx, result_rx) = mpsc::channel::<RenderingResult>();
        let latest: Arc<LatestMap> = Arc::default();

        spawn_worker(source, submit_rx, result_tx, Arc::clone(&latest));

        Self {
            submit_tx,
            result_rx: Mutex::new(result_rx),
            latest,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Enqueue a render and return immediately. The returned sequence
    /// number supersedes every earlier request for the same
    /// (caller, purpose).
    pub fn post_request(
        &self,
        caller: CallerId,
        purpose: RenderingPurpose,
        preset: &ImagePreset,
        width: u32,
        height: u32,
    ) -> Result<u64, PipelineError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut latest) = self.latest.lock() {
            latest.insert((caller, purpose), sequence);
        }
        let request = RenderingRequest {
            preset: preset.clone(),
            width,
            height,
            purpose,
            caller,
            sequence,
        };
        self.submit_tx
            .send(WorkerMessage::Job(request))
            .map_err(|_| PipelineError::QueueDisconnected)?;
        Ok(sequence)
    }

    /// Square icon render for the filter strip.
    pub fn post_icon_request(
        &self,
        caller: CallerId,
        preset: &ImagePreset,
        size: u32,
    ) -> Result<u64, PipelineError> {
        self.post_request(caller, RenderingPurpose::Icon, preset, size, size)
    }

    /// Drain finished renders and invoke callbacks on this (the
    /// issuing) side. Results superseded since completion, and results
    /// for callers no longer registered, are dropped silently. Returns
    /// how many callbacks fired.
    pub fn deliver_completed(&self, registry: &mut CallerRegistry) -> usize {
        // Drain under the lock, dispatch after releasing it, so a
        // callback that posts or drains again cannot deadlock.
        let pending: Vec<RenderingResult> = match self.result_rx.lock() {
            Ok(receiver) => receiver.try_iter().collect(),
            Err(_) => return 0,
        };
        let mut delivered = 0;
        for result in pending {
            if self.is_stale(result.caller, result.purpose, result.sequence) {
                log::debug!(
                    "dropping superseded render (caller {:?}, seq {})",
                    result.caller,
                    result.sequence
                );
                continue;
            }
            match registry.handlers.get_mut(&result.caller) {
                Some(handler) => {
                    handler.available(result.bitmap);
                    delivered += 1;
                }
                None => {
                    // Caller detached while the render was in flight.
                    log::debug!("dropping render for detached caller {:?}", result.caller);
                }
            }
        }
        delivered
    }

    /// Give a delivered bitmap back to the worker's pool once the UI has
    /// replaced it. The caller must not touch the pixels afterwards.
    pub fn recycle(&self, bitmap: Bitmap, purpose: RenderingPurpose) {
        let _ = self
            .submit_tx
            .send(WorkerMessage::Recycle(bitmap, purpose.buffer_kind()));
    }

    /// The one narrow synchronous path: render now and block briefly,
    /// for one-shot work like precomputing a transition snapshot. The
    /// job still goes through the worker FIFO; after `timeout` the
    /// operation counts as failed rather than hanging.
    pub fn render_blocking(
        &self,
        preset: &ImagePreset,
        width: u32,
        height: u32,
        purpose: RenderingPurpose,
        timeout: Duration,
    ) -> Result<Bitmap, PipelineError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.submit_tx
            .send(WorkerMessage::OneShot {
                preset: preset.clone(),
                width,
                height,
                purpose,
                reply: reply_tx,
            })
            .map_err(|_| PipelineError::QueueDisconnected)?;
        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(PipelineError::RenderTimeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::QueueDisconnected),
        }
    }

    fn is_stale(&self, caller: CallerId, purpose: RenderingPurpose, sequence: u64) -> bool {
        match self.latest.lock() {
            Ok(latest) => latest
                .get(&(caller, purpose))
                .is_some_and(|&newest| newest > sequence),
            Err(_) => false,
        }
    }
}

fn spawn_worker(
    source: Bitmap,
    submit_rx: mpsc::Receiver<WorkerMessage>,
    result_tx: mpsc::Sender<RenderingResult>,
    latest: Arc<LatestMap>,
) {
    thread::spawn(move || {
        let mut cache = BitmapCache::new();
        let stale = |request: &RenderingRequest| -> bool {
            match latest.lock() {
                Ok(map) => map
                    .get(&(request.caller, request.purpose))
                    .is_some_and(|&newest| newest > request.sequence),
                Err(_) => false,
            }
        };

        while let Ok(message) = submit_rx.recv() {
            match message {
                WorkerMessage::Job(request) => {
                    if stale(&request) {
                        log::debug!("skipping superseded render seq {}", request.sequence);
                        continue;
                    }
                    let bitmap = match execute(&source, &request.preset, request.width, request.height, request.purpose) {
                        Ok(rendered) => {
                            // Stage the result in a pooled buffer so
                            // repeated same-size frames reuse memory.
                            let mut out = cache.get_bitmap(
                                rendered.width(),
                                rendered.height(),
                                request.purpose.buffer_kind(),
                            );
                            out.copy_from_slice(&rendered);
                            Some(out)
                        }
                        Err(err) => {
                            log::warn!("render failed (seq {}): {}", request.sequence, err);
                            None
                        }
                    };
                    if stale(&request) {
                        // Superseded while rendering; give the buffer
                        // straight back instead of delivering it.
                        if let Some(bitmap) = bitmap {
                            cache.cache(bitmap, request.purpose.buffer_kind());
                        }
                        continue;
                    }
                    let result = RenderingResult {
                        caller: request.caller,
                        purpose: request.purpose,
                        sequence: request.sequence,
                        bitmap,
                    };
                    if result_tx.send(result).is_err() {
                        return;
                    }
                }
                WorkerMessage::OneShot {
                    preset,
                    width,
                    height,
                    purpose,
                    reply,
                } => {
                    let result = execute(&source, &preset, width, height, purpose);
                    // A caller that timed out already hung up; fine.
                    let _ = reply.send(result);
                }
                WorkerMessage::Recycle(bitmap, kind) => {
                    cache.cache(bitmap, kind);
                }
            }
        }
    });
}

/// Run one render at the right resolution for its purpose.
///
/// Icon/preview requests work on a downscaled source when every filter
/// in the preset tolerates it; one spatial filter forces the full
/// pipeline at full resolution, scaled only at the end.
fn execute(
    source: &Bitmap,
    preset: &ImagePreset,
    width: u32,
    height: u32,
    purpose: RenderingPurpose,
) -> Result<Bitmap, PipelineError> {
    match purpose {
        RenderingPurpose::Full => preset.apply_to(source),
        RenderingPurpose::Icon | RenderingPurpose::Preview => {
            if preset.supports_partial_rendering() {
                let scaled = scale_to_fit(source, width, height);
                preset.apply_to(&scaled)
            } else {
                let full = preset.apply_to(source)?;
                Ok(scale_to_fit(&full, width, height))
            }
        }
    }
}

/// Aspect-preserving downscale to fit within `max_w` x `max_h`.
/// Never upscales.
pub fn scale_to_fit(src: &Bitmap, max_w: u32, max_h: u32) -> Bitmap {
    let (w, h) = src.dimensions();
    if (w <= max_w && h <= max_h) || max_w == 0 || max_h == 0 {
        return src.clone();
    }
    let ratio = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let nw = ((w as f64 * ratio).round() as u32).max(1);
    let nh = ((h as f64 * ratio).round() as u32).max(1);
    imageops::resize(src, nw, nh, FilterType::Lanczos3)
}

/// One-shot render off the queue entirely, for exports and other work
/// that owns its own source copy.
pub async fn render_detached(
    preset: ImagePreset,
    source: Bitmap,
    width: u32,
    height: u32,
) -> Result<Bitmap, PipelineError> {
    tokio::task::spawn_blocking(move || {
        let rendered = preset.apply_to(&source)?;
        Ok(scale_to_fit(&rendered, width, height))
    })
    .await
    .map_err(|err| PipelineError::WorkerJoin(err.to_string()))?
}
