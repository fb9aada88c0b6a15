//! Load telemetry: wall-clock durations and transferred bytes for the model
//! and its textures, plus the loading/progress aggregate the UI reads.
//!
//! The tracker is shared between the load tasks and the render loop, so all
//! state lives behind one mutex. Counters are only ever touched from the
//! session's own tasks and the contention window is a few microseconds.
//!
//! The `total` size is always derived from model + textures at snapshot
//! time; it is never stored or computed independently of them. The `total`
//! duration is synthetic: it marks the first frame rendered after loading
//! completed.

use std::collections::HashSet;
use std::sync::Mutex;

use instant::Instant;

/// One measured load: wall-clock duration and transferred bytes, either of
/// which may still be unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Track {
    pub duration_ms: Option<u64>,
    pub size_bytes: Option<u64>,
}

/// Snapshot of all metrics, safe to hand to the display layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadMetrics {
    pub total: Track,
    pub model: Track,
    pub textures: Track,
}

/// One texture load attempt, for operator inspection.
#[cfg(feature = "trace")]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub path: String,
    pub ok: bool,
    pub part: Option<String>,
    pub variant: Option<String>,
}

#[cfg(feature = "trace")]
const TRACE_CAPACITY: usize = 50;

#[derive(Default)]
struct Inner {
    load_started: Option<Instant>,
    model_started: Option<Instant>,
    model: Track,
    textures: Track,
    total_duration_ms: Option<u64>,
    tex_inflight: u32,
    tex_first_start: Option<Instant>,
    recorded_urls: HashSet<String>,
    registered: u32,
    settled: u32,
    error: Option<String>,
    #[cfg(feature = "trace")]
    trace: std::collections::VecDeque<TraceEntry>,
}

impl Inner {
    fn add_texture_bytes(&mut self, url: &str, bytes: u64) {
        // Additive across distinct absolute URLs only; re-requests of an
        // already-recorded asset must not double count.
        if self.recorded_urls.insert(url.to_string()) {
            self.textures.size_bytes = Some(self.textures.size_bytes.unwrap_or(0) + bytes);
        }
    }

    fn settle(&mut self) {
        self.settled += 1;
    }

    fn loading(&self) -> bool {
        self.error.is_none() && (self.registered == 0 || self.settled < self.registered)
    }
}

/// Shared load tracker; one per scene session, reset on construction.
pub struct Telemetry {
    inner: Mutex<Inner>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                load_started: Some(Instant::now()),
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track an asset that is neither the model nor a texture (the
    /// environment map): it participates in the loading aggregate only.
    pub fn asset_started(&self) {
        self.lock().registered += 1;
    }

    pub fn asset_settled(&self) {
        self.lock().settle();
    }

    pub fn model_started(&self) {
        let mut inner = self.lock();
        inner.registered += 1;
        inner.model_started = Some(Instant::now());
    }

    pub fn model_finished(&self, size_bytes: Option<u64>) {
        let mut inner = self.lock();
        if let Some(started) = inner.model_started {
            inner.model.duration_ms = Some(started.elapsed().as_millis() as u64);
        }
        inner.model.size_bytes = size_bytes;
        inner.settle();
    }

    pub fn texture_started(&self) {
        let mut inner = self.lock();
        inner.registered += 1;
        if inner.tex_first_start.is_none() {
            inner.tex_first_start = Some(Instant::now());
        }
        inner.tex_inflight += 1;
    }

    /// A texture request settled, successfully or not. The aggregate texture
    /// duration spans from the first concurrent request to the moment the
    /// in-flight counter returns to zero.
    pub fn texture_settled(&self, url: &str, size_bytes: Option<u64>) {
        let mut inner = self.lock();
        if let Some(bytes) = size_bytes {
            inner.add_texture_bytes(url, bytes);
        }
        inner.tex_inflight = inner.tex_inflight.saturating_sub(1);
        if inner.tex_inflight == 0 {
            if let Some(first) = inner.tex_first_start {
                inner.textures.duration_ms = Some(first.elapsed().as_millis() as u64);
            }
        }
        inner.settle();
    }

    /// Record a size recovered by an explicit probe (HEAD request or file
    /// metadata) for an asset whose transfer size read zero.
    pub fn record_probed_size(&self, url: &str, bytes: u64) {
        self.lock().add_texture_bytes(url, bytes);
    }

    /// A critical failure: loading stops and the error is surfaced.
    pub fn fail(&self, message: impl Into<String>) {
        let mut inner = self.lock();
        let message = message.into();
        log::error!("{}", message);
        inner.error.get_or_insert(message);
    }

    /// Called once per presented frame; stamps the synthetic total duration
    /// on the first frame rendered after loading completed.
    pub fn frame_presented(&self) {
        let mut inner = self.lock();
        if inner.total_duration_ms.is_none() && !inner.loading() && inner.error.is_none() {
            if let Some(started) = inner.load_started {
                inner.total_duration_ms = Some(started.elapsed().as_millis() as u64);
            }
        }
    }

    pub fn loading(&self) -> bool {
        self.lock().loading()
    }

    /// Integer progress over all tracked assets, 0..=100.
    pub fn progress(&self) -> u8 {
        let inner = self.lock();
        if inner.registered == 0 {
            return 0;
        }
        ((inner.settled as u64 * 100) / inner.registered as u64).min(100) as u8
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn snapshot(&self) -> LoadMetrics {
        let inner = self.lock();
        let total_size = match (inner.model.size_bytes, inner.textures.size_bytes) {
            (None, None) => None,
            (model, textures) => Some(model.unwrap_or(0) + textures.unwrap_or(0)),
        };
        LoadMetrics {
            total: Track {
                duration_ms: inner.total_duration_ms,
                size_bytes: total_size,
            },
            model: inner.model,
            textures: inner.textures,
        }
    }

    #[cfg(feature = "trace")]
    pub fn push_trace(&self, entry: TraceEntry) {
        let mut inner = self.lock();
        if inner.trace.len() == TRACE_CAPACITY {
            inner.trace.pop_front();
        }
        inner.trace.push_back(entry);
    }

    #[cfg(feature = "trace")]
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.lock().trace.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_size_is_derived_from_parts() {
        let t = Telemetry::new();
        assert_eq!(t.snapshot().total.size_bytes, None);

        t.model_started();
        t.model_finished(Some(1000));
        assert_eq!(t.snapshot().total.size_bytes, Some(1000));

        t.texture_started();
        t.texture_settled("https://cdn/a.png", Some(500));
        let snap = t.snapshot();
        assert_eq!(snap.model.size_bytes, Some(1000));
        assert_eq!(snap.textures.size_bytes, Some(500));
        assert_eq!(snap.total.size_bytes, Some(1500));
    }

    #[test]
    fn test_texture_bytes_deduplicate_by_url() {
        let t = Telemetry::new();
        t.texture_started();
        t.texture_settled("https://cdn/a.png", Some(500));
        t.texture_started();
        t.texture_settled("https://cdn/a.png", Some(500));
        t.texture_started();
        t.texture_settled("https://cdn/b.png", Some(200));
        assert_eq!(t.snapshot().textures.size_bytes, Some(700));
    }

    #[test]
    fn test_probed_size_recorded_once() {
        let t = Telemetry::new();
        t.record_probed_size("https://cdn/big.png", 1_048_576);
        assert_eq!(t.snapshot().textures.size_bytes, Some(1_048_576));
        // A later request for the same asset must not double count.
        t.texture_started();
        t.texture_settled("https://cdn/big.png", Some(1_048_576));
        assert_eq!(t.snapshot().textures.size_bytes, Some(1_048_576));
    }

    #[test]
    fn test_texture_duration_set_when_inflight_returns_to_zero() {
        let t = Telemetry::new();
        t.texture_started();
        t.texture_started();
        t.texture_started();
        t.texture_settled("a", None);
        t.texture_settled("b", None);
        assert_eq!(t.snapshot().textures.duration_ms, None);
        t.texture_settled("c", None);
        assert!(t.snapshot().textures.duration_ms.is_some());
    }

    #[test]
    fn test_loading_and_progress_aggregate() {
        let t = Telemetry::new();
        assert!(t.loading());
        assert_eq!(t.progress(), 0);

        t.asset_started();
        t.model_started();
        assert!(t.loading());
        assert_eq!(t.progress(), 0);

        t.asset_settled();
        assert_eq!(t.progress(), 50);
        assert!(t.loading());

        t.model_finished(None);
        assert_eq!(t.progress(), 100);
        assert!(!t.loading());
    }

    #[test]
    fn test_total_duration_marks_first_frame_after_load() {
        let t = Telemetry::new();
        t.model_started();
        t.frame_presented();
        assert_eq!(t.snapshot().total.duration_ms, None);

        t.model_finished(None);
        assert_eq!(t.snapshot().total.duration_ms, None);
        t.frame_presented();
        assert!(t.snapshot().total.duration_ms.is_some());
    }

    #[test]
    fn test_critical_failure_stops_loading() {
        let t = Telemetry::new();
        t.model_started();
        t.fail("model fetch failed");
        assert!(!t.loading());
        assert_eq!(t.error().as_deref(), Some("model fetch failed"));
    }

    #[cfg(feature = "trace")]
    #[test]
    fn test_trace_ring_is_bounded() {
        let t = Telemetry::new();
        for i in 0..60 {
            t.push_trace(TraceEntry {
                path: format!("tex_{i}.png"),
                ok: true,
                part: None,
                variant: None,
            });
        }
        let trace = t.trace();
        assert_eq!(trace.len(), 50);
        assert_eq!(trace[0].path, "tex_10.png");
        assert_eq!(trace[49].path, "tex_59.png");
    }
}
