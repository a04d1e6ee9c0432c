//! Pull progress reporting (spec §4.5: "Progress is emitted through a
//! pluggable observer with coalesced byte counters and phase tags").

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// One stage of a pull, reported alongside byte/object counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    Fetching,
    ApplyingDelta,
    Writing,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Fetching => "fetching",
            Self::ApplyingDelta => "applying-delta",
            Self::Writing => "writing",
        }
    }
}

/// Callback interface a pull driver reports through. The default impl is a
/// no-op so library callers that don't care about progress pay nothing;
/// the CLI wires this to an `indicatif` bar.
pub trait Observer: Send + Sync {
    fn phase_started(&self, _phase: Phase) {}
    fn bytes_transferred(&self, _phase: Phase, _delta: u64) {}
    fn object_completed(&self, _phase: Phase) {}
    fn phase_finished(&self, _phase: Phase) {}
}

/// An [`Observer`] that does nothing, used when a caller passes no observer.
pub struct NullObserver;

impl Observer for NullObserver {}

/// Thread-safe running totals, coalesced so a fast-ticking fetch pool
/// doesn't call into the observer once per chunk. Call [`Self::flush`]
/// periodically (the pull driver does this once per completed object) to
/// forward the accumulated delta to an [`Observer`].
#[derive(Default)]
pub struct Counters {
    bytes: AtomicU64,
    objects: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_object(&self) {
        self.objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn objects(&self) -> u64 {
        self.objects.load(Ordering::Relaxed)
    }

    pub fn flush(&self, phase: Phase, observer: &dyn Observer) {
        let bytes = self.bytes.swap(0, Ordering::Relaxed);
        if bytes > 0 {
            observer.bytes_transferred(phase, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<String>>,
    }

    impl Observer for Recording {
        fn phase_started(&self, phase: Phase) {
            self.events.lock().unwrap().push(format!("start:{}", phase.label()));
        }
        fn bytes_transferred(&self, phase: Phase, delta: u64) {
            self.events.lock().unwrap().push(format!("bytes:{}:{delta}", phase.label()));
        }
    }

    #[test]
    fn counters_coalesce_and_flush_resets() {
        let counters = Counters::new();
        counters.add_bytes(10);
        counters.add_bytes(5);
        let observer = Recording::default();
        counters.flush(Phase::Fetching, &observer);
        assert_eq!(counters.bytes(), 0);
        assert_eq!(observer.events.lock().unwrap().as_slice(), &["bytes:fetching:15"]);
    }

    #[test]
    fn null_observer_accepts_every_call() {
        let observer = NullObserver;
        observer.phase_started(Phase::Scanning);
        observer.bytes_transferred(Phase::Scanning, 1);
        observer.object_completed(Phase::Scanning);
        observer.phase_finished(Phase::Scanning);
    }
}
