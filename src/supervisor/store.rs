//! Shared progress store written by the stream reader and sampled by the
//! render loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// One decoded metric update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSample {
    pub epoch: u64,
    pub metric: f64,
}

impl ProgressSample {
    #[must_use]
    pub fn new(epoch: u64, metric: f64) -> Self {
        Self { epoch, metric }
    }
}

/// Point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Samples in arrival order.
    pub samples: Vec<ProgressSample>,
    /// Whether the completion signal had been seen.
    pub finished: bool,
}

impl Snapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recently appended sample.
    #[must_use]
    pub fn last(&self) -> Option<ProgressSample> {
        self.samples.last().copied()
    }

    /// Sample with the lowest finite metric.
    #[must_use]
    pub fn best(&self) -> Option<ProgressSample> {
        self.samples
            .iter()
            .filter(|s| s.metric.is_finite())
            .min_by(|a, b| a.metric.total_cmp(&b.metric))
            .copied()
    }
}

#[derive(Debug, Default)]
struct Inner {
    samples: Vec<ProgressSample>,
    finished: bool,
}

/// Append-only sample sequence plus completion flag behind one lock.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    inner: Arc<Mutex<Inner>>,
}

impl ProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The contents are append-only and every critical section is a single
    // push or flag store, so a poisoned guard still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample to the end of the sequence.
    pub fn append(&self, sample: ProgressSample) {
        self.lock().samples.push(sample);
    }

    /// Set the completion flag. Calling it again has no effect.
    pub fn mark_finished(&self) {
        let mut inner = self.lock();
        if !inner.finished {
            inner.finished = true;
            tracing::debug!(samples = inner.samples.len(), "Progress store marked finished");
        }
    }

    /// Copy the samples and the flag under a single lock acquisition.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            samples: inner.samples.clone(),
            finished: inner.finished,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }
}
