use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use vidctrl_frame::StatsReport;

/// Number of samples kept for the rolling average.
pub const STATS_WINDOW: usize = 50;

/// One latency/queue measurement from the media pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatsSample {
    pub latency: f64,
    pub queue0: f64,
    pub queue1: f64,
}

impl StatsSample {
    /// Narrow to the wire representation.
    pub fn to_report(self) -> StatsReport {
        StatsReport {
            latency: self.latency as f32,
            queue0: self.queue0 as f32,
            queue1: self.queue1 as f32,
        }
    }
}

/// Fixed-capacity window of recent samples, oldest dropped first.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    samples: VecDeque<StatsSample>,
    capacity: usize,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::with_capacity(STATS_WINDOW)
    }

    /// A window of `capacity` samples (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, latency: f64, queue0: f64, queue1: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(StatsSample {
            latency,
            queue0,
            queue1,
        });
    }

    /// Mean of the buffered samples, all zero when there are none.
    pub fn average(&self) -> StatsSample {
        if self.samples.is_empty() {
            return StatsSample::default();
        }

        let n = self.samples.len() as f64;
        let sum = self
            .samples
            .iter()
            .fold(StatsSample::default(), |acc, s| StatsSample {
                latency: acc.latency + s.latency,
                queue0: acc.queue0 + s.queue0,
                queue1: acc.queue1 + s.queue1,
            });

        StatsSample {
            latency: sum.latency / n,
            queue0: sum.queue0 / n,
            queue1: sum.queue1 / n,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`StatsAggregator`] shared between the pipeline's streaming threads
/// and the control server.
#[derive(Debug, Clone, Default)]
pub struct SharedStats {
    inner: Arc<Mutex<StatsAggregator>>,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: f64, queue0: f64, queue1: f64) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(latency, queue0, queue1);
    }

    pub fn average(&self) -> StatsSample {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .average()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
