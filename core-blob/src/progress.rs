//! Progress throttling for uploads, downloads and file fetches.

use bridge_traits::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Callback receiving `(transferred, total)`; `total` is `None` when unknown.
pub type ProgressCallback = Box<dyn FnMut(u64, Option<u64>) + Send + 'static>;

/// Limits how often a progress callback fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressOptions {
    /// Minimum time between two reports
    #[serde(default, with = "millis")]
    pub interval: Option<Duration>,
    /// Report at most once per `1/count` of the total
    #[serde(default)]
    pub count: Option<u32>,
}

impl ProgressOptions {
    pub fn interval(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            count: None,
        }
    }

    pub fn count(count: u32) -> Self {
        Self {
            interval: None,
            count: Some(count),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// Applies [`ProgressOptions`] to a stream of raw progress samples.
pub struct ProgressReporter {
    options: ProgressOptions,
    callback: ProgressCallback,
    clock: Arc<dyn Clock>,
    last_report_ms: Option<i64>,
    last_step: Option<u64>,
    last_transferred: Option<u64>,
}

impl ProgressReporter {
    pub fn new(options: ProgressOptions, callback: ProgressCallback, clock: Arc<dyn Clock>) -> Self {
        Self {
            options,
            callback,
            clock,
            last_report_ms: None,
            last_step: None,
            last_transferred: None,
        }
    }

    /// Record a sample, invoking the callback if the throttle allows it.
    ///
    /// Returns whether the callback fired.
    pub fn report(&mut self, transferred: u64, total: Option<u64>) -> bool {
        let finished = total.is_some_and(|t| transferred >= t);
        if finished {
            return self.finish(transferred, total);
        }

        let now = self.clock.unix_timestamp_millis();
        if let (Some(interval), Some(last)) = (self.options.interval, self.last_report_ms) {
            if now.saturating_sub(last) < interval.as_millis() as i64 {
                return false;
            }
        }

        let step = self.step_for(transferred, total);
        if step.is_some() && step == self.last_step {
            return false;
        }

        self.deliver(transferred, total, now, step);
        true
    }

    /// Deliver the final sample unless that exact value was already reported.
    pub fn finish(&mut self, transferred: u64, total: Option<u64>) -> bool {
        if self.last_transferred == Some(transferred) {
            return false;
        }
        let now = self.clock.unix_timestamp_millis();
        let step = self.step_for(transferred, total);
        self.deliver(transferred, total, now, step);
        true
    }

    fn step_for(&self, transferred: u64, total: Option<u64>) -> Option<u64> {
        match (self.options.count, total) {
            (Some(count), Some(total)) if count > 0 && total > 0 => {
                Some(transferred.min(total) * u64::from(count) / total)
            }
            _ => None,
        }
    }

    fn deliver(&mut self, transferred: u64, total: Option<u64>, now: i64, step: Option<u64>) {
        (self.callback)(transferred, total);
        self.last_report_ms = Some(now);
        self.last_step = step;
        self.last_transferred = Some(transferred);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("options", &self.options)
            .field("last_transferred", &self.last_transferred)
            .finish()
    }
}
