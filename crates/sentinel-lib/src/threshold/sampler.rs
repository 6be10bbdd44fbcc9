//! Sliding window sampling
//!
//! Walks a batch with a fixed window length and a fixed step, evaluating a
//! metric over every window that fits entirely inside the observed span.

use chrono::Duration;

use crate::condition::WindowMetric;
use crate::models::{MetricSample, Timestamped};

/// Default step between consecutive window starts (1 minute)
pub const DEFAULT_STEP_MINUTES: u32 = 1;

/// Produces one metric value per window position
#[derive(Debug, Clone)]
pub struct SlidingWindowSampler {
    window: Duration,
    step: Duration,
}

impl SlidingWindowSampler {
    pub fn new(window_minutes: u32) -> Self {
        Self {
            window: Duration::minutes(i64::from(window_minutes)),
            step: Duration::minutes(i64::from(DEFAULT_STEP_MINUTES)),
        }
    }

    /// Set custom step; a zero step is raised to one minute
    pub fn with_step(mut self, step_minutes: u32) -> Self {
        self.step = Duration::minutes(i64::from(step_minutes.max(1)));
        self
    }

    /// Evaluate `metric` over `[start, start + window)` for every start from
    /// the earliest timestamp while `start + window <= latest timestamp`
    ///
    /// Windows whose metric evaluates to NaN are dropped.
    pub fn sample<T, M>(&self, items: &[T], metric: &M) -> Vec<MetricSample>
    where
        T: Timestamped,
        M: WindowMetric<T> + ?Sized,
    {
        if items.is_empty() || self.window <= Duration::zero() {
            return Vec::new();
        }

        // Index once by time; each window is then a contiguous slice
        let mut sorted: Vec<&T> = items.iter().collect();
        sorted.sort_by_key(|item| item.timestamp());

        let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
            return Vec::new();
        };
        let min_ts = first.timestamp();
        let max_ts = last.timestamp();

        let mut samples = Vec::new();
        let mut start = min_ts;
        while start + self.window <= max_ts {
            let end = start + self.window;
            let lo = sorted.partition_point(|item| item.timestamp() < start);
            let hi = sorted.partition_point(|item| item.timestamp() < end);

            let value = metric.measure(&sorted[lo..hi]);
            if !value.is_nan() {
                samples.push(MetricSample {
                    window_start: start,
                    window_end: end,
                    value,
                });
            }
            start += self.step;
        }

        samples
    }

    /// Same as [`sample`](Self::sample) but keeps only the values
    pub fn sample_values<T, M>(&self, items: &[T], metric: &M) -> Vec<f64>
    where
        T: Timestamped,
        M: WindowMetric<T> + ?Sized,
    {
        self.sample(items, metric)
            .into_iter()
            .map(|s| s.value)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, Predicate};
    use crate::models::Event;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn event_at(minute: i64, status: u16) -> Event {
        Event {
            timestamp: at(minute),
            request_id: None,
            environment: "prod".to_string(),
            endpoint: "/orders".to_string(),
            service: None,
            http_method: "GET".to_string(),
            http_status: status,
            browser: None,
            response_time_ms: None,
            error_flag: false,
            cpu_usage_percent: None,
            memory_usage_mb: None,
        }
    }

    #[test]
    fn test_span_shorter_than_window_is_empty() {
        let events: Vec<Event> = (0..10).map(|m| event_at(m, 500)).collect();
        let sampler = SlidingWindowSampler::new(20);

        assert!(sampler
            .sample(&events, &Condition::count_status(500))
            .is_empty());
    }

    #[test]
    fn test_empty_input_is_empty() {
        let sampler = SlidingWindowSampler::new(5);
        let events: Vec<Event> = Vec::new();
        assert!(sampler
            .sample(&events, &Condition::count_status(500))
            .is_empty());
    }

    #[test]
    fn test_window_positions_and_half_open_bounds() {
        // One event per minute over [0, 10]
        let events: Vec<Event> = (0..=10).map(|m| event_at(m, 500)).collect();
        let sampler = SlidingWindowSampler::new(5);
        let samples = sampler.sample(&events, &Condition::count_status(500));

        // Starts 0..=5 satisfy start + 5 <= 10
        assert_eq!(samples.len(), 6);
        // [start, start + 5) holds exactly five one-per-minute events
        assert!(samples.iter().all(|s| s.value == 5.0));
        assert_eq!(samples[0].window_start, at(0));
        assert_eq!(samples[5].window_end, at(10));
    }

    #[test]
    fn test_windows_never_extend_past_data() {
        let events: Vec<Event> = vec![event_at(0, 200), event_at(7, 500), event_at(33, 404)];
        let sampler = SlidingWindowSampler::new(15);
        let samples = sampler.sample(&events, &Condition::count_status(500));

        assert!(samples.iter().all(|s| s.window_start >= at(0) && s.window_end <= at(33)));
        assert_eq!(samples.len(), 19);
    }

    #[test]
    fn test_unsorted_input_gives_same_output() {
        let ordered: Vec<Event> = (0..=20).map(|m| event_at(m, if m % 3 == 0 { 500 } else { 200 })).collect();
        let mut shuffled = ordered.clone();
        shuffled.reverse();
        let condition = Condition::Count {
            predicate: Predicate::Status { code: 500 },
        };
        let sampler = SlidingWindowSampler::new(4);

        assert_eq!(
            sampler.sample_values(&ordered, &condition),
            sampler.sample_values(&shuffled, &condition)
        );
    }

    #[test]
    fn test_custom_step() {
        let events: Vec<Event> = (0..=10).map(|m| event_at(m, 500)).collect();
        let sampler = SlidingWindowSampler::new(5).with_step(2);
        // Starts 0, 2, 4
        assert_eq!(
            sampler
                .sample(&events, &Condition::count_status(500))
                .len(),
            3
        );
    }
}
