//! Time binning of raw events into the per-stream aggregate table

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{AggregatedBin, Event, StreamKey};

/// Default bin width (15 minutes)
pub const DEFAULT_BIN_MINUTES: u32 = 15;

#[derive(Default)]
struct BinAccumulator {
    request_count: u64,
    error_count: u64,
    response_time_sum: f64,
    response_time_count: u64,
}

/// Floors event timestamps into fixed bins and aggregates each stream
#[derive(Debug, Clone)]
pub struct BinAggregator {
    interval: Duration,
}

impl BinAggregator {
    pub fn new(bin_minutes: u32) -> Self {
        Self {
            interval: Duration::minutes(i64::from(bin_minutes.max(1))),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start of the bin that contains `ts`
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.interval.num_seconds();
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(width);
        DateTime::from_timestamp(floored, 0).unwrap_or(ts)
    }

    /// Aggregate events, ordered by stream then bin time
    pub fn aggregate(&self, events: &[Event]) -> Vec<AggregatedBin> {
        let mut acc: BTreeMap<(StreamKey, DateTime<Utc>), BinAccumulator> = BTreeMap::new();

        for event in events {
            let entry = acc
                .entry((event.stream_key(), self.floor(event.timestamp)))
                .or_default();
            entry.request_count += 1;
            if event.error_flag {
                entry.error_count += 1;
            }
            if let Some(rt) = event.response_time_ms.filter(|v| !v.is_nan()) {
                entry.response_time_sum += rt;
                entry.response_time_count += 1;
            }
        }

        acc.into_iter()
            .map(|((stream, time_bin), a)| AggregatedBin {
                stream,
                time_bin,
                request_count: a.request_count,
                error_count: a.error_count,
                avg_response_time: if a.response_time_count == 0 {
                    f64::NAN
                } else {
                    a.response_time_sum / a.response_time_count as f64
                },
                error_rate: if a.request_count == 0 {
                    f64::NAN
                } else {
                    a.error_count as f64 / a.request_count as f64
                },
            })
            .collect()
    }
}

impl Default for BinAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_BIN_MINUTES)
    }
}

/// Group bins by stream, each group sorted by bin time
pub fn group_by_stream(bins: &[AggregatedBin]) -> BTreeMap<&StreamKey, Vec<&AggregatedBin>> {
    let mut groups: BTreeMap<&StreamKey, Vec<&AggregatedBin>> = BTreeMap::new();
    for bin in bins {
        groups.entry(&bin.stream).or_default().push(bin);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|b| b.time_bin);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(minute: u32, env: &str, rt: Option<f64>, error: bool) -> Event {
        Event {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 30).unwrap(),
            request_id: None,
            environment: env.to_string(),
            endpoint: "/orders".to_string(),
            service: None,
            http_method: "GET".to_string(),
            http_status: if error { 500 } else { 200 },
            browser: None,
            response_time_ms: rt,
            error_flag: error,
            cpu_usage_percent: None,
            memory_usage_mb: None,
        }
    }

    #[test]
    fn test_floor_to_bin() {
        let agg = BinAggregator::new(15);
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 29, 59).unwrap();
        assert_eq!(
            agg.floor(ts),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_aggregate_counts_and_rates() {
        let agg = BinAggregator::new(15);
        let events = vec![
            event(1, "prod", Some(100.0), false),
            event(2, "prod", Some(300.0), true),
            event(16, "prod", None, false),
            event(3, "staging", Some(50.0), false),
        ];

        let bins = agg.aggregate(&events);
        assert_eq!(bins.len(), 3);

        let first = &bins[0];
        assert_eq!(first.stream, StreamKey::new("prod", "/orders"));
        assert_eq!(first.request_count, 2);
        assert_eq!(first.error_count, 1);
        assert_eq!(first.avg_response_time, 200.0);
        assert_eq!(first.error_rate, 0.5);

        // Bin with no response times reports NaN rather than zero
        assert!(bins[1].avg_response_time.is_nan());
        assert_eq!(bins[2].stream.environment, "staging");
    }

    #[test]
    fn test_group_by_stream_sorts_bins() {
        let agg = BinAggregator::new(15);
        let events = vec![
            event(40, "prod", Some(1.0), false),
            event(1, "prod", Some(1.0), false),
            event(20, "prod", Some(1.0), false),
        ];
        let bins = agg.aggregate(&events);
        let groups = group_by_stream(&bins);

        assert_eq!(groups.len(), 1);
        let group = groups.values().next().unwrap();
        assert!(group.windows(2).all(|w| w[0].time_bin < w[1].time_bin));
    }
}
