use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::ExporterError;
use crate::metric::data::{HistogramPoint, Labels, MetricData, MetricRecord};
use crate::metric::descriptor::{build_descriptor, kind_and_value_type};
use crate::metric::wire::{
    BucketOptions, Distribution, ExplicitBuckets, Metric, MetricDescriptor, MetricKind, Point,
    TimeInterval, TimeSeries, TypedValue,
};
use crate::resource::{
    map_resource, resource_attributes, MappedResource, MonitoredResourceDescription,
};

/// Gap enforced between consecutive cumulative intervals of one series.
const MIN_INTERVAL_GAP: Duration = Duration::from_millis(1);

/// Identity of a time series: metric type plus point labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportKey {
    pub metric_type: String,
    pub labels: Labels,
}

/// Interval last exported for a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExportedInterval {
    start: SystemTime,
    end: SystemTime,
}

/// Last exported interval per series, kept for the exporter's lifetime.
#[derive(Debug)]
pub struct IntervalTable {
    start_time: SystemTime,
    exported: Mutex<HashMap<ExportKey, ExportedInterval>>,
}

impl IntervalTable {
    pub fn new(start_time: SystemTime) -> Self {
        Self {
            start_time,
            exported: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// Interval for a cumulative point ending at `end`.
    ///
    /// A series seen for the first time starts at the exporter start time.
    /// Later intervals start one millisecond after the previous end. When
    /// `end` leaves no room for that gap (a retried collection, say) the
    /// previous start is reused, so the interval never starts after it ends.
    /// The table only moves forward: an `end` older than the recorded one
    /// leaves it untouched.
    pub fn cumulative_interval(&self, key: &ExportKey, end: SystemTime) -> TimeInterval {
        let mut exported = self.exported.lock();
        let (start, advances) = match exported.get(key) {
            None => (self.start_time.min(end), true),
            Some(previous) if previous.end + MIN_INTERVAL_GAP <= end => {
                (previous.end + MIN_INTERVAL_GAP, true)
            }
            Some(previous) => (previous.start.min(end), end > previous.end),
        };
        if advances {
            exported.insert(key.clone(), ExportedInterval { start, end });
        }
        TimeInterval::new(start, end)
    }

    pub fn last_end(&self, key: &ExportKey) -> Option<SystemTime> {
        self.exported.lock().get(key).map(|interval| interval.end)
    }

    pub fn len(&self) -> usize {
        self.exported.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A series waiting for its interval, which is resolved in [`TimeSeriesAggregator::finish`].
struct PendingSeries {
    key: ExportKey,
    header: TimeSeries,
    time: SystemTime,
    value: TypedValue,
}

/// Collects the points of one export call into time series and descriptors.
///
/// Series and descriptors come out in first-seen order. A second point for
/// the same [`ExportKey`] replaces the first one together with its monitored
/// resource, since a batch write takes one point per series. Intervals are
/// computed once per series when the aggregator is finished.
pub struct TimeSeriesAggregator<'a> {
    prefix: &'a str,
    intervals: &'a IntervalTable,
    resource_description: Option<&'a MonitoredResourceDescription>,
    descriptors: Vec<MetricDescriptor>,
    descriptor_types: HashSet<String>,
    series: Vec<PendingSeries>,
    series_index: HashMap<ExportKey, usize>,
}

impl<'a> TimeSeriesAggregator<'a> {
    pub fn new(
        prefix: &'a str,
        intervals: &'a IntervalTable,
        resource_description: Option<&'a MonitoredResourceDescription>,
    ) -> Self {
        Self {
            prefix,
            intervals,
            resource_description,
            descriptors: Vec::new(),
            descriptor_types: HashSet::new(),
            series: Vec::new(),
            series_index: HashMap::new(),
        }
    }

    /// Records every point of `metric`.
    ///
    /// Fails with [`ExporterError::UnsupportedKind`] before touching any state
    /// when the metric shape cannot be exported.
    pub fn record(&mut self, metric: &MetricRecord) -> Result<(), ExporterError> {
        kind_and_value_type(metric)?;
        let resource = self.monitored_resource(metric);

        match &metric.data {
            MetricData::LongGauge(points) | MetricData::LongSum(points) => {
                for point in points {
                    let value = TypedValue::Int64(point.value);
                    self.record_point(metric, &resource, &point.labels, point.time, value)?;
                }
            }
            MetricData::DoubleGauge(points) | MetricData::DoubleSum(points) => {
                for point in points {
                    let value = TypedValue::Double(point.value);
                    self.record_point(metric, &resource, &point.labels, point.time, value)?;
                }
            }
            MetricData::Histogram(points) => {
                for point in points {
                    let value = TypedValue::Distribution(distribution(point));
                    self.record_point(metric, &resource, &point.labels, point.time, value)?;
                }
            }
            MetricData::Summary(_) => {}
        }
        Ok(())
    }

    fn monitored_resource(&self, metric: &MetricRecord) -> MappedResource {
        let attributes = resource_attributes(&metric.resource);
        match self.resource_description {
            Some(description) => description.map(&attributes),
            None => map_resource(&attributes),
        }
    }

    fn record_point(
        &mut self,
        metric: &MetricRecord,
        resource: &MappedResource,
        labels: &Labels,
        time: SystemTime,
        value: TypedValue,
    ) -> Result<(), ExporterError> {
        let descriptor = build_descriptor(self.prefix, metric, labels)?;
        let key = ExportKey {
            metric_type: descriptor.metric_type.clone(),
            labels: labels.clone(),
        };

        match self.series_index.get(&key) {
            Some(&index) => {
                trace!(metric = %key.metric_type, "Replacing point recorded earlier in this export");
                let pending = &mut self.series[index];
                pending.header.resource = resource.clone();
                pending.time = time;
                pending.value = value;
            }
            None => {
                self.series.push(PendingSeries {
                    key: key.clone(),
                    header: TimeSeries {
                        metric: Metric {
                            metric_type: key.metric_type.clone(),
                            labels: labels.clone(),
                        },
                        resource: resource.clone(),
                        metric_kind: descriptor.metric_kind,
                        value_type: descriptor.value_type,
                        points: Vec::new(),
                    },
                    time,
                    value,
                });
                self.series_index.insert(key, self.series.len() - 1);
            }
        }

        if self.descriptor_types.insert(descriptor.metric_type.clone()) {
            self.descriptors.push(descriptor);
        }
        Ok(())
    }

    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    /// Number of distinct series recorded so far.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Resolves intervals and returns the descriptors and one-point series.
    ///
    /// Cumulative series record their end time in the interval table here,
    /// before anything is sent.
    pub fn finish(self) -> (Vec<MetricDescriptor>, Vec<TimeSeries>) {
        let intervals = self.intervals;
        let series = self
            .series
            .into_iter()
            .map(|pending| {
                let interval = match pending.header.metric_kind {
                    MetricKind::Gauge => TimeInterval::instant(pending.time),
                    MetricKind::Cumulative => {
                        intervals.cumulative_interval(&pending.key, pending.time)
                    }
                };
                let mut series = pending.header;
                series.points = vec![Point {
                    interval,
                    value: pending.value,
                }];
                series
            })
            .collect();
        (self.descriptors, series)
    }
}

fn distribution(point: &HistogramPoint) -> Distribution {
    let mean = if point.count == 0 {
        0.0
    } else {
        point.sum / point.count as f64
    };

    Distribution {
        count: point.count,
        mean,
        bucket_options: BucketOptions {
            explicit_buckets: ExplicitBuckets {
                bounds: point.bounds.clone(),
            },
        },
        bucket_counts: point.bucket_counts.clone(),
    }
}
