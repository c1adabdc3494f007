// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Metric identifiers, values and errors shared by every telemetry backend.

use std::fmt::Display;
use std::time::Instant;

/// A unique, structured identifier for a metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricId {
    /// The broad category of the metric (e.g., "loop", "device").
    pub namespace: String,
    /// The specific name of the metric (e.g., "late_frames").
    pub name: String,
    /// Optional, sorted key-value pairs for dimensional filtering.
    pub labels: Vec<(String, String)>,
}

impl MetricId {
    /// Creates a new `MetricId` with a namespace and a name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Adds a dimensional label. Labels are kept sorted by key.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self.labels.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "[{labels}]")?;
        }
        Ok(())
    }
}

/// The fundamental type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Monotonically increasing count.
    Counter,
    /// Value that can go up or down.
    Gauge,
    /// Distribution of measurements.
    Histogram,
}

/// A metric's current value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Counter value.
    Counter(u64),
    /// Gauge value.
    Gauge(f64),
    /// Histogram state.
    Histogram {
        /// Number of samples recorded.
        count: u64,
        /// Sum of all samples.
        sum: f64,
        /// Largest sample.
        max: f64,
        /// Upper bounds of the buckets.
        bucket_bounds: Vec<f64>,
        /// Samples at or below each bound (the last slot counts overflow).
        bucket_counts: Vec<u64>,
    },
}

impl MetricValue {
    /// Returns the [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Histogram { .. } => MetricType::Histogram,
        }
    }

    /// The counter value, if this is a counter.
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// The gauge value, if this is a gauge.
    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            _ => None,
        }
    }

    /// Mean of a histogram's samples.
    pub fn histogram_mean(&self) -> Option<f64> {
        match self {
            MetricValue::Histogram { count, sum, .. } if *count > 0 => Some(sum / *count as f64),
            _ => None,
        }
    }
}

/// A metric with its descriptive metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Identifier.
    pub id: MetricId,
    /// Human-readable description.
    pub description: String,
    /// Unit of measurement ("count", "ms").
    pub unit: String,
    /// Current value.
    pub value: MetricValue,
    /// When the value last changed.
    pub last_updated: Instant,
}

impl Metric {
    /// A counter starting at zero.
    pub fn new_counter(id: MetricId, description: impl Into<String>) -> Self {
        Self::with_value(id, description, "count", MetricValue::Counter(0))
    }

    /// A gauge starting at zero.
    pub fn new_gauge(id: MetricId, description: impl Into<String>, unit: impl Into<String>) -> Self {
        Self::with_value(id, description, unit, MetricValue::Gauge(0.0))
    }

    /// An empty histogram with the given bucket bounds.
    pub fn new_histogram(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        bucket_bounds: Vec<f64>,
    ) -> Self {
        let bucket_counts = vec![0; bucket_bounds.len() + 1];
        Self::with_value(
            id,
            description,
            unit,
            MetricValue::Histogram {
                count: 0,
                sum: 0.0,
                max: 0.0,
                bucket_bounds,
                bucket_counts,
            },
        )
    }

    fn with_value(
        id: MetricId,
        description: impl Into<String>,
        unit: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            unit: unit.into(),
            value,
            last_updated: Instant::now(),
        }
    }

    /// The metric's type.
    pub fn metric_type(&self) -> MetricType {
        self.value.metric_type()
    }
}

/// A specialized `Result` type for metric-related operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error that can occur within the metrics system.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// The requested metric was not found.
    MetricNotFound(MetricId),
    /// An operation was attempted on a metric of the wrong type.
    TypeMismatch {
        /// The expected metric type.
        expected: MetricType,
        /// The actual metric type.
        found: MetricType,
    },
    /// The backend storage failed.
    StorageError(String),
    /// An invalid operation was attempted (e.g., unsorted histogram bounds).
    InvalidOperation(String),
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::MetricNotFound(id) => write!(f, "Metric not found: {id}"),
            MetricsError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected:?}, found {found:?}")
            }
            MetricsError::StorageError(msg) => write!(f, "Storage error: {msg}"),
            MetricsError::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
        }
    }
}

impl std::error::Error for MetricsError {}
