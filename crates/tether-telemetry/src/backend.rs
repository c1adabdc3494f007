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

//! Storage backends for metrics.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

use tether_core::telemetry::{
    Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult,
};

/// Storage for metric values.
///
/// Implementations must be safe to share between threads; every update goes
/// through [`MetricsBackend::update`] so it is applied atomically.
pub trait MetricsBackend: Send + Sync + Debug + 'static {
    /// Inserts or replaces a metric.
    fn put_metric(&self, metric: Metric) -> MetricsResult<()>;

    /// Returns a copy of a metric.
    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric>;

    /// Applies `f` to a stored metric under the backend's lock.
    fn update(
        &self,
        id: &MetricId,
        f: &mut dyn FnMut(&mut Metric) -> MetricsResult<()>,
    ) -> MetricsResult<()>;

    /// Whether a metric is stored.
    fn contains_metric(&self, id: &MetricId) -> bool;

    /// Copies of every stored metric.
    fn list_all_metrics(&self) -> Vec<Metric>;

    /// Removes every metric.
    fn clear_all(&self) -> MetricsResult<()>;

    /// Number of stored metrics.
    fn metric_count(&self) -> usize;

    /// Adds `delta` to a counter and returns the new value.
    fn increment_counter(&self, id: &MetricId, delta: u64) -> MetricsResult<u64> {
        let mut result = 0;
        self.update(id, &mut |metric| match metric.value {
            MetricValue::Counter(ref mut value) => {
                *value = value.saturating_add(delta);
                result = *value;
                Ok(())
            }
            ref other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: other.metric_type(),
            }),
        })?;
        Ok(result)
    }

    /// Sets a gauge.
    fn set_gauge(&self, id: &MetricId, value: f64) -> MetricsResult<()> {
        self.update(id, &mut |metric| match metric.value {
            MetricValue::Gauge(ref mut gauge) => {
                *gauge = value;
                Ok(())
            }
            ref other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
    }

    /// Records one histogram sample.
    fn record_histogram_sample(&self, id: &MetricId, sample: f64) -> MetricsResult<()> {
        self.update(id, &mut |metric| match metric.value {
            MetricValue::Histogram {
                ref mut count,
                ref mut sum,
                ref mut max,
                ref bucket_bounds,
                ref mut bucket_counts,
            } => {
                *count += 1;
                *sum += sample;
                if *count == 1 || sample > *max {
                    *max = sample;
                }
                let slot = bucket_bounds
                    .iter()
                    .position(|bound| sample <= *bound)
                    .unwrap_or(bucket_bounds.len());
                if let Some(c) = bucket_counts.get_mut(slot) {
                    *c += 1;
                }
                Ok(())
            }
            ref other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Histogram,
                found: other.metric_type(),
            }),
        })
    }
}

/// In-memory backend using `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: RwLock<HashMap<MetricId, Metric>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics whose id lives in `namespace`.
    pub fn metrics_in_namespace(&self, namespace: &str) -> Vec<Metric> {
        self.list_all_metrics()
            .into_iter()
            .filter(|m| m.id.namespace == namespace)
            .collect()
    }

    fn lock_error() -> MetricsError {
        MetricsError::StorageError("metrics storage lock poisoned".to_string())
    }
}

impl MetricsBackend for InMemoryBackend {
    fn put_metric(&self, metric: Metric) -> MetricsResult<()> {
        let mut storage = self.storage.write().map_err(|_| Self::lock_error())?;
        storage.insert(metric.id.clone(), metric);
        Ok(())
    }

    fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        let storage = self.storage.read().map_err(|_| Self::lock_error())?;
        storage
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    fn update(
        &self,
        id: &MetricId,
        f: &mut dyn FnMut(&mut Metric) -> MetricsResult<()>,
    ) -> MetricsResult<()> {
        let mut storage = self.storage.write().map_err(|_| Self::lock_error())?;
        let metric = storage
            .get_mut(id)
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
        f(metric)?;
        metric.last_updated = std::time::Instant::now();
        Ok(())
    }

    fn contains_metric(&self, id: &MetricId) -> bool {
        self.storage
            .read()
            .map(|s| s.contains_key(id))
            .unwrap_or(false)
    }

    fn list_all_metrics(&self) -> Vec<Metric> {
        self.storage
            .read()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_all(&self) -> MetricsResult<()> {
        self.storage
            .write()
            .map_err(|_| Self::lock_error())?
            .clear();
        Ok(())
    }

    fn metric_count(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }
}
