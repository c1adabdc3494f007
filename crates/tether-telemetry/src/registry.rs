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

//! Registry for managing metrics.

use std::sync::Arc;

use tether_core::telemetry::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};

use crate::backend::{InMemoryBackend, MetricsBackend};

/// Central registry for control-loop metrics.
///
/// Registration returns a typed handle; handles are cheap to clone and write
/// straight to the shared backend.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    backend: Arc<dyn MetricsBackend>,
}

impl MetricsRegistry {
    /// Creates a registry with the default in-memory backend.
    pub fn new() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
        }
    }

    /// Creates a registry over a custom backend.
    pub fn with_backend(backend: Arc<dyn MetricsBackend>) -> Self {
        Self { backend }
    }

    /// Registers a counter starting at zero.
    pub fn register_counter(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> MetricsResult<CounterHandle> {
        let id = MetricId::new(namespace, name);
        self.backend
            .put_metric(Metric::new_counter(id.clone(), description))?;
        Ok(CounterHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Registers a gauge starting at zero.
    pub fn register_gauge(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> MetricsResult<GaugeHandle> {
        let id = MetricId::new(namespace, name);
        self.backend
            .put_metric(Metric::new_gauge(id.clone(), description, unit))?;
        Ok(GaugeHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Registers a histogram. `buckets` must be strictly increasing.
    pub fn register_histogram(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        buckets: Vec<f64>,
    ) -> MetricsResult<HistogramHandle> {
        if buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MetricsError::InvalidOperation(
                "histogram buckets must be strictly increasing".to_string(),
            ));
        }
        let id = MetricId::new(namespace, name);
        self.backend
            .put_metric(Metric::new_histogram(id.clone(), description, unit, buckets))?;
        Ok(HistogramHandle {
            id,
            backend: self.backend.clone(),
        })
    }

    /// Returns a copy of a metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        self.backend.get_metric(id)
    }

    /// Every metric, sorted by id for stable output.
    pub fn snapshot(&self) -> Vec<Metric> {
        let mut metrics = self.backend.list_all_metrics();
        metrics.sort_by_key(|m| m.id.to_string());
        metrics
    }

    /// Number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.backend.metric_count()
    }

    /// Writes every metric to the log at info level.
    pub fn log_summary(&self) {
        for metric in self.snapshot() {
            match &metric.value {
                MetricValue::Counter(v) => log::info!("{} = {}", metric.id, v),
                MetricValue::Gauge(v) => log::info!("{} = {:.3} {}", metric.id, v, metric.unit),
                MetricValue::Histogram { count, max, .. } => log::info!(
                    "{}: n={} mean={:.3} max={:.3} {}",
                    metric.id,
                    count,
                    metric.value.histogram_mean().unwrap_or(0.0),
                    max,
                    metric.unit
                ),
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for counter operations.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl CounterHandle {
    /// Adds one.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, 1)
    }

    /// Adds `amount`.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        self.backend.increment_counter(&self.id, amount)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<u64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric
            .value
            .as_counter()
            .ok_or_else(|| MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: metric.value.metric_type(),
            })
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle for gauge operations.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl GaugeHandle {
    /// Sets the value.
    pub fn set(&self, value: f64) -> MetricsResult<()> {
        self.backend.set_gauge(&self.id, value)
    }

    /// Current value.
    pub fn get(&self) -> MetricsResult<f64> {
        let metric = self.backend.get_metric(&self.id)?;
        metric
            .value
            .as_gauge()
            .ok_or_else(|| MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: metric.value.metric_type(),
            })
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle for histogram operations.
#[derive(Debug, Clone)]
pub struct HistogramHandle {
    id: MetricId,
    backend: Arc<dyn MetricsBackend>,
}

impl HistogramHandle {
    /// Records a sample.
    pub fn observe(&self, value: f64) -> MetricsResult<()> {
        self.backend.record_histogram_sample(&self.id, value)
    }

    /// The full histogram state.
    pub fn get_metric(&self) -> MetricsResult<Metric> {
        self.backend.get_metric(&self.id)
    }

    /// Number of samples recorded.
    pub fn count(&self) -> MetricsResult<u64> {
        match self.get_metric()?.value {
            MetricValue::Histogram { count, .. } => Ok(count),
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Histogram,
                found: other.metric_type(),
            }),
        }
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}
