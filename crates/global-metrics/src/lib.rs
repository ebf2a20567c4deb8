//! A single process-wide `MetricStorageRegistry` so every component's
//! `#[derive(MetricStorage)]` struct registers into one `/metrics` endpoint
//! instead of each owning a private registry.

use {once_cell::sync::Lazy, prometheus_metric_storage::MetricStorageRegistry};

static REGISTRY: Lazy<MetricStorageRegistry> = Lazy::new(MetricStorageRegistry::default);

pub fn get_metric_storage_registry() -> &'static MetricStorageRegistry {
    &REGISTRY
}
