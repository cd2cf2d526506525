//! Port for dispatcher observability counters.

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by metrics adapters. The dispatcher treats them as
    /// non-fatal: a failed counter write never aborts a drain cycle.
    pub enum DispatcherMetricsError {
        /// The metrics backend rejected or dropped the write.
        Backend { message: String } => "dispatcher metrics backend failure: {message}",
    }
}

/// Port for recording dispatcher outcomes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatcherMetrics: Send + Sync {
    /// One entry published to the bus.
    async fn record_published(&self) -> Result<(), DispatcherMetricsError>;

    /// One publish attempt failed (entry remains retryable).
    async fn record_failed(&self) -> Result<(), DispatcherMetricsError>;

    /// One entry exhausted its retries and is now dead-lettered.
    async fn record_dead_lettered(&self) -> Result<(), DispatcherMetricsError>;

    /// Published entries removed by the cleanup sweeper.
    async fn record_swept(&self, count: u64) -> Result<(), DispatcherMetricsError>;
}

/// No-op metrics sink used until an exporter is wired in.
#[derive(Debug, Clone, Default)]
pub struct NoOpDispatcherMetrics;

#[async_trait]
impl DispatcherMetrics for NoOpDispatcherMetrics {
    async fn record_published(&self) -> Result<(), DispatcherMetricsError> {
        Ok(())
    }

    async fn record_failed(&self) -> Result<(), DispatcherMetricsError> {
        Ok(())
    }

    async fn record_dead_lettered(&self) -> Result<(), DispatcherMetricsError> {
        Ok(())
    }

    async fn record_swept(&self, _count: u64) -> Result<(), DispatcherMetricsError> {
        Ok(())
    }
}
