//! Builder for [`RequestManager`]

use crate::manager::RequestManager;
use crate::metrics::ManagerMetrics;
use crate::transport::Transport;
use std::sync::Arc;
use wirecall_core::{Error, ObservabilityConfig, Result};

/// Configures transports and observability, then builds a manager
///
/// ```rust,no_run
/// use wirecall_client::{ManagerBuilder, WebSocketTransport};
///
/// # async fn run() -> wirecall_core::Result<()> {
/// let manager = ManagerBuilder::new()
///     .transport(WebSocketTransport::new("ws://localhost:8546"))
///     .with_default_observability()
///     .service_name("indexer")
///     .build()?;
/// manager.connect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ManagerBuilder {
    transports: Vec<Box<dyn Transport>>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transport; the first one added carries outbound requests
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transports.push(Box::new(transport));
        self
    }

    pub fn boxed_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Initialize logging, tracing and metrics export on `build`
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Service name reported by observability; overrides the config's
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<RequestManager> {
        if self.transports.is_empty() {
            return Err(Error::Config(
                "at least one transport is required".to_string(),
            ));
        }

        let metrics = match self.observability_config {
            Some(mut config) => {
                if let Some(name) = self.service_name {
                    config.service_name = name;
                }
                wirecall_core::init_observability(config.clone()).map_err(|e| {
                    Error::Config(format!("failed to initialize observability: {}", e))
                })?;
                Some(Arc::new(ManagerMetrics::new(config.service_name)))
            }
            None => None,
        };

        tracing::debug!(
            transports = self.transports.len(),
            metrics = metrics.is_some(),
            "building request manager"
        );
        RequestManager::with_metrics(self.transports, metrics)
    }
}
