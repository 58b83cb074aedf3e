//! HTTP server listener
//!
//! Binds the listener, serves the router and, on shutdown, closes every
//! live subscription so long-lived event streams end and the graceful
//! shutdown can complete.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::features::{FeatureService, MemoryFeatureStore};
use crate::registry::{Broadcaster, CloseReason, SubscriberRegistry};
use crate::server::config::ServerConfig;
use crate::server::routes::{self, AppState};

/// Feature flag streaming server
pub struct FlagServer {
    config: Arc<ServerConfig>,
    registry: Arc<SubscriberRegistry>,
    service: Arc<FeatureService>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl FlagServer {
    /// Create a new server with an empty in-memory store
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryFeatureStore::new()))
    }

    /// Create a new server over an existing store
    pub fn with_store(config: ServerConfig, store: Arc<MemoryFeatureStore>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(SubscriberRegistry::with_config(config.registry.clone()));
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let service = Arc::new(FeatureService::new(store, broadcaster));

        Self {
            config: Arc::new(config),
            registry,
            service,
            connection_semaphore,
        }
    }

    /// Get a reference to the subscriber registry
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Get a reference to the mutation layer
    pub fn service(&self) -> &Arc<FeatureService> {
        &self.service
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        routes::router(AppState {
            service: Arc::clone(&self.service),
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            connections: self.connection_semaphore.clone(),
        })
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Flag server listening");

        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Flag server listening");

        let registry = Arc::clone(&self.registry);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                // Streams never end on their own; close them so connections drain
                registry.close_all(CloseReason::Shutdown);
            })
            .await?;

        tracing::info!("Flag server stopped");
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

impl std::fmt::Debug for FlagServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagServer")
            .field("bind_addr", &self.config.bind_addr)
            .field("subscriptions", &self.registry.len())
            .finish()
    }
}
