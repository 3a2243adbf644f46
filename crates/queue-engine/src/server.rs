//! # Queue Server
//!
//! [`QueueServer`] owns a running queue: the SQLite store, the engine, the
//! escalation sweep, the change poller and the HTTP listener.
//!
//! ```text
//!            ┌─────────────── QueueServer ────────────────┐
//!  HTTP ───▶ │ api::create_router ──▶ QueueEngine ──▶ store │
//!            │                          │                  │
//!            │                     ChangeSignal            │
//!            │                          │                  │
//!            │ change poller (1 s) ─────┘──▶ PushChannel ──┼──▶ SSE observers
//!            │ escalation sweep (60 s) ──▶ Notifier ───────┼──▶ email
//!            └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use digiqueue_engine::prelude::*;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let mut config = QueueEngineConfig::default();
//! config.database.url = "sqlite::memory:".to_string();
//! config.general.bind_address = "127.0.0.1:8080".to_string();
//!
//! let mut server = QueueServer::new(config).await?;
//! server.start().await?;
//!
//! tokio::signal::ctrl_c().await?;
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Background loops run for the life of the server and are aborted on
//! [`QueueServer::stop`]. The listener shuts down gracefully.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{create_router, ApiState};
use crate::config::QueueEngineConfig;
use crate::database::{QueueStore, SqliteQueueStore};
use crate::engine::QueueEngine;
use crate::error::{QueueEngineError, Result};
use crate::escalation::EscalationSweep;
use crate::notifier::{LogNotifier, Notifier};
use crate::signal::{ChangePoller, ChangeSignal, PushChannel};

/// A complete queue server
pub struct QueueServer {
    config: QueueEngineConfig,
    store: Arc<SqliteQueueStore>,
    engine: Arc<QueueEngine>,
    sweep: Arc<EscalationSweep>,
    push: PushChannel,

    /// Address the listener is bound to once started
    local_addr: Option<SocketAddr>,

    /// Optional handle to the escalation sweep task
    sweep_handle: Option<JoinHandle<()>>,

    /// Optional handle to the change poller task
    poller_handle: Option<JoinHandle<()>>,

    /// Optional handle to the HTTP listener task
    http_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl QueueServer {
    /// Create a new QueueServer that logs escalation emails
    pub async fn new(config: QueueEngineConfig) -> Result<Self> {
        let notifier = Arc::new(LogNotifier::new(config.notifications.sender.clone()));
        Self::with_notifier(config, notifier).await
    }

    /// Create a new QueueServer with a custom notifier
    pub async fn with_notifier(config: QueueEngineConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        config.validate()?;
        info!("🚀 Creating queue server");

        let store = Arc::new(
            SqliteQueueStore::new(&config.database.url, config.database.max_connections).await?,
        );
        let dyn_store: Arc<dyn QueueStore> = store.clone();

        let signal = ChangeSignal::new();
        let engine = Arc::new(QueueEngine::new(dyn_store.clone(), signal, &config));
        let sweep = Arc::new(EscalationSweep::new(dyn_store, notifier, &config));
        let push = PushChannel::new(config.general.push_channel.clone(), config.push.buffer);

        info!("✅ Queue engine initialized");
        Ok(Self {
            config,
            store,
            engine,
            sweep,
            push,
            local_addr: None,
            sweep_handle: None,
            poller_handle: None,
            http_handle: None,
            shutdown_tx: None,
        })
    }

    /// Bind the listener and spawn the background loops
    pub async fn start(&mut self) -> Result<()> {
        if self.http_handle.is_some() {
            return Err(QueueEngineError::internal("server already started"));
        }

        if self.config.escalation.enabled {
            let sweep = self.sweep.clone();
            let period = self.config.escalation.sweep_interval();
            self.sweep_handle = Some(tokio::spawn(async move {
                Self::escalation_loop(sweep, period).await;
            }));
            info!("✅ Started escalation sweep every {:?}", period);
        } else {
            info!("Escalation sweep disabled");
        }

        let poller = ChangePoller::new(self.engine.signal().clone(), self.push.clone());
        let period = self.config.push.poll_interval();
        self.poller_handle = Some(tokio::spawn(async move {
            Self::poller_loop(poller, period).await;
        }));
        info!("✅ Started change poller every {:?} on {}", period, self.push.path());

        let listener = TcpListener::bind(&self.config.general.bind_address)
            .await
            .map_err(|e| {
                QueueEngineError::config(format!("cannot bind {}: {}", self.config.general.bind_address, e))
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| QueueEngineError::internal(e.to_string()))?;

        let router = create_router(ApiState::new(self.engine.clone(), self.store.clone(), self.push.clone()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.http_handle = Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
                error!("HTTP listener failed: {}", e);
            }
        }));
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        info!("📡 Queue server listening on {}", local_addr);
        Ok(())
    }

    /// Stop the server gracefully
    pub async fn stop(&mut self) -> Result<()> {
        info!("🛑 Stopping queue server...");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.http_handle.take() {
            let _ = handle.await;
        }

        for handle in [self.sweep_handle.take(), self.poller_handle.take()].into_iter().flatten() {
            handle.abort();
            let _ = handle.await;
        }

        self.local_addr = None;
        info!("✅ Queue server stopped");
        Ok(())
    }

    /// Start, wait for Ctrl-C / SIGTERM, then stop
    pub async fn run(mut self) -> Result<()> {
        self.start().await?;
        shutdown_signal().await;
        self.stop().await
    }

    pub fn engine(&self) -> &Arc<QueueEngine> {
        &self.engine
    }

    /// Store, for administrative setup
    pub fn store(&self) -> &Arc<SqliteQueueStore> {
        &self.store
    }

    pub fn sweep(&self) -> &Arc<EscalationSweep> {
        &self.sweep
    }

    pub fn push_channel(&self) -> &PushChannel {
        &self.push
    }

    pub fn config(&self) -> &QueueEngineConfig {
        &self.config
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Internal escalation loop. The first sweep runs immediately.
    async fn escalation_loop(sweep: Arc<EscalationSweep>, period: std::time::Duration) {
        info!("⏰ Starting escalation sweep");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep.sweep().await {
                error!("Escalation sweep failed: {}", e);
            }
        }
    }

    /// Internal change poller loop
    async fn poller_loop(mut poller: ChangePoller, period: std::time::Duration) {
        debug!("🔔 Starting change poller");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            poller.poll_once();
        }
    }
}

impl Drop for QueueServer {
    fn drop(&mut self) {
        for handle in [
            self.sweep_handle.take(),
            self.poller_handle.take(),
            self.http_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
