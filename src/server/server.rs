//! Listener and accept loop: owns the process-wide `Broker` and spawns one
//! `Session` per accepted connection, enforcing the connection and per-IP
//! limits from `ServerConfig`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::broker::{Broker, BrokerEvent, SessionHandle, SessionId};
use crate::server::config::ServerConfig;
use crate::session::Session;
use crate::{Error, Result};

pub struct RtmpServer {
    config: Arc<ServerConfig>,
    broker: Broker,
    shutdown: Arc<AtomicBool>,
}

impl RtmpServer {
    /// Create new server
    pub fn new(config: ServerConfig) -> Self {
        RtmpServer {
            config: Arc::new(config),
            broker: Broker::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Subscribes to connect/publish/play lifecycle events and their
    /// pre/post/done phases, for embedding applications.
    pub fn on(&self) -> broadcast::Receiver<BrokerEvent> {
        self.broker.on()
    }

    /// Looks up a live session's handle by id, for embedders that want to
    /// inspect or act on a specific connection (e.g. force a disconnect).
    pub async fn get_session(&self, id: SessionId) -> Option<SessionHandle> {
        self.broker.get_session(id).await
    }

    /// Listen and accept connections
    pub async fn listen(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::connection(format!("failed to bind {}: {}", addr, e)))?;

        info!("RTMP server listening on {}", addr);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let (stream, remote_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {}", e);
                    continue;
                }
            };

            if self.broker.session_count().await >= self.config.max_connections {
                warn!("connection limit reached, rejecting {}", remote_addr);
                drop(stream);
                continue;
            }

            let ip = remote_addr.ip();
            if !self.broker.can_accept_from_ip(ip, self.config.max_connections_per_ip).await {
                warn!("per-IP connection limit reached for {}, rejecting", ip);
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                warn!("failed to set TCP_NODELAY for {}: {}", remote_addr, e);
            }

            self.broker.track_ip(ip).await;
            info!("accepted connection from {}", remote_addr);

            let config = self.config.clone();
            let broker = self.broker.clone();
            tokio::spawn(async move {
                if let Err(e) = Session::run(stream, remote_addr, config, broker.clone()).await {
                    error!("session from {} ended with error: {}", remote_addr, e);
                }
                broker.untrack_ip(ip).await;
            });
        }

        info!("server stopped accepting connections");
        Ok(())
    }

    /// Shutdown server
    pub async fn shutdown(&self) {
        info!("shutting down server");
        self.shutdown.store(true, Ordering::Relaxed);
        self.broker.stop_all_sessions().await;
    }

    /// Get active connections count
    pub async fn connection_count(&self) -> usize {
        self.broker.session_count().await
    }
}
