//! WebSocket server listener
//!
//! Handles the TCP accept loop and spawns one task per subscriber. Each task
//! completes the WebSocket upgrade, registers the write half with the
//! pipeline, then reads only to notice when the peer goes away.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_tungstenite::tungstenite::Message;

use super::config::ServerConfig;
use super::sink::WsSink;
use crate::error::Result;
use crate::lifecycle::{LifecyclePhase, Pipeline};

/// WebSocket push server
pub struct TelemetryServer {
    config: ServerConfig,
    pipeline: Arc<Pipeline<WsSink>>,
    next_peer_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl TelemetryServer {
    /// Create a server feeding subscribers from `pipeline`
    pub fn new(config: ServerConfig, pipeline: Arc<Pipeline<WsSink>>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            pipeline,
            next_peer_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Pipeline the server registers subscribers with
    pub fn pipeline(&self) -> &Arc<Pipeline<WsSink>> {
        &self.pipeline
    }

    /// Run the server
    ///
    /// This method blocks until the accept loop fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "WebSocket server listening");
        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "WebSocket server listening");
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // The permit moves into the task and is held for the connection's lifetime.
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let peer_id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(peer_id = peer_id, peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let pipeline = Arc::clone(&self.pipeline);

        tokio::spawn(async move {
            serve_subscriber(peer_id, socket, peer_addr, config, pipeline, permit).await;
            tracing::debug!(peer_id = peer_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

async fn serve_subscriber(
    peer_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    pipeline: Arc<Pipeline<WsSink>>,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let stream = match tokio::time::timeout(
        config.handshake_timeout,
        tokio_tungstenite::accept_async(socket),
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(peer_id = peer_id, peer = %peer_addr, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(peer_id = peer_id, peer = %peer_addr, "WebSocket handshake timed out");
            return;
        }
    };

    // Subscribed before registering so a teardown racing the welcome is seen.
    let mut phase = pipeline.subscribe_phase();
    let (writer, mut reader) = stream.split();
    let subscriber = match pipeline.connect(WsSink::new(writer, config.write_timeout)).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            tracing::debug!(peer_id = peer_id, error = %e, "Subscriber not registered");
            return;
        }
    };
    let id = subscriber.id();
    drop(subscriber);

    loop {
        tokio::select! {
            message = reader.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(peer_id = peer_id, error = %e, "WebSocket read failed");
                    break;
                }
            },
            changed = phase.changed() => {
                if changed.is_err() || *phase.borrow() >= LifecyclePhase::Stopping {
                    break;
                }
            }
        }
    }

    pipeline.disconnect(id).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::sync::oneshot;
    use tokio_tungstenite::connect_async;

    use super::*;
    use crate::lifecycle::PipelineConfig;
    use crate::producer::{BrokerConfig, SyntheticConfig};

    async fn next_json<S>(stream: &mut S) -> Value
    where
        S: futures_util::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn start(config: ServerConfig) -> (SocketAddr, Arc<Pipeline<WsSink>>, oneshot::Sender<()>) {
        let pipeline_config = PipelineConfig::default()
            .broker(BrokerConfig::default().disabled())
            .synthetic(
                SyntheticConfig::default()
                    .sweep_interval(Duration::from_millis(50))
                    .sensor_pacing(Duration::from_millis(10)),
            );
        let pipeline = Arc::new(Pipeline::new(pipeline_config));
        pipeline.start().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TelemetryServer::new(config, Arc::clone(&pipeline));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        (addr, pipeline, stop_tx)
    }

    async fn wait_for_count(pipeline: &Pipeline<WsSink>, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while pipeline.manager().connection_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let (addr, pipeline, stop) = start(ServerConfig::default()).await;

        let (mut client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        let welcome = next_json(&mut client).await;
        assert_eq!(welcome["type"], "connection");
        assert!(welcome["connection_id"].as_str().unwrap().starts_with("conn_"));

        let update = loop {
            let message = next_json(&mut client).await;
            if message["type"] == "sensor_update" {
                break message;
            }
        };
        assert!(update["data"].is_object());
        assert_eq!(pipeline.manager().connection_count().await, 1);

        client.close(None).await.unwrap();
        wait_for_count(&pipeline, 0).await;

        pipeline.shutdown().await.unwrap();
        let _ = stop.send(());
    }

    #[tokio::test]
    async fn test_shutdown_closes_clients() {
        let (addr, pipeline, stop) = start(ServerConfig::default()).await;
        let (mut client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        next_json(&mut client).await;

        pipeline.shutdown().await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
        let _ = stop.send(());
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (addr, pipeline, stop) = start(ServerConfig::default().max_connections(1)).await;

        let (mut first, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        next_json(&mut first).await;

        let second = connect_async(format!("ws://{}", addr)).await;
        assert!(second.is_err());
        assert_eq!(pipeline.manager().connection_count().await, 1);

        pipeline.shutdown().await.unwrap();
        let _ = stop.send(());
    }
}
