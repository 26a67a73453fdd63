//! WebSocket subscriber sink

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;

use crate::broadcast::{PushFrame, SinkError, SubscriberSink};

type WsWriter = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Write half of one WebSocket connection
///
/// Writes are serialized by a mutex and bounded by the write timeout.
pub struct WsSink {
    writer: Mutex<Option<WsWriter>>,
    write_timeout: Duration,
}

impl WsSink {
    pub fn new(writer: WsWriter, write_timeout: Duration) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            write_timeout,
        }
    }
}

impl SubscriberSink for WsSink {
    async fn send(&self, frame: PushFrame) -> Result<(), SinkError> {
        let text = Utf8Bytes::try_from(frame.into_payload())
            .map_err(|e| SinkError::Encoding(e.to_string()))?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SinkError::Closed)?;

        match tokio::time::timeout(self.write_timeout, writer.send(Message::Text(text))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Io(e.to_string())),
            Err(_) => Err(SinkError::TimedOut),
        }
    }

    async fn close(&self) {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        let _ = tokio::time::timeout(self.write_timeout, writer.close()).await;
    }
}
