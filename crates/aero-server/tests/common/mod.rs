//! Shared helpers for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use aero_dashboard::ChannelMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket to a running server.
pub async fn connect(addr: SocketAddr) -> Client {
    let (stream, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    stream
}

/// Send a raw text frame.
pub async fn send_text(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

/// Send a `sensorData` frame with the given payload.
pub async fn send_sensor_data(client: &mut Client, data: serde_json::Value) {
    let frame = serde_json::json!({ "event": "sensorData", "data": data });
    send_text(client, &frame.to_string()).await;
}

/// Next text frame as raw JSON, or `None` if nothing arrives in time.
pub async fn next_frame(client: &mut Client, wait: Duration) -> Option<serde_json::Value> {
    tokio::time::timeout(wait, async {
        while let Some(msg) = client.next().await {
            if let Ok(Message::Text(text)) = msg {
                return serde_json::from_str(&text).ok();
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Next frame decoded into a channel message.
pub async fn next_message(client: &mut Client) -> ChannelMessage {
    let frame = next_frame(client, Duration::from_secs(2))
        .await
        .expect("expected a frame within 2s");
    serde_json::from_value(frame).unwrap()
}

/// Give the server a moment to subscribe a freshly upgraded connection.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
