//! Push sensor readings to a running aero-server, the way a device would.
//!
//! Each reading is sent as a `sensorData` frame. With `--confirm`, the tool
//! waits for the server's `newReading` echo, which only arrives once the
//! reading was stored. Each frame carries a run id and sequence number, so
//! echoes of other devices' readings are not mistaken for our own.

use std::time::Duration;

use aero_core::SensorEvent;
use aero_dashboard::ChannelMessage;
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SENDER_FIELD: &str = "sender";
const SEQ_FIELD: &str = "seq";

#[derive(Parser, Debug)]
#[command(version, about = "Send temperature/humidity readings over the realtime channel")]
struct Args {
    /// WebSocket endpoint
    #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,
    /// Temperature in °C
    #[arg(long, default_value_t = 22.0)]
    temperature: f64,
    /// Relative humidity in %
    #[arg(long, default_value_t = 55.0)]
    humidity: f64,
    /// Number of readings to send
    #[arg(long, default_value_t = 1)]
    count: u32,
    /// Delay between readings
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
    /// Stamp each reading with the local clock instead of letting the server default it
    #[arg(long)]
    with_timestamp: bool,
    /// Wait for the newReading echo after each send
    #[arg(long)]
    confirm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    tracing::info!(url = %args.url, "Connecting");
    let (ws_stream, _) = connect_async(args.url.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();
    let sender_id = format!(
        "send-reading-{}-{}",
        std::process::id(),
        Utc::now().timestamp_millis()
    );

    for i in 0..args.count {
        // Small drift so a chart of repeated sends is not a flat line.
        let drift = f64::from(i % 10) * 0.1;
        let mut event = SensorEvent::new(args.temperature + drift, args.humidity - drift)
            .with_field(SENDER_FIELD, Value::from(sender_id.as_str()))
            .with_field(SEQ_FIELD, Value::from(i));
        if args.with_timestamp {
            event = event.with_timestamp(Utc::now());
        }

        let frame = serde_json::to_string(&ChannelMessage::SensorData(event.clone()))?;
        tracing::info!(seq = i + 1, frame = %frame, "Sending reading");
        write.send(Message::Text(frame)).await?;

        if args.confirm {
            let echo = tokio::time::timeout(Duration::from_secs(5), async {
                while let Some(msg) = read.next().await {
                    if let Ok(Message::Text(text)) = msg {
                        match serde_json::from_str::<ChannelMessage>(&text) {
                            Ok(ChannelMessage::NewReading(echo)) if is_own_echo(&event, &echo) => {
                                return Ok(echo)
                            }
                            Ok(ChannelMessage::Error { message }) => return Err(message),
                            _ => continue,
                        }
                    }
                }
                Err("connection closed".to_string())
            })
            .await;

            match echo {
                Ok(Ok(event)) => tracing::info!(
                    temperature = event.temperature(),
                    humidity = event.humidity(),
                    "Reading stored and broadcast"
                ),
                Ok(Err(message)) => bail!("server rejected reading: {message}"),
                Err(_) => bail!("no echo within 5s, reading was probably not stored"),
            }
        }

        if i + 1 < args.count {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    write.send(Message::Close(None)).await?;
    Ok(())
}

/// Whether `echo` is the broadcast of the reading we sent.
fn is_own_echo(sent: &SensorEvent, echo: &SensorEvent) -> bool {
    let tag = |event: &SensorEvent| {
        (
            event.payload().get(SENDER_FIELD).cloned(),
            event.payload().get(SEQ_FIELD).cloned(),
        )
    };
    let (sender, seq) = tag(sent);
    sender.is_some() && seq.is_some() && tag(echo) == (sender, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(sender: &str, seq: u32) -> SensorEvent {
        SensorEvent::new(22.0, 55.0)
            .with_field(SENDER_FIELD, Value::from(sender))
            .with_field(SEQ_FIELD, Value::from(seq))
    }

    fn echoed(event: &SensorEvent) -> SensorEvent {
        serde_json::from_str(&serde_json::to_string(event).unwrap()).unwrap()
    }

    #[test]
    fn test_own_echo_matches() {
        let sent = tagged("send-reading-1", 0);
        assert!(is_own_echo(&sent, &echoed(&sent)));
    }

    #[test]
    fn test_other_devices_readings_ignored() {
        let sent = tagged("send-reading-1", 0);
        assert!(!is_own_echo(&sent, &tagged("send-reading-2", 0)));
        assert!(!is_own_echo(&sent, &tagged("send-reading-1", 1)));
        // Same values from an untagged device.
        assert!(!is_own_echo(&sent, &SensorEvent::new(22.0, 55.0)));
    }
}
