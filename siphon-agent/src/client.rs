//! Hub connection
//!
//! Keeps one WebSocket to the hub open for the life of the process:
//! connect, register, serve hub requests until the channel drops, then
//! reconnect with backoff. A rejected registration ends the loop for good.

use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use siphon_core::dto::wire::{RegisterStatus, WireMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::Config;
use crate::session::SessionHandler;

const ACK_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_CAPACITY: usize = 64;

/// How a channel ended
enum Disconnect {
    /// Transient; reconnect after backoff
    Lost,
    /// The hub refused this agent
    Rejected(String),
}

pub struct HubConnection {
    config: Config,
    handler: Arc<SessionHandler>,
}

impl HubConnection {
    pub fn new(config: Config, handler: Arc<SessionHandler>) -> Self {
        Self { config, handler }
    }

    /// Serves the hub until registration is rejected
    ///
    /// # Errors
    /// Only when the hub rejects the registration.
    pub async fn run(&self) -> Result<()> {
        let mut backoff = Backoff::new(self.config.reconnect.clone());

        loop {
            info!(url = %self.config.hub_url, "connecting to hub");
            match self.serve_once(&mut backoff).await {
                Ok(Disconnect::Rejected(msg)) => {
                    error!(agent = %self.config.agent_name, "hub rejected registration: {}", msg);
                    bail!("hub rejected agent '{}': {}", self.config.agent_name, msg);
                }
                Ok(Disconnect::Lost) => info!("hub channel closed"),
                Err(e) => warn!("hub connection failed: {:#}", e),
            }

            self.handler.close_all().await;
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    /// One channel lifetime: connect, register, serve
    async fn serve_once(&self, backoff: &mut Backoff) -> Result<Disconnect> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.config.hub_url.as_str())
            .await
            .context("Failed to connect to hub")?;
        let (mut write, mut read) = socket.split();

        let register = WireMessage::Register {
            name: self.config.agent_name.clone(),
            connector_ids: self.handler.connector_ids(),
        };
        write
            .send(Message::Text(register.to_text()?.into()))
            .await
            .context("Failed to send register")?;

        let ack = tokio::time::timeout(ACK_TIMEOUT, next_message(&mut read))
            .await
            .context("Timed out waiting for registerAck")?;
        match ack {
            Some(WireMessage::RegisterAck {
                status: RegisterStatus::Ok,
                ..
            }) => {}
            Some(WireMessage::RegisterAck {
                status: RegisterStatus::Rejected,
                msg,
            }) => return Ok(Disconnect::Rejected(msg.unwrap_or_default())),
            Some(other) => bail!("expected registerAck, got '{}'", other.kind()),
            None => return Ok(Disconnect::Lost),
        }

        backoff.reset();
        info!(agent = %self.config.agent_name, "registered with hub");

        let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(OUTBOUND_CAPACITY);
        let mut reaper = tokio::time::interval(reap_interval(self.config.session_ttl));

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match WireMessage::from_text(text.as_str()) {
                        Ok(msg) => self.dispatch(msg, &out_tx),
                        Err(e) => warn!(error = %e, "malformed hub message"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(Disconnect::Lost),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "hub socket read error");
                        return Ok(Disconnect::Lost);
                    }
                },
                Some(reply) = out_rx.recv() => {
                    let text = reply.to_text()?;
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!(error = %e, "failed to send reply to hub");
                        return Ok(Disconnect::Lost);
                    }
                }
                _ = reaper.tick() => {
                    let reaped = self.handler.reap_expired().await;
                    if reaped > 0 {
                        debug!(reaped, "expired sessions released");
                    }
                }
            }
        }
    }

    /// Handles a hub message on its own task so a long fetch pass does not
    /// hold up other sessions
    fn dispatch(&self, msg: WireMessage, out_tx: &mpsc::Sender<WireMessage>) {
        debug!(kind = msg.kind(), request_id = ?msg.request_id(), "hub message");
        let handler = Arc::clone(&self.handler);
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = handler.handle(msg).await {
                if out_tx.send(reply).await.is_err() {
                    debug!("hub channel gone before the reply was sent");
                }
            }
        });
    }
}

fn reap_interval(ttl: Duration) -> Duration {
    (ttl / 2).max(Duration::from_millis(100))
}

async fn next_message<S>(read: &mut S) -> Option<WireMessage>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match WireMessage::from_text(text.as_str()) {
                Ok(msg) => return Some(msg),
                Err(e) => warn!(error = %e, "malformed hub message"),
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconnectConfig;
    use siphon_engine::{CrawlContext, Registry};
    use tokio::net::TcpListener;

    fn config(url: String) -> Config {
        let mut config = Config::new("edge-1".to_string(), url);
        config.reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        config
    }

    fn handler() -> Arc<SessionHandler> {
        let ctx = CrawlContext::with_cool_down(Registry::default(), Duration::ZERO);
        Arc::new(SessionHandler::new(Arc::new(ctx), Duration::from_secs(60)))
    }

    /// Accepts one agent, answers its register with `ack`, then runs `script`
    async fn fake_hub<F, Fut>(ack: WireMessage, script: F) -> String
    where
        F: FnOnce(
                futures::stream::SplitSink<
                    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
                    Message,
                >,
                futures::stream::SplitStream<tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>>,
            ) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/agent/ws", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut write, mut read) = socket.split();
            match next_message(&mut read).await {
                Some(WireMessage::Register { name, .. }) => assert_eq!(name, "edge-1"),
                other => panic!("expected register, got {:?}", other),
            }
            write
                .send(Message::Text(ack.to_text().unwrap().into()))
                .await
                .unwrap();
            script(write, read).await;
        });
        url
    }

    #[tokio::test]
    async fn test_rejected_registration_stops_the_agent() {
        let ack = WireMessage::RegisterAck {
            status: RegisterStatus::Rejected,
            msg: Some("unknown agent 'edge-1'".to_string()),
        };
        let url = fake_hub(ack, |_, _| async {}).await;

        let connection = HubConnection::new(config(url), handler());
        let err = connection.run().await.unwrap_err();
        assert!(err.to_string().contains("unknown agent"));
    }

    #[tokio::test]
    async fn test_unknown_connector_start_is_answered_with_over() {
        let (seen_tx, mut seen_rx) = mpsc::channel(1);
        let ack = WireMessage::RegisterAck {
            status: RegisterStatus::Ok,
            msg: None,
        };
        let url = fake_hub(ack, move |mut write, mut read| async move {
            let start = WireMessage::Start {
                request_id: "r1".to_string(),
                connector_id: "missing".to_string(),
                params: serde_json::Value::Null,
            };
            write
                .send(Message::Text(start.to_text().unwrap().into()))
                .await
                .unwrap();
            let reply = next_message(&mut read).await;
            seen_tx.send(reply).await.unwrap();
        })
        .await;

        let connection = HubConnection::new(config(url), handler());
        let agent = tokio::spawn(async move { connection.run().await });

        let reply = seen_rx.recv().await.unwrap();
        assert_eq!(reply, Some(WireMessage::over("r1")));
        agent.abort();
    }

    #[tokio::test]
    async fn test_connection_failures_are_retried() {
        // Nothing listens on the first attempt; the hub appears afterwards.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connection = HubConnection::new(config(format!("ws://{}/agent/ws", addr)), handler());
        let agent = tokio::spawn(async move { connection.run().await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let listener = TcpListener::bind(addr).await.unwrap();
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        let socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (_write, mut read) = socket.split();
        assert!(matches!(
            next_message(&mut read).await,
            Some(WireMessage::Register { .. })
        ));
        agent.abort();
    }

    #[test]
    fn test_reap_interval_has_a_floor() {
        assert_eq!(reap_interval(Duration::from_secs(300)), Duration::from_secs(150));
        assert_eq!(reap_interval(Duration::from_millis(10)), Duration::from_millis(100));
    }
}
