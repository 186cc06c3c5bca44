//! Agent WebSocket endpoint
//!
//! One connection per agent. The first frame must be `register`; after the
//! `registerAck` the connection carries correlated requests from the hub and
//! replies from the agent until either side closes it.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use siphon_core::dto::wire::{RegisterStatus, WireMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::AppState;
use crate::hub::AgentHub;

const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_CAPACITY: usize = 64;

/// GET /agent/ws
pub async fn agent_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_agent(socket, state.hub))
}

async fn serve_agent(socket: WebSocket, hub: Arc<AgentHub>) {
    let (mut sender, mut receiver) = socket.split();

    let (name, connector_ids) =
        match tokio::time::timeout(REGISTER_TIMEOUT, next_message(&mut receiver)).await {
            Ok(Some(WireMessage::Register {
                name,
                connector_ids,
            })) => (name, connector_ids),
            Ok(Some(other)) => {
                warn!(kind = other.kind(), "expected register as first agent message");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                warn!("agent did not register in time");
                return;
            }
        };

    let (tx, mut rx) = mpsc::channel::<WireMessage>(OUTBOUND_CAPACITY);
    let registered = hub.register(&name, connector_ids, tx);
    let ack = match &registered {
        Ok(_) => WireMessage::RegisterAck {
            status: RegisterStatus::Ok,
            msg: None,
        },
        Err(msg) => WireMessage::RegisterAck {
            status: RegisterStatus::Rejected,
            msg: Some(msg.clone()),
        },
    };
    if let Err(e) = send(&mut sender, &ack).await {
        warn!(agent = %name, error = %e, "failed to send registerAck");
    }
    let link = match registered {
        Ok(link) => link,
        Err(_) => {
            let _ = sender.close().await;
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send(&mut sender, &msg).await {
                debug!(error = %e, "agent socket closed while sending");
                break;
            }
        }
    });

    let recv_hub = Arc::clone(&hub);
    let agent = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = next_message(&mut receiver).await {
            debug!(agent = %agent, kind = msg.kind(), "agent message");
            recv_hub.dispatch(&agent, msg);
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(&link);
    info!(agent = %name, "agent channel closed");
}

async fn send<S>(sender: &mut S, msg: &WireMessage) -> anyhow::Result<()>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = msg.to_text()?;
    sender.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Next wire message, skipping control frames and malformed text
///
/// `None` once the socket is closed or broken.
async fn next_message(receiver: &mut SplitStream<WebSocket>) -> Option<WireMessage> {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match WireMessage::from_text(text.as_str()) {
                Ok(msg) => return Some(msg),
                Err(e) => warn!(error = %e, "malformed agent message"),
            },
            Ok(Message::Close(_)) => return None,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "agent socket read error");
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use siphon_core::domain::source::SourceMeta;
    use tokio_tungstenite::tungstenite;

    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        format!("ws://{}/agent/ws", addr)
    }

    async fn recv<S>(read: &mut S) -> Option<WireMessage>
    where
        S: futures::Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = read.next().await {
            match frame.ok()? {
                tungstenite::Message::Text(text) => return WireMessage::from_text(text.as_str()).ok(),
                tungstenite::Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    }

    fn text(msg: &WireMessage) -> tungstenite::Message {
        tungstenite::Message::Text(msg.to_text().unwrap().into())
    }

    #[tokio::test]
    async fn test_registered_agent_answers_over_the_socket() {
        let state = crate::api::tests::state();
        let hub = Arc::clone(&state.hub);
        let url = serve(state).await;

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut write, mut read) = socket.split();
        write
            .send(text(&WireMessage::Register {
                name: "edge-1".to_string(),
                connector_ids: vec!["remote-only".to_string()],
            }))
            .await
            .unwrap();
        assert_eq!(
            recv(&mut read).await,
            Some(WireMessage::RegisterAck {
                status: RegisterStatus::Ok,
                msg: None,
            })
        );
        assert!(hub.serves("remote-only"));

        let link = hub.select("remote-only", None).unwrap();
        let agent = tokio::spawn(async move {
            let start = recv(&mut read).await.unwrap();
            let request_id = start.request_id().unwrap().to_string();
            write
                .send(text(&WireMessage::SourceInfo {
                    request_id,
                    meta: SourceMeta::new("Remote", "https://remote.example", "sort_key"),
                }))
                .await
                .unwrap();
            write.close().await.unwrap();
        });

        let reply = hub
            .request(
                &link,
                WireMessage::Start {
                    request_id: "r1".to_string(),
                    connector_id: "remote-only".to_string(),
                    params: serde_json::Value::Null,
                },
            )
            .await;
        agent.await.unwrap();
        assert_eq!(reply.kind(), "sourceInfo");

        for _ in 0..100 {
            if hub.agents().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(hub.agents().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_rejected_and_disconnected() {
        let state = crate::api::tests::state();
        let hub = Arc::clone(&state.hub);
        let url = serve(state).await;

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        let (mut write, mut read) = socket.split();
        write
            .send(text(&WireMessage::Register {
                name: "stranger".to_string(),
                connector_ids: vec![],
            }))
            .await
            .unwrap();

        match recv(&mut read).await {
            Some(WireMessage::RegisterAck { status, msg }) => {
                assert_eq!(status, RegisterStatus::Rejected);
                assert!(msg.unwrap().contains("stranger"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(recv(&mut read).await, None);
        assert!(hub.agents().is_empty());
    }
}
