//! Agent hub
//!
//! Tracks connected agents and correlates hub requests with agent replies.
//! Each agent channel is represented by an outbound message queue; replies
//! coming back are matched to the waiting caller by `request_id`, and only
//! accepted from the agent the request was sent to. At most one request per
//! `request_id` is in flight.

use chrono::Utc;
use rand::distributions::{Distribution, WeightedIndex};
use siphon_core::domain::agent::AgentInfo;
use siphon_core::dto::wire::WireMessage;
use siphon_core::{CrawlError, Result};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory of agents allowed to register
pub trait AgentDirectory: Send + Sync {
    fn is_known(&self, name: &str) -> bool;

    /// Relative selection weight; zero keeps the agent out of selection
    fn weight(&self, name: &str) -> u32;
}

/// Fixed directory built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    agents: BTreeMap<String, u32>,
}

impl StaticDirectory {
    pub fn new(agents: BTreeMap<String, u32>) -> Self {
        Self { agents }
    }
}

impl AgentDirectory for StaticDirectory {
    fn is_known(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    fn weight(&self, name: &str) -> u32 {
        self.agents.get(name).copied().unwrap_or(0)
    }
}

/// Outbound side of one agent channel
#[derive(Debug, Clone)]
pub struct AgentLink {
    name: String,
    channel: Uuid,
    tx: mpsc::Sender<WireMessage>,
}

impl AgentLink {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Uuid {
        self.channel
    }
}

struct Connected {
    info: AgentInfo,
    link: AgentLink,
}

struct Pending {
    agent: String,
    reply: oneshot::Sender<WireMessage>,
}

pub struct AgentHub {
    directory: Box<dyn AgentDirectory>,
    agents: Mutex<HashMap<String, Connected>>,
    pending: Mutex<HashMap<String, Pending>>,
    reply_timeout: Duration,
}

impl AgentHub {
    pub fn new(directory: impl AgentDirectory + 'static, reply_timeout: Duration) -> Self {
        Self {
            directory: Box::new(directory),
            agents: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            reply_timeout,
        }
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Attaches a registered agent channel
    ///
    /// A second registration under the same name replaces the first channel.
    ///
    /// # Errors
    /// The rejection message when the directory does not know `name`.
    pub fn register(
        &self,
        name: &str,
        connector_ids: Vec<String>,
        tx: mpsc::Sender<WireMessage>,
    ) -> std::result::Result<AgentLink, String> {
        if !self.directory.is_known(name) {
            warn!(agent = name, "rejected registration from unknown agent");
            return Err(format!("unknown agent '{}'", name));
        }

        let link = AgentLink {
            name: name.to_string(),
            channel: Uuid::new_v4(),
            tx,
        };
        let info = AgentInfo {
            name: name.to_string(),
            weight: self.directory.weight(name),
            connector_ids,
            connected_at: Utc::now(),
        };
        info!(
            agent = name,
            weight = info.weight,
            connectors = ?info.connector_ids,
            "agent registered"
        );

        let previous = self.lock_agents().insert(
            name.to_string(),
            Connected {
                info,
                link: link.clone(),
            },
        );
        if previous.is_some() {
            warn!(agent = name, "agent re-registered, previous channel replaced");
        }
        Ok(link)
    }

    /// Detaches a channel and abandons the requests waiting on it
    ///
    /// Does nothing if the agent has since registered on a newer channel.
    pub fn unregister(&self, link: &AgentLink) {
        {
            let mut agents = self.lock_agents();
            match agents.get(&link.name) {
                Some(current) if current.link.channel == link.channel => {
                    agents.remove(&link.name);
                }
                _ => return,
            }
        }

        // Dropping the reply senders wakes the waiters with `over`.
        let abandoned = {
            let mut pending = self.lock_pending();
            let before = pending.len();
            pending.retain(|_, p| p.agent != link.name);
            before - pending.len()
        };
        info!(agent = %link.name, abandoned, "agent disconnected");
    }

    /// Currently connected agents, by name
    pub fn agents(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<AgentInfo> = self
            .lock_agents()
            .values()
            .map(|c| c.info.clone())
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Connector ids advertised by any connected agent
    pub fn connector_ids(&self) -> BTreeSet<String> {
        self.lock_agents()
            .values()
            .flat_map(|c| c.info.connector_ids.iter().cloned())
            .collect()
    }

    pub fn serves(&self, connector_id: &str) -> bool {
        self.lock_agents()
            .values()
            .any(|c| c.info.connector_ids.iter().any(|id| id == connector_id))
    }

    /// Picks an agent advertising `connector_id`, weighted by directory weight
    ///
    /// With `preferred` set only that agent is considered.
    ///
    /// # Errors
    /// `LackAgent` when no eligible agent is connected.
    pub fn select(&self, connector_id: &str, preferred: Option<&str>) -> Result<AgentLink> {
        let agents = self.lock_agents();
        let candidates: Vec<&Connected> = agents
            .values()
            .filter(|c| preferred.is_none_or(|name| c.info.name == name))
            .filter(|c| c.info.weight > 0)
            .filter(|c| c.info.connector_ids.iter().any(|id| id == connector_id))
            .collect();

        let lack = || match preferred {
            Some(name) => CrawlError::LackAgent(format!(
                "agent '{}' is not connected or does not serve '{}'",
                name, connector_id
            )),
            None => CrawlError::LackAgent(format!("no agent serves '{}'", connector_id)),
        };

        let dist = WeightedIndex::new(candidates.iter().map(|c| c.info.weight)).map_err(|_| lack())?;
        let chosen = candidates
            .get(dist.sample(&mut rand::thread_rng()))
            .ok_or_else(lack)?;
        debug!(agent = %chosen.info.name, connector = connector_id, "agent selected");
        Ok(chosen.link.clone())
    }

    /// Sends `msg` to `link` and waits for the correlated reply
    ///
    /// Resolves to `over` when the agent is gone, the channel closes, or the
    /// reply does not arrive within the reply timeout. The pending slot is
    /// always released. A request whose `request_id` is already waiting for a
    /// reply is not sent and resolves to `over` at once, leaving the earlier
    /// one untouched.
    pub async fn request(&self, link: &AgentLink, msg: WireMessage) -> WireMessage {
        let Some(request_id) = msg.request_id().map(String::from) else {
            warn!(kind = msg.kind(), "refusing to correlate a message without request_id");
            return WireMessage::over("");
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        match self.lock_pending().entry(request_id.clone()) {
            Entry::Occupied(_) => {
                warn!(agent = %link.name, request_id = %request_id, kind = msg.kind(), "request already in flight");
                return WireMessage::over(request_id);
            }
            Entry::Vacant(slot) => {
                slot.insert(Pending {
                    agent: link.name.clone(),
                    reply: reply_tx,
                });
            }
        }

        debug!(agent = %link.name, request_id = %request_id, kind = msg.kind(), "sending request");
        if link.tx.send(msg).await.is_err() {
            warn!(agent = %link.name, request_id = %request_id, "agent channel closed");
            self.release(&request_id);
            return WireMessage::over(request_id);
        }

        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => WireMessage::over(request_id),
            Err(_) => {
                warn!(
                    agent = %link.name,
                    request_id = %request_id,
                    timeout = ?self.reply_timeout,
                    "agent reply timed out"
                );
                self.release(&request_id);
                WireMessage::over(request_id)
            }
        }
    }

    /// Sends `msg` without waiting for a reply
    pub async fn notify(&self, link: &AgentLink, msg: WireMessage) {
        if link.tx.send(msg).await.is_err() {
            debug!(agent = %link.name, "agent channel closed before notify");
        }
    }

    /// Routes a message received from `agent` to its waiting caller
    ///
    /// Returns whether a caller was waiting for it. A reply from any agent
    /// other than the one the request went to leaves the caller waiting.
    pub fn dispatch(&self, agent: &str, msg: WireMessage) -> bool {
        let Some(request_id) = msg.request_id() else {
            warn!(agent, kind = msg.kind(), "unexpected message on agent channel");
            return false;
        };

        let pending = {
            let mut pending = self.lock_pending();
            match pending.entry(request_id.to_string()) {
                Entry::Occupied(slot) if slot.get().agent == agent => Some(slot.remove()),
                Entry::Occupied(slot) => {
                    warn!(
                        agent,
                        expected = %slot.get().agent,
                        request_id,
                        kind = msg.kind(),
                        "not my channel"
                    );
                    return false;
                }
                Entry::Vacant(_) => None,
            }
        };

        match pending {
            Some(pending) => {
                if pending.reply.send(msg).is_err() {
                    debug!(agent, "caller stopped waiting before the reply arrived");
                }
                true
            }
            None => {
                warn!(agent, request_id, kind = msg.kind(), "not my channel");
                false
            }
        }
    }

    /// Number of requests waiting for a reply
    pub fn pending(&self) -> usize {
        self.lock_pending().len()
    }

    /// Whether a request with this id is waiting for a reply
    pub fn in_flight(&self, request_id: &str) -> bool {
        self.lock_pending().contains_key(request_id)
    }

    fn release(&self, request_id: &str) {
        self.lock_pending().remove(request_id);
    }

    fn lock_agents(&self) -> std::sync::MutexGuard<'_, HashMap<String, Connected>> {
        self.agents.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticDirectory {
        StaticDirectory::new(BTreeMap::from([
            ("edge-1".to_string(), 1),
            ("edge-2".to_string(), 3),
            ("idle".to_string(), 0),
        ]))
    }

    fn hub(timeout: Duration) -> AgentHub {
        AgentHub::new(directory(), timeout)
    }

    fn attach(hub: &AgentHub, name: &str, ids: &[&str]) -> (AgentLink, mpsc::Receiver<WireMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let link = hub
            .register(name, ids.iter().map(|s| s.to_string()).collect(), tx)
            .unwrap();
        (link, rx)
    }

    #[test]
    fn test_unknown_agent_is_rejected() {
        let hub = hub(Duration::from_secs(1));
        let (tx, _rx) = mpsc::channel(1);
        let err = hub.register("stranger", vec![], tx).unwrap_err();
        assert!(err.contains("stranger"));
        assert!(hub.agents().is_empty());
    }

    #[test]
    fn test_select_respects_advertised_connectors_and_weight() {
        let hub = hub(Duration::from_secs(1));
        let (_l1, _r1) = attach(&hub, "edge-1", &["weibo"]);
        let (_l2, _r2) = attach(&hub, "edge-2", &["weibo", "bili"]);
        let (_l3, _r3) = attach(&hub, "idle", &["bili"]);

        for _ in 0..20 {
            assert_eq!(hub.select("bili", None).unwrap().name(), "edge-2");
        }
        assert_eq!(hub.select("weibo", Some("edge-1")).unwrap().name(), "edge-1");
        assert!(matches!(
            hub.select("weibo", Some("idle")),
            Err(CrawlError::LackAgent(_))
        ));
        assert!(matches!(hub.select("rss", None), Err(CrawlError::LackAgent(_))));
        assert_eq!(
            hub.connector_ids().into_iter().collect::<Vec<_>>(),
            vec!["bili", "weibo"]
        );
    }

    #[test]
    fn test_weighted_selection_reaches_every_candidate() {
        let hub = hub(Duration::from_secs(1));
        let (_l1, _r1) = attach(&hub, "edge-1", &["weibo"]);
        let (_l2, _r2) = attach(&hub, "edge-2", &["weibo"]);

        let mut seen = BTreeSet::new();
        for _ in 0..200 {
            seen.insert(hub.select("weibo", None).unwrap().name().to_string());
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        let hub = std::sync::Arc::new(hub(Duration::from_secs(1)));
        let (link, mut rx) = attach(&hub, "edge-1", &["weibo"]);

        let agent = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let msg = rx.recv().await.unwrap();
                let request_id = msg.request_id().unwrap().to_string();
                assert!(hub.dispatch("edge-1", WireMessage::over(request_id)));
            })
        };

        let reply = hub
            .request(
                &link,
                WireMessage::Start {
                    request_id: "r1".to_string(),
                    connector_id: "weibo".to_string(),
                    params: serde_json::Value::Null,
                },
            )
            .await;
        agent.await.unwrap();
        assert_eq!(reply, WireMessage::over("r1"));
        assert_eq!(hub.pending(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_request_releases_slot_and_late_reply_is_ignored() {
        let hub = hub(Duration::from_millis(50));
        let (link, mut rx) = attach(&hub, "edge-1", &["weibo"]);

        let reply = hub
            .request(
                &link,
                WireMessage::Continue {
                    request_id: "slow".to_string(),
                    flags: Default::default(),
                },
            )
            .await;
        assert_eq!(reply, WireMessage::over("slow"));
        assert_eq!(hub.pending(), 0);
        assert_eq!(rx.recv().await.unwrap().kind(), "continue");

        assert!(!hub.dispatch(
            "edge-1",
            WireMessage::Articles {
                request_id: "slow".to_string(),
                articles: vec![],
            }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_wakes_waiters() {
        let hub = std::sync::Arc::new(hub(Duration::from_secs(5)));
        let (link, _rx) = attach(&hub, "edge-1", &["weibo"]);

        let waiter = {
            let hub = hub.clone();
            let link = link.clone();
            tokio::spawn(async move { hub.request(&link, WireMessage::over("r2")).await })
        };
        while hub.pending() == 0 {
            tokio::task::yield_now().await;
        }

        hub.unregister(&link);
        assert_eq!(waiter.await.unwrap(), WireMessage::over("r2"));
        assert!(hub.agents().is_empty());
    }

    #[tokio::test]
    async fn test_reply_from_another_agent_is_not_delivered() {
        let hub = std::sync::Arc::new(hub(Duration::from_secs(5)));
        let (link, mut rx) = attach(&hub, "edge-1", &["weibo"]);
        let (_other, _r2) = attach(&hub, "edge-2", &["weibo"]);

        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move {
                hub.request(
                    &link,
                    WireMessage::Continue {
                        request_id: "r3".to_string(),
                        flags: Default::default(),
                    },
                )
                .await
            })
        };
        assert_eq!(rx.recv().await.unwrap().kind(), "continue");

        let forged = WireMessage::Articles {
            request_id: "r3".to_string(),
            articles: vec![],
        };
        assert!(!hub.dispatch("edge-2", forged));
        assert_eq!(hub.pending(), 1);
        assert!(!waiter.is_finished());

        assert!(hub.dispatch("edge-1", WireMessage::over("r3")));
        assert_eq!(waiter.await.unwrap(), WireMessage::over("r3"));
        assert_eq!(hub.pending(), 0);
    }

    #[tokio::test]
    async fn test_second_request_with_same_id_is_refused() {
        let hub = std::sync::Arc::new(hub(Duration::from_secs(5)));
        let (link, mut rx) = attach(&hub, "edge-1", &["weibo"]);

        let first = {
            let hub = hub.clone();
            let link = link.clone();
            tokio::spawn(async move { hub.request(&link, WireMessage::over("same")).await })
        };
        assert_eq!(rx.recv().await.unwrap(), WireMessage::over("same"));
        assert!(hub.in_flight("same"));

        let second = hub.request(&link, WireMessage::over("same")).await;
        assert_eq!(second, WireMessage::over("same"));
        assert!(rx.try_recv().is_err());
        assert!(hub.in_flight("same"));

        let reply = WireMessage::Articles {
            request_id: "same".to_string(),
            articles: vec![],
        };
        assert!(hub.dispatch("edge-1", reply.clone()));
        assert_eq!(first.await.unwrap(), reply);
        assert!(!hub.in_flight("same"));
    }

    #[test]
    fn test_stale_channel_does_not_unregister_replacement() {
        let hub = hub(Duration::from_secs(1));
        let (old, _r1) = attach(&hub, "edge-1", &["weibo"]);
        let (new, _r2) = attach(&hub, "edge-1", &["weibo", "bili"]);
        assert_ne!(old.channel(), new.channel());

        hub.unregister(&old);
        assert_eq!(hub.agents().len(), 1);
        assert!(hub.serves("bili"));

        hub.unregister(&new);
        assert!(hub.agents().is_empty());
    }
}
