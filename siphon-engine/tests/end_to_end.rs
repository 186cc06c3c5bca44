//! Full runs through registry, tracker, sync protocol, coordinator and sweeper

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Value, json};
use siphon_core::domain::article::{ArticleRecord, SortValue};
use siphon_core::domain::connector::ConnectorDescriptor;
use siphon_core::domain::locate::{LocateInfo, SequencePreference};
use siphon_core::domain::source::SourceMeta;
use siphon_core::dto::run::{SweepGroup, SweepOutcome};
use siphon_core::{CrawlError, Result, RunIdentity};
use siphon_engine::{
    AlertSink, Connector, ConnectorInstance, ConnectorResolver, Coordinator, CoordinatorConfig,
    CrawlContext, MemorySink, RecordStream, Registry, RunPhase, RunTracker, Sweeper, open_run,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Stats {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    /// `user` param and start time of every successful create
    starts: Mutex<Vec<(String, Instant)>>,
}

impl Stats {
    fn started(&self, user: &str) -> Instant {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == user)
            .map(|(_, at)| *at)
            .unwrap()
    }
}

/// Connector over a shared, mutable list of integer keys (newest first)
struct KeysConnector {
    descriptor: ConnectorDescriptor,
    keys: Arc<Mutex<Vec<i64>>>,
    stats: Arc<Stats>,
}

impl KeysConnector {
    fn new(id: &str, keys: Arc<Mutex<Vec<i64>>>, stats: Arc<Stats>) -> Self {
        Self {
            descriptor: ConnectorDescriptor::new(id).variety(),
            keys,
            stats,
        }
    }

    fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.descriptor = self.descriptor.with_max_wait(max_wait);
        self
    }
}

#[async_trait]
impl Connector for KeysConnector {
    fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    async fn create(
        &self,
        _ctx: &CrawlContext,
        params: &Value,
    ) -> Result<Box<dyn ConnectorInstance>> {
        if params.get("fail").is_some() {
            return Err(CrawlError::RequestFailed("upstream unavailable".into()));
        }
        if params.get("invalid").is_some() {
            return Err(CrawlError::InvalidParameters("bad user".into()));
        }
        if params.get("hang").is_some() {
            futures::future::pending::<()>().await;
        }

        self.stats.created.fetch_add(1, Ordering::SeqCst);
        if let Some(user) = params.get("user").and_then(Value::as_str) {
            self.stats
                .starts
                .lock()
                .unwrap()
                .push((user.to_string(), Instant::now()));
        }
        Ok(Box::new(KeysInstance {
            keys: self.keys.lock().unwrap().clone(),
            slow: params.get("slow").and_then(Value::as_bool).unwrap_or(false),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct KeysInstance {
    keys: Vec<i64>,
    slow: bool,
    stats: Arc<Stats>,
}

#[async_trait]
impl ConnectorInstance for KeysInstance {
    fn describe(&self) -> SourceMeta {
        SourceMeta::new("Keys", "https://keys.example", "sort_key")
    }

    fn new_to_old(&self) -> RecordStream<'_> {
        let slow = self.slow;
        stream::iter(self.keys.clone())
            .then(move |k| async move {
                if slow {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, CrawlError>(ArticleRecord::new(
                    format!("#{}", k),
                    "",
                    format!("/{}", k),
                    k,
                ))
            })
            .boxed()
    }

    async fn destroy(&self) {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    coordinator: Arc<Coordinator>,
    sink: Arc<MemorySink>,
    keys: Arc<Mutex<Vec<i64>>>,
    stats: Arc<Stats>,
}

fn harness(cool_down: Duration, initial: &[i64]) -> Harness {
    let keys = Arc::new(Mutex::new(initial.to_vec()));
    let stats = Arc::new(Stats::default());

    let mut builder = Registry::builder();
    builder
        .register(KeysConnector::new("alpha", Arc::clone(&keys), Arc::clone(&stats)))
        .unwrap()
        .register(
            KeysConnector::new("slowpoke", Arc::clone(&keys), Arc::clone(&stats))
                .with_max_wait(Duration::from_millis(100)),
        )
        .unwrap()
        .register(
            KeysConnector::new("stuck", Arc::clone(&keys), Arc::clone(&stats))
                .with_max_wait(Duration::from_millis(50)),
        )
        .unwrap();
    let registry = Arc::new(builder.build());

    let ctx = Arc::new(CrawlContext::new(
        Arc::clone(&registry),
        Arc::new(RunTracker::new(cool_down)),
    ));
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::new(ctx, registry, sink.clone()).with_config(CoordinatorConfig {
        bootstrap_amount: 2,
        artifact_size: 10,
    });

    Harness {
        coordinator: Arc::new(coordinator),
        sink,
        keys,
        stats,
    }
}

fn ints(records: &[ArticleRecord]) -> Vec<i64> {
    records
        .iter()
        .map(|r| match r.sort_key {
            SortValue::Int(k) => k,
            ref other => panic!("unexpected key {:?}", other),
        })
        .collect()
}

#[tokio::test]
async fn test_resume_order_follows_preference() {
    let h = harness(Duration::ZERO, &[5, 4, 3]);
    let ctx = h.coordinator.context();
    let run = open_run(ctx, ctx.registry.as_ref(), "alpha", &Value::Null)
        .await
        .unwrap();
    let flags = LocateInfo::resume(3, None);

    let new2old: Vec<ArticleRecord> = run
        .fetch(&flags, SequencePreference::PreferNew2Old)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ints(&new2old), vec![5, 4]);

    let old2new: Vec<ArticleRecord> = run
        .fetch(&flags, SequencePreference::PreferOld2New)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ints(&old2new), vec![4, 5]);

    run.close().await;
    assert_eq!(h.stats.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bootstrap_then_resume() {
    let h = harness(Duration::ZERO, &[5, 4, 3, 2, 1]);

    let first = h.coordinator.run("alpha", &json!({"user": "1"})).await.unwrap();
    assert_eq!(first.new_records, 2);
    assert!(first.artifact_rebuilt);
    assert!(!first.timed_out);
    assert!(h.coordinator.artifact(&first.source_id).await.is_some());
    assert_eq!(
        h.sink.meta(&first.source_id).map(|m| m.name),
        Some("Keys".to_string())
    );

    {
        let mut keys = h.keys.lock().unwrap();
        keys.insert(0, 6);
        keys.insert(0, 7);
    }
    let second = h.coordinator.run("alpha", &json!({"user": "1"})).await.unwrap();
    assert_eq!(second.source_id, first.source_id);
    assert_eq!(second.new_records, 2);

    // Resumed records are persisted oldest first.
    assert_eq!(ints(&h.sink.records(&first.source_id)), vec![5, 4, 6, 7]);

    let third = h.coordinator.run("alpha", &json!({"user": "1"})).await.unwrap();
    assert_eq!(third.new_records, 0);
    assert!(!third.artifact_rebuilt);
    assert_eq!(h.stats.destroyed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_source_id_is_the_identity_key() {
    let h = harness(Duration::ZERO, &[1]);
    let params = json!({"user": "1", "tags": []});
    let report = h.coordinator.run("alpha", &params).await.unwrap();
    assert_eq!(report.source_id, RunIdentity::new("alpha", &params).key());
}

#[tokio::test]
async fn test_refractory_rejects_then_admits() {
    let h = harness(Duration::from_millis(100), &[1]);
    let params = json!({"user": "1"});

    h.coordinator.run("alpha", &params).await.unwrap();
    let again = h.coordinator.run("alpha", &params).await;
    assert!(matches!(again, Err(CrawlError::DuplicateRun(_))));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.coordinator.run("alpha", &params).await.is_ok());
}

#[tokio::test]
async fn test_concurrent_runs_of_one_identity() {
    let h = harness(Duration::from_secs(60), &[3, 2, 1]);
    let params = json!({"slow": true});

    let (a, b) = tokio::join!(
        h.coordinator.run("alpha", &params),
        h.coordinator.run("alpha", &params)
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(CrawlError::DuplicateRun(_))))
            .count(),
        1
    );
    assert_eq!(h.stats.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_reports_and_releases() {
    let h = harness(Duration::from_secs(60), &[3, 2, 1]);
    let params = json!({"slow": true});

    let report = h.coordinator.run("slowpoke", &params).await.unwrap();
    assert!(report.timed_out);
    assert_eq!(report.new_records, 0);
    assert_eq!(h.stats.destroyed.load(Ordering::SeqCst), 1);

    let identity = RunIdentity::new("slowpoke", &params);
    assert_eq!(
        h.coordinator.context().tracker.phase(&identity),
        Some(RunPhase::Refractory)
    );
}

#[tokio::test]
async fn test_unknown_connector_is_not_found() {
    let h = harness(Duration::ZERO, &[1]);
    let err = h.coordinator.run("missing", &Value::Null).await.unwrap_err();
    assert_eq!(err, CrawlError::NotFound("missing".into()));
    assert!(h.coordinator.resolver().resolve("missing").is_none());
}

#[derive(Default)]
struct RecordingAlerts(Mutex<Vec<(String, u16)>>);

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, connector_id: &str, error: &CrawlError) {
        self.0
            .lock()
            .unwrap()
            .push((connector_id.to_string(), error.code()));
    }
}

#[tokio::test]
async fn test_sweep_counts_and_alerts() {
    let h = harness(Duration::from_secs(60), &[2, 1]);
    h.coordinator.run("alpha", &json!({"user": "0"})).await.unwrap();

    let alerts = Arc::new(RecordingAlerts::default());
    let sweeper = Sweeper::new(Arc::clone(&h.coordinator), Duration::from_millis(5))
        .with_alerts(alerts.clone());

    let groups = vec![SweepGroup {
        connector_id: "alpha".into(),
        params: vec![
            json!({"user": "0"}),
            json!({"user": "1"}),
            json!({"fail": true}),
            json!({"user": "2"}),
        ],
    }];

    let outcome = sweeper.sweep(&groups).await.unwrap();
    let SweepOutcome::Completed(report) = outcome else {
        panic!("sweep should have run");
    };
    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.new_records, 4);
    assert_eq!(*alerts.0.lock().unwrap(), vec![("alpha".to_string(), 502)]);
}

#[tokio::test]
async fn test_fatal_error_stops_only_its_group() {
    let h = harness(Duration::ZERO, &[1]);
    let sweeper = Sweeper::new(Arc::clone(&h.coordinator), Duration::ZERO);

    let groups = vec![
        SweepGroup {
            connector_id: "alpha".into(),
            params: vec![json!({"invalid": true}), json!({"user": "skipped"})],
        },
        SweepGroup {
            connector_id: "slowpoke".into(),
            params: vec![json!({"user": "a"}), json!({"user": "b"})],
        },
    ];

    let err = sweeper.sweep(&groups).await.unwrap_err();
    assert!(matches!(err, CrawlError::InvalidParameters(_)));

    // The failing group stopped, the other ran to completion.
    let skipped = RunIdentity::new("alpha", &json!({"user": "skipped"})).key();
    assert!(h.sink.records(&skipped).is_empty());
    for user in ["a", "b"] {
        let source = RunIdentity::new("slowpoke", &json!({"user": user})).key();
        assert_eq!(h.sink.records(&source).len(), 1);
    }
    assert!(!sweeper.is_running());
}

#[tokio::test]
async fn test_concurrent_sweep_is_a_no_op() {
    let h = harness(Duration::ZERO, &[2, 1]);
    let sweeper = Arc::new(Sweeper::new(Arc::clone(&h.coordinator), Duration::ZERO));
    let groups = vec![SweepGroup {
        connector_id: "alpha".into(),
        params: vec![json!({"slow": true})],
    }];

    let first = {
        let sweeper = Arc::clone(&sweeper);
        let groups = groups.clone();
        tokio::spawn(async move { sweeper.sweep(&groups).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sweeper.is_running());

    let second = sweeper.sweep(&groups).await.unwrap();
    assert_eq!(second, SweepOutcome::AlreadyRunning);

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SweepOutcome::Completed(_)));
    assert!(!sweeper.is_running());
}

#[tokio::test]
async fn test_hanging_create_is_bounded_by_the_fetch_budget() {
    let h = harness(Duration::from_secs(60), &[1]);
    let params = json!({"hang": true, "user": "1"});

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        h.coordinator.run("stuck", &params),
    )
    .await
    .expect("run should give up at its fetch budget");
    assert_eq!(result, Err(CrawlError::Timeout(Duration::from_millis(50))));

    let identity = RunIdentity::new("stuck", &params);
    assert_eq!(
        h.coordinator.context().tracker.phase(&identity),
        Some(RunPhase::Refractory)
    );
}

#[tokio::test]
async fn test_hanging_create_does_not_wedge_sweeps() {
    let h = harness(Duration::from_secs(60), &[1]);
    let sweeper = Sweeper::new(Arc::clone(&h.coordinator), Duration::ZERO);
    let groups = vec![SweepGroup {
        connector_id: "stuck".into(),
        params: vec![
            json!({"hang": true, "user": "1"}),
            json!({"hang": true, "user": "2"}),
        ],
    }];

    let outcome = tokio::time::timeout(Duration::from_secs(2), sweeper.sweep(&groups))
        .await
        .expect("sweep should finish")
        .unwrap();
    let SweepOutcome::Completed(report) = outcome else {
        panic!("sweep should have run");
    };
    assert_eq!(report.timed_out, 2);
    assert!(!sweeper.is_running());

    // The next sweep runs instead of seeing one still in progress.
    let next = sweeper.sweep(&groups).await.unwrap();
    assert!(matches!(next, SweepOutcome::Completed(_)));
}

#[tokio::test]
async fn test_group_members_are_spaced_and_groups_overlap() {
    let h = harness(Duration::ZERO, &[1]);
    let politeness = Duration::from_millis(100);
    let sweeper = Sweeper::new(Arc::clone(&h.coordinator), politeness);
    let groups = vec![
        SweepGroup {
            connector_id: "alpha".into(),
            params: vec![json!({"user": "a1"}), json!({"user": "a2"})],
        },
        SweepGroup {
            connector_id: "slowpoke".into(),
            params: vec![json!({"user": "s1"}), json!({"user": "s2"})],
        },
    ];

    let outcome = sweeper.sweep(&groups).await.unwrap();
    let SweepOutcome::Completed(report) = outcome else {
        panic!("sweep should have run");
    };
    assert_eq!(report.succeeded, 4);

    let (a1, a2) = (h.stats.started("a1"), h.stats.started("a2"));
    let (s1, s2) = (h.stats.started("s1"), h.stats.started("s2"));

    // Members of a group run one after another, a politeness delay apart.
    assert!(a2.duration_since(a1) >= politeness);
    assert!(s2.duration_since(s1) >= politeness);

    // Groups run side by side.
    assert!(s1 < a2);
    assert!(a1 < s2);
}
