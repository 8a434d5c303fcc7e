use camino::Utf8PathBuf;
use srctrack_config::TrackingConfig;
use srctrack_core::{
    ComponentStatus, DefaultRegistry, MemoryTelemetry, RemoteFeedRecord, RemoteSyncInput,
    TrackingEvent,
};
use srctrack_persistence::StoreLayout;
use srctrack_remote::{InMemoryFeed, PollOutcome, RemoteServiceOptions, RemoteTrackingError, RemoteTrackingService};
use std::sync::Arc;
use std::time::Duration;

// --- Helpers ---

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    _dir: tempfile::TempDir,
    layout: StoreLayout,
    feed: Arc<InMemoryFeed>,
    telemetry: Arc<MemoryTelemetry>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        Self {
            _dir: dir,
            layout: StoreLayout::new(root, "00Dorg").unwrap(),
            feed: Arc::new(InMemoryFeed::new()),
            telemetry: Arc::new(MemoryTelemetry::new()),
        }
    }

    fn service_with(&self, config: TrackingConfig) -> RemoteTrackingService {
        RemoteTrackingService::new(
            &self.layout,
            self.feed.clone(),
            RemoteServiceOptions::default()
                .with_config(config)
                .with_telemetry(self.telemetry.clone()),
        )
    }

    fn service(&self) -> RemoteTrackingService {
        self.service_with(TrackingConfig::default())
    }
}

fn class(name: &str, rev: u64) -> RemoteFeedRecord {
    RemoteFeedRecord::new("ApexClass", name, rev)
}

fn keys(records: &[srctrack_core::RemoteRecord]) -> Vec<String> {
    records.iter().map(|r| r.key()).collect()
}

// --- Retrieve / reset ---

#[tokio::test]
async fn retrieve_updates_returns_unsynced_records() {
    let fx = Fixture::new();
    fx.feed.extend([class("A", 1), class("B", 2)]);
    let service = fx.service();

    let updates = service.retrieve_updates().await.unwrap();
    assert_eq!(keys(&updates), vec!["ApexClass###A", "ApexClass###B"]);
    assert_eq!(service.server_max_revision().await.unwrap(), 2);

    // Nothing new in the feed: the same outstanding records come back.
    let again = service.retrieve_updates().await.unwrap();
    assert_eq!(keys(&again), keys(&updates));
    assert!(fx.layout.tracking_file().exists());
}

#[tokio::test]
async fn reset_marks_everything_synced() {
    let fx = Fixture::new();
    fx.feed.extend([class("A", 1), class("B", 2), class("C", 3)]);
    let service = fx.service();

    let tracked = service.reset(None).await.unwrap();
    assert_eq!(tracked.len(), 3);
    for record in service.records().await.unwrap() {
        assert_eq!(record.last_retrieved_revision, Some(record.revision_counter));
    }
    assert!(service.retrieve_updates().await.unwrap().is_empty());
}

#[tokio::test]
async fn reset_to_revision_leaves_later_changes_outstanding() {
    let fx = Fixture::new();
    fx.feed.extend([class("A", 1), class("B", 2), class("C", 3)]);
    let service = fx.service();

    let tracked = service.reset(Some(2)).await.unwrap();
    assert_eq!(tracked, vec!["ApexClass###A", "ApexClass###B"]);
    assert_eq!(service.server_max_revision().await.unwrap(), 2);

    let updates = service.retrieve_updates().await.unwrap();
    assert_eq!(keys(&updates), vec!["ApexClass###C"]);
}

#[tokio::test]
async fn newer_revision_reopens_a_synced_record() {
    let fx = Fixture::new();
    fx.feed.push(class("A", 1));
    let service = fx.service();
    service.reset(None).await.unwrap();

    fx.feed.push(class("A", 4));
    let updates = service.retrieve_updates().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].revision_counter, 4);
    assert_eq!(updates[0].last_retrieved_revision, Some(1));
}

#[tokio::test]
async fn malformed_feed_rows_are_errors() {
    let fx = Fixture::new();
    fx.feed.push(RemoteFeedRecord::new("", "", 7));
    let err = fx.service().retrieve_updates().await.unwrap_err();
    assert!(matches!(err, RemoteTrackingError::MalformedRecord { revision: 7 }));
}

// --- Persistence ---

#[tokio::test]
async fn legacy_file_round_trips_and_reports_upgrade_once() {
    let fx = Fixture::new();
    fx.feed.extend([class("A", 1), RemoteFeedRecord::new("Layout", "Account%20Layout", 2)]);
    fx.service().reset(None).await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(fx.layout.tracking_file()).unwrap()).unwrap();
    assert_eq!(raw["fileVersion"], 0);
    assert!(raw["sourceMembers"].get("ApexClass__A").is_some());

    let reopened = fx.service();
    assert_eq!(reopened.server_max_revision().await.unwrap(), 2);
    let layout = reopened.record("Layout###Account Layout").await.unwrap().unwrap();
    assert!(layout.is_synced());
    reopened.records().await.unwrap();

    let upgrades = fx
        .telemetry
        .events()
        .into_iter()
        .filter(|e| matches!(e, TrackingEvent::TrackingFileUpgraded { from: 0, to: 1 }))
        .count();
    assert_eq!(upgrades, 1);
}

#[tokio::test]
async fn current_schema_is_written_when_configured() {
    let fx = Fixture::new();
    fx.feed.push(class("A", 1));
    let config = TrackingConfig {
        file_version: 1,
        ..TrackingConfig::default()
    };
    fx.service_with(config.clone()).retrieve_updates().await.unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(fx.layout.tracking_file()).unwrap()).unwrap();
    assert_eq!(raw["fileVersion"], 1);
    assert_eq!(raw["sourceMembers"]["ApexClass###A"]["RevisionCounter"], 1);

    let reopened = fx.service_with(config);
    assert_eq!(keys(&reopened.retrieve_updates().await.unwrap()), vec!["ApexClass###A"]);
    assert!(fx.telemetry.events().is_empty());
}

#[tokio::test]
async fn clear_removes_the_tracking_file() {
    let fx = Fixture::new();
    fx.feed.push(class("A", 1));
    let service = fx.service();
    service.retrieve_updates().await.unwrap();
    assert!(fx.layout.tracking_file().exists());

    service.clear().await.unwrap();
    assert!(!fx.layout.tracking_file().exists());
    assert!(service.records().await.unwrap().is_empty());
    assert_eq!(service.server_max_revision().await.unwrap(), 0);
}

// --- Sync ---

#[tokio::test]
async fn sync_marks_matching_records() {
    let fx = Fixture::new();
    fx.feed.extend([
        class("Foo", 1),
        RemoteFeedRecord::new("LightningComponentBundle", "card", 2),
        RemoteFeedRecord::new("LightningComponentBundle", "card/card.js", 3),
        class("Other", 4),
    ]);
    let service = fx.service();
    service.retrieve_updates().await.unwrap();

    let synced = service
        .sync_specified_elements(&[
            RemoteSyncInput::new("ApexClass", "Foo", ComponentStatus::Changed),
            RemoteSyncInput::new("LightningComponentBundle", "card", ComponentStatus::Changed)
                .at("force-app/lwc/card/card.js"),
            RemoteSyncInput::new("ApexClass", "NotTracked", ComponentStatus::Created),
        ])
        .await
        .unwrap();
    assert_eq!(synced.len(), 3);

    let outstanding = service.retrieve_updates().await.unwrap();
    assert_eq!(keys(&outstanding), vec!["ApexClass###Other"]);
}

#[tokio::test]
async fn failed_elements_are_not_synced() {
    let fx = Fixture::new();
    fx.feed.push(class("Foo", 1));
    let service = fx.service();
    service.retrieve_updates().await.unwrap();

    let synced = service
        .sync_specified_elements(&[RemoteSyncInput::new("ApexClass", "Foo", ComponentStatus::Failed)])
        .await
        .unwrap();
    assert!(synced.is_empty());
    assert_eq!(service.retrieve_updates().await.unwrap().len(), 1);
}

// --- Query cache ---

#[tokio::test]
async fn cached_retrieval_reuses_queries_until_cleared() {
    let fx = Fixture::new();
    let service = fx.service();

    assert!(service.retrieve_updates_cached().await.unwrap().is_empty());
    assert!(service.retrieve_updates_cached().await.unwrap().is_empty());
    assert_eq!(fx.feed.query_count(), 1);

    fx.feed.push(class("A", 1));
    assert!(service.retrieve_updates_cached().await.unwrap().is_empty());

    service.clear_query_cache();
    assert_eq!(service.retrieve_updates_cached().await.unwrap().len(), 1);
    assert_eq!(fx.feed.query_count(), 2);
}

// --- Polling ---

#[tokio::test(start_paused = true)]
async fn poll_times_out_with_one_warning() {
    init_tracing();
    let fx = Fixture::new();
    let service = fx.service();
    let expected = vec![
        RemoteSyncInput::new("ApexClass", "A", ComponentStatus::Created),
        RemoteSyncInput::new("ApexClass", "B", ComponentStatus::Created),
        RemoteSyncInput::new("ApexClass", "C", ComponentStatus::Changed),
    ];

    let outcome = service
        .poll_for_convergence(&expected, &DefaultRegistry::default())
        .await
        .unwrap();

    let PollOutcome::TimedOut { missing, elapsed } = outcome else {
        panic!("expected a timeout, got {outcome:?}");
    };
    assert_eq!(missing, vec!["ApexClass###A", "ApexClass###B", "ApexClass###C"]);
    assert!(elapsed >= Duration::from_secs(6));
    assert!(elapsed < Duration::from_secs(8));

    let events = fx.telemetry.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], TrackingEvent::PollingTimeout { missing, .. } if missing.len() == 3));
}

#[tokio::test(start_paused = true)]
async fn poll_converges_and_marks_observed_records() {
    let fx = Fixture::new();
    fx.feed.extend([class("A", 1), class("Unrelated", 2)]);
    let service = fx.service();

    let outcome = service
        .poll_for_convergence(
            &[RemoteSyncInput::new("ApexClass", "A", ComponentStatus::Created)],
            &DefaultRegistry::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Converged { observed: 1, polls: 1 });

    let a = service.record("ApexClass###A").await.unwrap().unwrap();
    let other = service.record("ApexClass###Unrelated").await.unwrap().unwrap();
    assert!(a.is_synced());
    assert!(!other.is_synced());
    assert!(fx.telemetry.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_ignores_records_retrieved_before_the_deploy() {
    let fx = Fixture::new();
    // Someone else changed Foo before our deploy, and a status call pulled it in.
    fx.feed.push(class("Foo", 5));
    let config = TrackingConfig {
        poll_timeout: Some(Duration::from_secs(2)),
        ..TrackingConfig::default()
    };
    let service = fx.service_with(config);
    assert_eq!(keys(&service.retrieve_updates().await.unwrap()), vec!["ApexClass###Foo"]);

    let deployed = [RemoteSyncInput::new("ApexClass", "Foo", ComponentStatus::Changed)];
    let outcome = service
        .poll_for_convergence(&deployed, &DefaultRegistry::default())
        .await
        .unwrap();
    assert_eq!(outcome.missing(), ["ApexClass###Foo".to_string()]);
    assert!(!service.record("ApexClass###Foo").await.unwrap().unwrap().is_synced());

    // The deploy's own revision lands.
    fx.feed.push(class("Foo", 10));
    let outcome = service
        .poll_for_convergence(&deployed, &DefaultRegistry::default())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Converged { observed: 1, polls: 1 });
    service.sync_specified_elements(&deployed).await.unwrap();

    let foo = service.record("ApexClass###Foo").await.unwrap().unwrap();
    assert_eq!(foo.revision_counter, 10);
    assert!(foo.is_synced());
    assert!(service.retrieve_updates().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_stops_after_consecutive_empty_polls() {
    let fx = Fixture::new();
    fx.feed.push(class("Unrelated", 1));
    let config = TrackingConfig {
        poll_empty_limit: 2,
        poll_timeout: Some(Duration::from_secs(600)),
        ..TrackingConfig::default()
    };
    let service = fx.service_with(config);

    let outcome = service
        .poll_for_convergence(
            &[RemoteSyncInput::new("ApexClass", "Never", ComponentStatus::Created)],
            &DefaultRegistry::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PollOutcome::EmptyLimit {
            missing: vec!["ApexClass###Never".into()],
            polls: 3
        }
    );
    assert!(matches!(
        fx.telemetry.events().as_slice(),
        [TrackingEvent::PollingEmptyLimit { polls: 3, .. }]
    ));
}

#[tokio::test]
async fn poll_skips_when_disabled_or_nothing_expected() {
    let fx = Fixture::new();
    let disabled = fx.service_with(TrackingConfig {
        remote_polling: false,
        ..TrackingConfig::default()
    });
    let expected = [RemoteSyncInput::new("ApexClass", "A", ComponentStatus::Created)];
    assert_eq!(
        disabled
            .poll_for_convergence(&expected, &DefaultRegistry::default())
            .await
            .unwrap(),
        PollOutcome::Skipped
    );

    // Types the feed never reports are dropped before polling starts.
    let quirky = [RemoteSyncInput::new("CustomObject", "Account", ComponentStatus::Changed)];
    let outcome = fx
        .service()
        .poll_for_convergence(&quirky, &DefaultRegistry::default())
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Converged { observed: 0, polls: 0 });
    assert_eq!(fx.feed.query_count(), 0);
}
