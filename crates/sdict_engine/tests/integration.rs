//! Integration tests against in-process fake servers.

use parking_lot::Mutex;
use sdict_engine::{
    DictConfig, DictError, DictWorker, DownloadFailure, FetchOutcome, KanbanConfig, RetryConfig,
    SessionState, SimpleDict, SimpleKanban, SnapshotCache, UpdateChecker, UpdateHandler,
};
use sdict_io::Transport;
use sdict_protocol::{Record, RecordCodec, SimpleProtobuf};
use sdict_testkit::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn quick_retry() -> RetryConfig {
    RetryConfig::constant(3, Duration::from_millis(10))
}

fn dict(server: &FakeDictServer, cache: Option<&TestCacheDir>, set_password: Option<&str>) -> SimpleDict {
    let mut config = DictConfig::new(READ_PASSWORD).with_fetch_retry(quick_retry());
    if let Some(password) = set_password {
        config = config.with_set_password(password);
    }
    if let Some(cache) = cache {
        config = config.with_cache_dir(cache.path());
    }
    SimpleDict::new(Transport::new(server.transport_config()), config)
}

fn kanban(server: &FakeKanbanServer) -> SimpleKanban {
    SimpleKanban::new(
        Transport::new(server.transport_config()),
        KanbanConfig::new(READ_PASSWORD).with_retry(quick_retry()),
    )
}

fn assert_idle(dict: &SimpleDict) {
    assert_eq!(dict.state(), SessionState::Idle);
    assert_eq!(dict.sequence(), 0);
}

#[test]
fn fetch_downloads_dictionary() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    let mut dict = dict(&server, None, None);

    let outcome = dict.fetch(false).unwrap();
    assert_eq!(outcome, FetchOutcome::Downloaded { entries: 4 });
    assert_eq!(dict.get("apple"), Some("a red fruit"));
    assert_eq!(dict.get("日本"), Some("Japan"));
    assert_eq!(dict.latest_keys(), ["apple", "Banana", "carrot", "日本"]);
    assert_idle(&dict);

    let state = server.state();
    assert_eq!(state.cat_requests, 1);
    assert_eq!(state.md5_requests, 0);
}

#[test]
fn unchanged_dictionary_reuses_cache() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    let cache = TestCacheDir::new();
    let mut dict = dict(&server, Some(&cache), None);

    assert!(!dict.fetch(false).unwrap().is_cached());
    assert!(cache.file("dsp").exists());
    assert!(cache.file("md5").exists());

    let outcome = dict.fetch(false).unwrap();
    assert_eq!(outcome, FetchOutcome::Cached { entries: 4 });
    assert_eq!(dict.get("carrot"), Some("an orange vegetable"));
    assert_idle(&dict);

    let state = server.state();
    assert_eq!(state.cat_requests, 1);
    assert_eq!(state.md5_requests, 1);
}

#[test]
fn changed_dictionary_downloads_again() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    let cache = TestCacheDir::new();
    let mut dict = dict(&server, Some(&cache), None);

    dict.fetch(false).unwrap();
    server.state().records.push(Record::new("durian", "smelly"));

    let outcome = dict.fetch(false).unwrap();
    assert_eq!(outcome, FetchOutcome::Downloaded { entries: 5 });
    assert_eq!(dict.get("durian"), Some("smelly"));

    let state = server.state();
    assert_eq!(state.cat_requests, 2);
    assert_eq!(state.md5_requests, 1);
}

#[test]
fn forced_fetch_skips_digest_check() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    let cache = TestCacheDir::new();
    let mut dict = dict(&server, Some(&cache), None);

    dict.fetch(true).unwrap();
    dict.fetch(true).unwrap();

    let state = server.state();
    assert_eq!(state.cat_requests, 2);
    assert_eq!(state.md5_requests, 0);
}

#[test]
fn cached_duplicates_are_purged() {
    let records = vec![
        Record::new("a", "first"),
        Record::new("b", "2"),
        Record::new("a", "second"),
    ];
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), records.clone());
    let cache = TestCacheDir::new();
    SnapshotCache::new(Some(cache.path().to_path_buf()))
        .store(&SimpleProtobuf.encode(&records).unwrap())
        .unwrap();

    let mut dict = dict(&server, Some(&cache), Some(WRITE_PASSWORD));
    let outcome = dict.fetch(false).unwrap();

    assert!(outcome.is_cached());
    assert_eq!(dict.get("a"), Some("first"));
    assert_eq!(dict.latest_keys(), ["a", "b"]);
    assert_idle(&dict);

    let state = server.state();
    assert_eq!(state.deleted_keys, vec![b"a".to_vec()]);
    assert_eq!(state.records.len(), 2);
}

#[test]
fn downloaded_corrupt_keys_are_purged() {
    let records = vec![Record::new(vec![0xff, 0xfe], "bad"), Record::new("ok", "fine")];
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), records);
    let mut dict = dict(&server, None, Some(WRITE_PASSWORD));

    let outcome = dict.fetch(false).unwrap();
    assert_eq!(outcome, FetchOutcome::Downloaded { entries: 1 });
    assert_eq!(dict.latest_keys(), ["ok"]);
    assert_idle(&dict);

    let state = server.state();
    assert_eq!(state.deleted_keys, vec![vec![0xffu8, 0xfe]]);
    assert_eq!(state.records.len(), 1);
}

#[test]
fn set_then_get() {
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), sample_records());
    let mut dict = dict(&server, None, Some(WRITE_PASSWORD));
    dict.fetch(false).unwrap();

    dict.set("eggplant", "a purple vegetable").unwrap();
    assert_eq!(dict.get("eggplant"), Some("a purple vegetable"));
    assert_eq!(
        server.state().value("eggplant").as_deref(),
        Some("a purple vegetable")
    );
    assert!(!dict.latest_keys().iter().any(|k| k == "eggplant"));
    assert_eq!(dict.search("purple"), vec!["eggplant"]);
    assert_idle(&dict);
}

#[test]
fn set_existing_key_replaces_remote_record() {
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), sample_records());
    let mut dict = dict(&server, None, Some(WRITE_PASSWORD));
    dict.fetch(false).unwrap();

    dict.set("apple", "a green fruit").unwrap();
    assert_eq!(dict.get("apple"), Some("a green fruit"));

    let state = server.state();
    assert_eq!(state.deleted_keys, vec![b"apple".to_vec()]);
    assert_eq!(
        state.records.iter().filter(|r| r.key == b"apple").count(),
        1
    );
    assert_eq!(state.value("apple").as_deref(), Some("a green fruit"));
}

#[test]
fn del_removes_key_once() {
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), sample_records());
    let mut dict = dict(&server, None, Some(WRITE_PASSWORD));
    dict.fetch(false).unwrap();

    dict.del("Banana").unwrap();
    assert_eq!(dict.get("Banana"), None);
    assert_eq!(dict.latest_keys(), ["apple", "carrot", "日本"]);
    assert_eq!(server.state().value("Banana"), None);

    let err = dict.del("Banana").unwrap_err();
    assert!(matches!(
        err,
        DictError::UnexpectedAck { expected: "succ", actual: Some(ref ack) } if ack == "null"
    ));
    assert_idle(&dict);
}

#[test]
fn wrong_write_password_changes_nothing() {
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), sample_records());
    let mut dict = dict(&server, None, Some("not-the-password"));
    dict.fetch(false).unwrap();

    assert!(matches!(
        dict.del("apple"),
        Err(DictError::UnexpectedAck { expected: "succ", .. })
    ));
    assert!(matches!(
        dict.set("new", "value"),
        Err(DictError::UnexpectedAck { expected: "data", .. })
    ));

    assert_eq!(dict.get("apple"), Some("a red fruit"));
    assert_eq!(dict.get("new"), None);
    assert_eq!(server.state().records, sample_records());
}

#[test]
fn fetch_retries_dropped_connections() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    server.refuse_next(2);
    let mut dict = dict(&server, None, None);

    assert_eq!(dict.fetch(true).unwrap().entries(), 4);
    assert_eq!(server.state().connections, 3);
    assert_idle(&dict);
}

#[test]
fn fetch_gives_up_after_retries() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    server.refuse_next(10);
    let mut dict = dict(&server, None, None);

    let err = dict.fetch(true).unwrap_err();
    assert!(matches!(err, DictError::FetchFailed { attempts: 3 }));
    assert!(dict.is_empty());
    assert_idle(&dict);
}

#[test]
fn undecryptable_blob_is_not_retried() {
    let server = FakeDictServer::start(READ_PASSWORD, None, sample_records());
    server.corrupt_next_cat();
    let mut dict = dict(&server, None, None);

    assert!(matches!(dict.fetch(true), Err(DictError::Decrypt)));
    assert_eq!(server.state().cat_requests, 1);
    assert!(dict.is_empty());

    assert_eq!(dict.fetch(true).unwrap().entries(), 4);
}

#[test]
fn kanban_fetch_reports_progress() {
    let blob: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let server = FakeKanbanServer::start(READ_PASSWORD, blob.clone(), HashMap::new());
    let mut kanban = kanban(&server);

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reported);
    kanban.set_progress(move |pct: u32| sink.lock().push(pct));

    assert_eq!(kanban.fetch().unwrap(), blob);

    let reported = reported.lock();
    assert_eq!(reported.last(), Some(&100));
    assert!(reported.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(server.state().requests, vec![format!("{READ_PASSWORD}catquit")]);
}

#[test]
fn kanban_empty_blob_is_not_retried() {
    let server = FakeKanbanServer::start(READ_PASSWORD, Vec::new(), HashMap::new());
    let mut kanban = kanban(&server);

    assert!(matches!(kanban.fetch(), Err(DictError::EmptyPayload)));
    assert_eq!(server.state().requests.len(), 1);
}

#[test]
fn kanban_fetch_retries_dropped_connection() {
    let server = FakeKanbanServer::start(READ_PASSWORD, b"payload".to_vec(), HashMap::new());
    server.refuse_next(1);
    let mut kanban = kanban(&server);

    assert_eq!(kanban.fetch().unwrap(), b"payload");
    assert_eq!(server.state().requests.len(), 2);
}

#[test]
fn kanban_default_policy_survives_three_dropped_connections() {
    let server = FakeKanbanServer::start(READ_PASSWORD, b"payload".to_vec(), HashMap::new());
    server.refuse_next(3);
    let mut kanban = SimpleKanban::new(
        Transport::new(server.transport_config()),
        KanbanConfig::new(READ_PASSWORD),
    );

    assert_eq!(kanban.fetch().unwrap(), b"payload");
    assert_eq!(server.state().requests.len(), 4);
}

#[test]
fn kanban_get_versions() {
    let versions = HashMap::from([(3, String::from("4\nnew stuff"))]);
    let server = FakeKanbanServer::start(READ_PASSWORD, Vec::new(), versions);
    let mut kanban = kanban(&server);

    assert_eq!(kanban.get(3).as_deref(), Some("4\nnew stuff"));
    assert_eq!(kanban.get(4), None);
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<String>,
    downloaded: Option<Vec<u8>>,
}

impl UpdateHandler for Recorder {
    fn on_new_version(&mut self, version: u32, message: &str, md5: Option<&str>) {
        self.events.push(format!("new {version} {message:?} {md5:?}"));
    }

    fn on_latest_version(&mut self, version: u32) {
        self.events.push(format!("latest {version}"));
    }

    fn on_download_failed(&mut self, cause: DownloadFailure) {
        self.events.push(format!("failed {cause:?}"));
    }

    fn on_download_success(&mut self, data: &[u8]) {
        self.events.push(String::from("success"));
        self.downloaded = Some(data.to_vec());
    }
}

#[test]
fn update_check_and_verified_download() {
    let package = b"package contents".to_vec();
    let md5 = hex::encode(sdict_engine::digest(&package)).to_uppercase();
    let versions = HashMap::from([
        (1, format!("2\nfaster\nsmaller\nmd5:{md5}")),
        (2, String::from("3\nnotice only")),
    ]);
    let server = FakeKanbanServer::start(READ_PASSWORD, package.clone(), versions);
    let mut checker = UpdateChecker::new(kanban(&server), Recorder::default());

    checker.check(1);
    checker.check(2);
    checker.check(3);
    checker.download(&md5, |_: u32| {});
    checker.download("00000000000000000000000000000000", |_: u32| {});

    let recorder = checker.into_handler();
    assert_eq!(
        recorder.events,
        vec![
            format!("new 2 \"faster\\nsmaller\" Some({md5:?})"),
            String::from("new 3 \"notice only\" None"),
            String::from("latest 3"),
            String::from("success"),
            String::from("failed Corrupt"),
        ]
    );
    assert_eq!(recorder.downloaded, Some(package));
}

#[test]
fn update_download_network_failure() {
    let server = FakeKanbanServer::start(READ_PASSWORD, b"data".to_vec(), HashMap::new());
    server.refuse_next(10);
    let mut checker = UpdateChecker::new(kanban(&server), Recorder::default());

    checker.download("whatever", |_: u32| {});
    assert_eq!(checker.handler().events, vec!["failed Network"]);
}

#[tokio::test]
async fn worker_serializes_operations() {
    let server = FakeDictServer::start(READ_PASSWORD, Some(WRITE_PASSWORD), sample_records());
    let worker = DictWorker::spawn(dict(&server, None, Some(WRITE_PASSWORD))).unwrap();
    let handle = worker.handle();

    assert_eq!(handle.fetch(false).await.unwrap().entries(), 4);

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.set(format!("key{i}"), format!("value{i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(handle.len().await.unwrap(), 8);
    assert_eq!(handle.get("key2").await.unwrap().as_deref(), Some("value2"));
    assert_eq!(handle.search("fruit").await.unwrap(), vec!["apple", "Banana"]);

    let dict = worker.shutdown().await.unwrap();
    assert_eq!(dict.len(), 8);
    assert_eq!(server.state().records.len(), 8);
}
