//! End-to-end tests: two journals syncing over a real HTTP server.

use std::sync::{Arc, Mutex};

use binnacle_journal::{CommitInfo, Journal};
use binnacle_oplog::{Log, wire};
use binnacle_store::MemoryStore;
use binnacle_types::events::EventBus;
use binnacle_types::{Author, DatasetRef, Profile, ProfileId};
use bytes::Bytes;
use ed25519_dalek::SigningKey;

use crate::{Hook, HookFuture, Hooks, Logsync, LogsyncError, http};

/// 2000-01-03T00:00:00Z in nanoseconds.
const SAVE_TS: u64 = 946_857_600_000_000_000;

fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

async fn test_journal(username: &str, seed: u8) -> Arc<Journal> {
    Arc::new(
        Journal::create(
            test_key(seed),
            username,
            Arc::new(MemoryStore::new()),
            "/mem/logbook.bin",
            EventBus::new(),
        )
        .await
        .unwrap(),
    )
}

/// Bind an ephemeral listener and serve the logsync router on it.
async fn serve(logsync: Arc<Logsync>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, http::router(logsync)).await.ok();
    });

    format!("http://{addr}")
}

async fn write_world_bank_logs(journal: &Journal) -> DatasetRef {
    let name = "world_bank_population";
    let init_id = journal.write_dataset_init(name).await.unwrap();

    for (path, prev) in [
        ("/ipfs/QmVersion0", ""),
        // The misspelled prev is deliberate: previous paths are opaque
        // hints, preserved byte-for-byte.
        ("/ipfs/QmVersion1", "/ipfs/QmVesion0"),
        ("/ipfs/QmVersion2", "/ipfs/QmVersion1"),
    ] {
        journal
            .write_version_save(
                init_id,
                &CommitInfo {
                    path: path.to_string(),
                    prev: prev.to_string(),
                    title: "init dataset".to_string(),
                    timestamp: SAVE_TS,
                    size: 0,
                },
            )
            .await
            .unwrap();
    }

    DatasetRef {
        username: journal.username().to_string(),
        name: name.to_string(),
        profile_id: Some(journal.profile().author_id()),
        init_id: Some(init_id),
        path: "/ipfs/QmVersion2".to_string(),
    }
}

async fn write_nasdaq_logs(journal: &Journal) -> DatasetRef {
    let name = "nasdaq";
    let init_id = journal.write_dataset_init(name).await.unwrap();

    for (path, prev) in [("v0", ""), ("v1", "v0")] {
        journal
            .write_version_save(
                init_id,
                &CommitInfo {
                    path: path.to_string(),
                    prev: prev.to_string(),
                    title: "init dataset".to_string(),
                    timestamp: SAVE_TS,
                    size: 0,
                },
            )
            .await
            .unwrap();
    }

    DatasetRef {
        username: journal.username().to_string(),
        name: name.to_string(),
        profile_id: None,
        init_id: Some(init_id),
        path: "v1".to_string(),
    }
}

type Recorder = Arc<Mutex<Vec<String>>>;

/// A hook that records its name, optionally failing afterwards.
fn record_hook(recorder: &Recorder, name: &'static str, fail: bool) -> Hook {
    let recorder = recorder.clone();
    Arc::new(move |_author: Profile, _r: DatasetRef, _log: Option<Arc<Log>>| -> HookFuture {
        let recorder = recorder.clone();
        Box::pin(async move {
            recorder.lock().unwrap().push(name.to_string());
            if fail { Err("hook failed".into()) } else { Ok(()) }
        })
    })
}

fn recording_hooks(recorder: &Recorder, fail: bool) -> Hooks {
    Hooks {
        pull_pre_check: Some(record_hook(recorder, "PullPreCheck", fail)),
        pulled: Some(record_hook(recorder, "Pulled", fail)),
        push_pre_check: Some(record_hook(recorder, "PushPreCheck", fail)),
        push_final_check: Some(record_hook(recorder, "PushFinalCheck", fail)),
        pushed: Some(record_hook(recorder, "Pushed", fail)),
        remove_pre_check: Some(record_hook(recorder, "RemovePreCheck", fail)),
        removed: Some(record_hook(recorder, "Removed", fail)),
    }
}

fn recorded(recorder: &Recorder) -> Vec<String> {
    recorder.lock().unwrap().clone()
}

// ---------------------------------------------------------------------------
// The two-peer sync example
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_peer_sync_flow() {
    let johnathon_journal = test_journal("johnathon", 10).await;
    let basit_journal = test_journal("basit", 9).await;

    // basit only accepts pushes from johnathon, and signals on merge.
    let johnathon_id = johnathon_journal.profile().author_id();
    let (pushed_tx, mut pushed_rx) = tokio::sync::mpsc::unbounded_channel();

    let hooks = Hooks {
        push_pre_check: Some(Arc::new(
            move |author: Profile, _r: DatasetRef, _log: Option<Arc<Log>>| -> HookFuture {
                let allowed = author.author_id() == johnathon_id;
                Box::pin(async move {
                    if allowed {
                        Ok(())
                    } else {
                        Err("rejected for secret reasons".into())
                    }
                })
            },
        )),
        pushed: Some(Arc::new(
            move |_author: Profile, _r: DatasetRef, _log: Option<Arc<Log>>| -> HookFuture {
                let tx = pushed_tx.clone();
                Box::pin(async move {
                    let _ = tx.send(());
                    Ok(())
                })
            },
        )),
        ..Default::default()
    };
    let basit_logsync = Arc::new(Logsync::with_hooks(basit_journal.clone(), hooks));
    let url = serve(basit_logsync).await;

    // johnathon builds a dataset with history and pushes it to basit.
    let worldbank = write_world_bank_logs(&johnathon_journal).await;
    assert_eq!(
        johnathon_journal.items(&worldbank, 0, 100).await.unwrap().len(),
        3
    );

    let johnathon_logsync = Logsync::new(johnathon_journal.clone());
    let push = johnathon_logsync.new_push(worldbank.clone(), &url).unwrap();
    push.run().await.unwrap();

    pushed_rx.recv().await.expect("pushed hook fires");
    assert_eq!(basit_journal.items(&worldbank, 0, 100).await.unwrap().len(), 3);

    // basit builds a history of his own; johnathon pulls and merges it.
    let nasdaq = write_nasdaq_logs(&basit_journal).await;
    assert_eq!(basit_journal.items(&nasdaq, 0, 100).await.unwrap().len(), 2);

    let mut pull = johnathon_logsync.new_pull(nasdaq.clone(), &url).unwrap();
    pull.merge = true;
    let log = pull.run().await.unwrap();
    assert_eq!(log.init_id(), nasdaq.init_id.unwrap());
    assert_eq!(
        johnathon_journal.items(&nasdaq, 0, 100).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_rejected_push_does_not_mutate_server() {
    let johnathon_journal = test_journal("johnathon", 10).await;
    let basit_journal = test_journal("basit", 9).await;

    let johnathon_id = johnathon_journal.profile().author_id();
    let hooks = Hooks {
        push_pre_check: Some(Arc::new(
            move |author: Profile, _r: DatasetRef, _log: Option<Arc<Log>>| -> HookFuture {
                let allowed = author.author_id() == johnathon_id;
                Box::pin(async move {
                    if allowed {
                        Ok(())
                    } else {
                        Err("rejected for secret reasons".into())
                    }
                })
            },
        )),
        ..Default::default()
    };
    let server = Arc::new(Logsync::with_hooks(johnathon_journal.clone(), hooks));
    let url = serve(server).await;

    let worldbank = write_world_bank_logs(&basit_journal).await;
    let basit_logsync = Logsync::new(basit_journal.clone());

    let push = basit_logsync.new_push(worldbank.clone(), &url).unwrap();
    let err = push.run().await.unwrap_err();

    assert!(matches!(err, LogsyncError::Remote { status: 403, .. }));
    assert!(err.to_string().contains("rejected for secret reasons"));
    assert!(johnathon_journal.items(&worldbank, 0, 100).await.is_err());
}

// ---------------------------------------------------------------------------
// Hook ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hook_call_order() {
    let server_journal = test_journal("johnathon", 10).await;
    let client_journal = test_journal("basit", 9).await;

    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let server = Arc::new(Logsync::with_hooks(
        server_journal.clone(),
        recording_hooks(&recorder, false),
    ));
    let url = serve(server).await;

    let nasdaq = write_nasdaq_logs(&server_journal).await;
    let worldbank = write_world_bank_logs(&client_journal).await;
    let client = Logsync::new(client_journal.clone());

    let mut pull = client.new_pull(nasdaq, &url).unwrap();
    pull.merge = true;
    pull.run().await.unwrap();

    let push = client.new_push(worldbank.clone(), &url).unwrap();
    push.run().await.unwrap();

    client.do_remove(&worldbank, &url).await.unwrap();

    assert_eq!(
        recorded(&recorder),
        vec![
            "PullPreCheck",
            "Pulled",
            "PushPreCheck",
            "PushFinalCheck",
            "Pushed",
            "RemovePreCheck",
            "Removed",
        ]
    );
}

#[tokio::test]
async fn test_hook_error_order() {
    let server_journal = test_journal("johnathon", 10).await;
    let client_journal = test_journal("basit", 9).await;

    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let server = Arc::new(Logsync::with_hooks(
        server_journal.clone(),
        recording_hooks(&recorder, true),
    ));
    let url = serve(server.clone()).await;

    let nasdaq = write_nasdaq_logs(&server_journal).await;
    let worldbank = write_world_bank_logs(&client_journal).await;
    let client = Logsync::new(client_journal.clone());

    // Every verb dies at its pre-check; nothing further runs.
    let mut pull = client.new_pull(nasdaq.clone(), &url).unwrap();
    pull.merge = true;
    pull.run().await.unwrap_err();

    let push = client.new_push(worldbank.clone(), &url).unwrap();
    push.run().await.unwrap_err();

    client.do_remove(&worldbank, &url).await.unwrap_err();

    assert_eq!(
        recorded(&recorder),
        vec!["PullPreCheck", "PushPreCheck", "RemovePreCheck"]
    );

    // With pre-checks gone, a push makes it to the final check and dies
    // there. Post hooks are still never reached.
    server.set_hooks(|h| {
        h.pull_pre_check = None;
        h.push_pre_check = None;
        h.remove_pre_check = None;
    });

    let push = client.new_push(worldbank.clone(), &url).unwrap();
    push.run().await.unwrap_err();

    assert_eq!(
        recorded(&recorder),
        vec![
            "PullPreCheck",
            "PushPreCheck",
            "RemovePreCheck",
            "PushFinalCheck",
        ]
    );

    // With the final check gone too, the verbs succeed: post hooks run and
    // their failures are discarded.
    server.set_hooks(|h| h.push_final_check = None);

    let mut pull = client.new_pull(nasdaq, &url).unwrap();
    pull.merge = true;
    pull.run().await.unwrap();

    let push = client.new_push(worldbank.clone(), &url).unwrap();
    push.run().await.unwrap();

    client.do_remove(&worldbank, &url).await.unwrap();

    assert_eq!(
        recorded(&recorder),
        vec![
            "PullPreCheck",
            "PushPreCheck",
            "RemovePreCheck",
            "PushFinalCheck",
            "Pulled",
            "Pushed",
            "Removed",
        ]
    );
}

// ---------------------------------------------------------------------------
// Identity and ref verification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_wrong_profile_id_rejected_with_exact_text() {
    let johnathon_journal = test_journal("johnathon", 10).await;
    let basit_journal = test_journal("basit", 9).await;

    let server = Arc::new(Logsync::new(johnathon_journal.clone()));
    let url = serve(server).await;

    let worldbank = write_world_bank_logs(&basit_journal).await;
    let basit_logsync = Logsync::new(basit_journal.clone());

    // The ref's profile field is overwritten with some other peer's id.
    let mut tampered = worldbank.clone();
    tampered.profile_id = Some(ProfileId::from(&test_key(1).verifying_key()));

    let push = basit_logsync.new_push(tampered, &url).unwrap();
    let err = push.run().await.unwrap_err();

    assert_eq!(err.to_string(), "ref contained in log data does not match");
    assert!(matches!(err, LogsyncError::Remote { status: 401, .. }));
}

#[tokio::test]
async fn test_unauthenticated_request_rejected() {
    let journal = test_journal("johnathon", 10).await;
    let url = serve(Arc::new(Logsync::new(journal))).await;

    let status = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 401);
}

#[tokio::test]
async fn test_diverged_push_maps_to_conflict() {
    let johnathon_journal = test_journal("johnathon", 10).await;
    let basit_journal = test_journal("basit", 9).await;

    let server = Arc::new(Logsync::new(basit_journal.clone()));
    let url = serve(server).await;

    let nasdaq = write_nasdaq_logs(&johnathon_journal).await;
    let johnathon_logsync = Logsync::new(johnathon_journal.clone());
    let push = johnathon_logsync.new_push(nasdaq.clone(), &url).unwrap();
    push.run().await.unwrap();

    // A same-length history with a different tail op: diverged.
    let (bytes, _) = johnathon_journal.log_bytes(&nasdaq).await.unwrap();
    let mut forged = wire::decode_log(&bytes).unwrap();
    forged.ops.last_mut().unwrap().target = "vX".to_string();
    let forged_bytes = Bytes::from(wire::encode_log(&forged).unwrap());
    let forged_sig = johnathon_journal.sign(&forged_bytes);

    let err = http::push(
        &reqwest::Client::new(),
        &url,
        &johnathon_journal,
        &nasdaq,
        forged_bytes,
        &forged_sig,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LogsyncError::Remote { status: 409, .. }));
    assert_eq!(basit_journal.items(&nasdaq, 0, 100).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_pull_unknown_ref_is_not_found() {
    let server_journal = test_journal("johnathon", 10).await;
    let client_journal = test_journal("basit", 9).await;

    let url = serve(Arc::new(Logsync::new(server_journal))).await;
    let client = Logsync::new(client_journal);

    let ghost = DatasetRef {
        username: "johnathon".to_string(),
        name: "ghost".to_string(),
        ..Default::default()
    };
    let pull = client.new_pull(ghost, &url).unwrap();
    let err = pull.run().await.unwrap_err();

    assert!(matches!(err, LogsyncError::Remote { status: 404, .. }));
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_uninitialized_logsync_is_inert() {
    let logsync = Logsync::uninitialized();

    assert!(logsync.author().is_none());
    assert!(matches!(
        logsync.new_push(DatasetRef::default(), ""),
        Err(LogsyncError::NoLogsync)
    ));
    assert!(matches!(
        logsync.new_pull(DatasetRef::default(), ""),
        Err(LogsyncError::NoLogsync)
    ));
    assert!(matches!(
        logsync.do_remove(&DatasetRef::default(), "").await,
        Err(LogsyncError::NoLogsync)
    ));
}

#[tokio::test]
async fn test_empty_ref_fails_before_any_transport() {
    let journal = test_journal("johnathon", 10).await;
    let logsync = Logsync::new(journal);

    // The URL is unroutable on purpose: an empty ref must fail first.
    let push = logsync.new_push(DatasetRef::default(), "http://127.0.0.1:1").unwrap();
    assert!(matches!(push.run().await, Err(LogsyncError::RefEmpty)));

    let pull = logsync.new_pull(DatasetRef::default(), "http://127.0.0.1:1").unwrap();
    assert!(matches!(pull.run().await, Err(LogsyncError::RefEmpty)));

    assert!(matches!(
        logsync
            .do_remove(&DatasetRef::default(), "http://127.0.0.1:1")
            .await,
        Err(LogsyncError::RefEmpty)
    ));
}

#[tokio::test]
async fn test_pull_is_idempotent() {
    let server_journal = test_journal("basit", 9).await;
    let client_journal = test_journal("johnathon", 10).await;

    let url = serve(Arc::new(Logsync::new(server_journal.clone()))).await;
    let nasdaq = write_nasdaq_logs(&server_journal).await;

    let client = Logsync::new(client_journal.clone());

    let mut pull = client.new_pull(nasdaq.clone(), &url).unwrap();
    pull.merge = true;
    pull.run().await.unwrap();
    let first = client_journal.items(&nasdaq, 0, 100).await.unwrap();

    let mut pull = client.new_pull(nasdaq.clone(), &url).unwrap();
    pull.merge = true;
    pull.run().await.unwrap();
    let second = client_journal.items(&nasdaq, 0, 100).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(client_journal.datasets().await.len(), 1);
}

#[tokio::test]
async fn test_author_reports_journal_identity() {
    let journal = test_journal("johnathon", 10).await;
    let expected = journal.profile().clone();
    let logsync = Logsync::new(journal);

    assert_eq!(logsync.author(), Some(expected));
}
