//! Tests for the journal crate.


use std::sync::Arc;

use binnacle_store::MemoryStore;
use binnacle_types::DatasetRef;
use binnacle_types::events::EventBus;
use ed25519_dalek::SigningKey;

use crate::{CommitInfo, Journal};

/// 2000-01-03T00:00:00Z in nanoseconds.
const SAVE_TS: u64 = 946_857_600_000_000_000;

/// Deterministic signing key from a seed byte.
fn test_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Create a journal backed by an in-memory store.
async fn test_journal(username: &str, seed: u8) -> Journal {
    Journal::create(
        test_key(seed),
        username,
        Arc::new(MemoryStore::new()),
        "/mem/logbook.bin",
        EventBus::new(),
    )
    .await
    .unwrap()
}

/// Write a three-version dataset history and return its full reference.
///
/// The second save's previous path carries the `QmVesion0` misspelling on
/// purpose: previous paths are opaque hints and must survive verbatim.
async fn write_world_bank_logs(journal: &Journal) -> DatasetRef {
    use binnacle_types::Author;

    let name = "world_bank_population";
    let init_id = journal.write_dataset_init(name).await.unwrap();

    journal
        .write_version_save(
            init_id,
            &CommitInfo {
                path: "/ipfs/QmVersion0".to_string(),
                prev: String::new(),
                title: "init dataset".to_string(),
                timestamp: SAVE_TS,
                size: 0,
            },
        )
        .await
        .unwrap();

    journal
        .write_version_save(
            init_id,
            &CommitInfo {
                path: "/ipfs/QmVersion1".to_string(),
                prev: "/ipfs/QmVesion0".to_string(),
                title: "added body data".to_string(),
                timestamp: SAVE_TS,
                size: 0,
            },
        )
        .await
        .unwrap();

    journal
        .write_version_save(
            init_id,
            &CommitInfo {
                path: "/ipfs/QmVersion2".to_string(),
                prev: "/ipfs/QmVersion1".to_string(),
                title: "added meta info".to_string(),
                timestamp: SAVE_TS,
                size: 0,
            },
        )
        .await
        .unwrap();

    DatasetRef {
        username: journal.username().to_string(),
        name: name.to_string(),
        profile_id: Some(journal.profile().author_id()),
        init_id: Some(init_id),
        path: "/ipfs/QmVersion2".to_string(),
    }
}

/// Write a two-version dataset history and return its reference.
async fn write_nasdaq_logs(journal: &Journal) -> DatasetRef {
    let name = "nasdaq";
    let init_id = journal.write_dataset_init(name).await.unwrap();

    journal
        .write_version_save(
            init_id,
            &CommitInfo {
                path: "v0".to_string(),
                prev: String::new(),
                title: "init dataset".to_string(),
                timestamp: SAVE_TS,
                size: 0,
            },
        )
        .await
        .unwrap();

    journal
        .write_version_save(
            init_id,
            &CommitInfo {
                path: "v1".to_string(),
                prev: "v0".to_string(),
                title: "init dataset".to_string(),
                timestamp: SAVE_TS,
                size: 0,
            },
        )
        .await
        .unwrap();

    DatasetRef {
        username: journal.username().to_string(),
        name: name.to_string(),
        profile_id: None,
        init_id: Some(init_id),
        path: "v1".to_string(),
    }
}
