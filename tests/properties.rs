//! Property-based tests for two of the quantified invariants in §8:
//! content-address identity and tree canonicalization under permutation.

use std::sync::Arc;

use quickcheck_macros::quickcheck;
use repocell_core::bulk_store::MemoryBulkStore;
use repocell_core::codec::{ObjectType, Tree, TreeEntry, TreeEntryMode};
use repocell_core::config::ObjectStoreConfig;
use repocell_core::hash::{HashKind, ObjectHash, set_hash_kind_for_test};
use repocell_core::object_store::ObjectStore;

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(fut)
}

/// Property 1: `putObject` then `getObject(computedSha)` round-trips, and a
/// repeated `putObject` with the same bytes returns the same sha.
#[quickcheck]
fn content_address_identity_round_trips(payload: Vec<u8>) -> bool {
    block_on(async move {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let db = repocell_core::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let bulk = Arc::new(MemoryBulkStore::new());
        let store = ObjectStore::new(db, bulk, ObjectStoreConfig::default(), "prop-test");

        let sha_first = store.put_object(ObjectType::Blob, payload.clone()).await.unwrap();
        let sha_second = store.put_object(ObjectType::Blob, payload.clone()).await.unwrap();
        if sha_first != sha_second {
            return false;
        }

        let read_back = store.get_object(&sha_first).await.unwrap();
        if read_back != Some(payload) {
            return false;
        }
        store.verify_object(&sha_first).await.unwrap()
    })
}

/// Property 3: tree sha is invariant under any permutation of the same
/// entry set. Generates a pseudo-random permutation from quickcheck's own
/// `u8` source rather than pulling in a shuffle crate.
#[quickcheck]
fn tree_sha_is_permutation_invariant(seed: u8, count: u8) -> bool {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let count = (count % 8) as usize;
    let entries: Vec<TreeEntry> = (0..count)
        .map(|i| {
            let name = format!("file-{i}");
            let sha = ObjectHash::from_type_and_data(ObjectType::Blob, name.as_bytes());
            TreeEntry { mode: TreeEntryMode::Blob, name, id: sha }
        })
        .collect();

    let mut permuted = entries.clone();
    // Deterministic pseudo-shuffle seeded by quickcheck's own input: a
    // single rotation plus a reversal is enough to cover both "same order"
    // and "fully reordered" cases across the generated seed space.
    if !permuted.is_empty() {
        let rotate_by = (seed as usize) % permuted.len();
        permuted.rotate_left(rotate_by);
        if seed % 2 == 0 {
            permuted.reverse();
        }
    }

    let original = Tree::from_entries(entries).unwrap();
    let shuffled = Tree::from_entries(permuted).unwrap();
    original.id == shuffled.id
}
