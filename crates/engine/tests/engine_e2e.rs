//! End-to-end exercises of the engine: content addressing, strong
//! causality, snapshots, branches, tags and search visibility.

use std::collections::BTreeMap;

use aifs_engine::{
    AifsEngine, EngineConfig, EngineError, EngineOptions, ParentLink, PutAssetRequest, VerifyMode,
};
use aifs_storage::AssetFilter;
use aifs_types::asset::AssetKind;
use aifs_types::error::{MetaError, StatusKind, TxError};
use aifs_types::id::Namespace;

fn engine() -> (tempfile::TempDir, AifsEngine) {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        storage_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let engine = AifsEngine::open(config, EngineOptions::default()).unwrap();
    (dir, engine)
}

fn ns(name: &str) -> Namespace {
    Namespace::new(name).unwrap()
}

fn put_blob(engine: &AifsEngine, namespace: &str, bytes: &[u8]) -> aifs_types::id::AssetId {
    engine
        .put_asset(PutAssetRequest::blob(ns(namespace), bytes.to_vec()))
        .unwrap()
}

#[test]
fn content_addressing_roundtrip() {
    let (_dir, engine) = engine();

    let id = put_blob(&engine, "ns1", b"hello world");
    assert_eq!(id.to_hex(), blake3::hash(b"hello world").to_hex().as_str());

    let asset = engine.get_asset(&id, true).unwrap();
    assert_eq!(asset.bytes.as_deref(), Some(b"hello world".as_slice()));
    assert_eq!(asset.record.kind, AssetKind::Blob);
    assert_eq!(asset.record.size, 11);
    assert_eq!(
        asset.uri().to_string(),
        format!("aifs://ns1/{}.blob", id.to_hex())
    );
}

#[test]
fn put_is_idempotent_on_content() {
    let (_dir, engine) = engine();
    let a = put_blob(&engine, "ns1", b"same bytes");
    let b = put_blob(&engine, "ns1", b"same bytes");
    assert_eq!(a, b);

    let info = engine.info().unwrap();
    assert_eq!(info.chunk_count, 1);
}

#[test]
fn strong_causality_scenario() {
    let (_dir, engine) = engine();

    // A stays pending inside its own transaction.
    let tx_a = engine.begin_transaction().unwrap();
    let mut req_a = PutAssetRequest::blob(ns("ns1"), b"a".to_vec());
    req_a.tx_id = Some(tx_a);
    let a = engine.put_asset(req_a).unwrap();

    // B declares A as parent in a second transaction.
    let tx_b = engine.begin_transaction().unwrap();
    let mut req_b = PutAssetRequest::blob(ns("ns1"), b"b".to_vec());
    req_b.tx_id = Some(tx_b);
    req_b.parents = vec![ParentLink {
        asset_id: a,
        transform_name: "augment".to_string(),
        transform_digest: "00".repeat(32),
    }];
    let b = engine.put_asset(req_b).unwrap();

    // Committing B first fails with a precondition error.
    let err = engine.commit_transaction(&tx_b).unwrap_err();
    assert_eq!(err.status(), StatusKind::FailedPrecondition);
    assert!(matches!(
        err,
        EngineError::Tx(TxError::ParentNotVisible { .. })
    ));
    assert!(engine.get_asset(&b, false).is_err());

    // Parent first, then child: both visible.
    engine.commit_transaction(&tx_a).unwrap();
    let tx_b2 = engine.begin_transaction().unwrap();
    let mut retry = PutAssetRequest::blob(ns("ns1"), b"b".to_vec());
    retry.tx_id = Some(tx_b2);
    retry.parents = vec![ParentLink {
        asset_id: a,
        transform_name: "augment".to_string(),
        transform_digest: "00".repeat(32),
    }];
    let b2 = engine.put_asset(retry).unwrap();
    engine.commit_transaction(&tx_b2).unwrap();

    assert_eq!(b2, b);
    assert!(engine.get_asset(&a, false).is_ok());
    assert!(engine.get_asset(&b2, false).is_ok());
}

#[test]
fn rolled_back_assets_never_surface() {
    let (_dir, engine) = engine();

    let tx = engine.begin_transaction().unwrap();
    let mut req = PutAssetRequest::blob(ns("ns1"), b"doomed".to_vec());
    req.tx_id = Some(tx);
    let id = engine.put_asset(req).unwrap();

    engine.rollback_transaction(&tx).unwrap();

    assert!(engine.get_asset(&id, false).is_err());
    let page = engine
        .list_assets(
            &AssetFilter {
                namespace: ns("ns1"),
                kind: None,
                metadata: Vec::new(),
            },
            10,
            None,
        )
        .unwrap();
    assert!(page.assets.is_empty());

    let snap = engine
        .create_snapshot(&ns("ns1"), None, BTreeMap::new())
        .unwrap();
    assert!(snap.asset_ids.is_empty());
    assert_eq!(snap.metadata.get("empty"), Some(&"true".to_string()));
}

#[test]
fn snapshot_sign_verify_and_tamper() {
    let (_dir, engine) = engine();

    let mut ids = vec![
        put_blob(&engine, "ns1", b"asset a"),
        put_blob(&engine, "ns1", b"asset b"),
        put_blob(&engine, "ns1", b"asset c"),
    ];
    ids.sort();

    let snap = engine
        .create_snapshot(&ns("ns1"), None, BTreeMap::new())
        .unwrap();
    assert_eq!(snap.asset_ids, ids);
    assert_eq!(snap.snapshot_id.to_hex().len(), 32);

    // Verifies under the engine key.
    assert!(engine
        .verify_snapshot(&snap.snapshot_id, &VerifyMode::Pubkey(engine.engine_pubkey()))
        .unwrap());

    // The recomputed root matches an independent Merkle build.
    let tree = aifs_state::MerkleTree::build(ids);
    assert_eq!(snap.merkle_root, tree.root());

    // A wrong key fails.
    assert!(!engine
        .verify_snapshot(&snap.snapshot_id, &VerifyMode::Pubkey([0u8; 32])).unwrap_or(false));

    // Inclusion proofs hold for every member.
    for id in &snap.asset_ids {
        let proof = engine.prove_inclusion(&snap.snapshot_id, id).unwrap();
        assert!(aifs_state::tree::merkle::verify_proof(
            &proof,
            id,
            &snap.merkle_root
        ));
    }
    assert!(engine
        .prove_inclusion(&snap.snapshot_id, &aifs_types::id::AssetId([9; 32]))
        .is_err());
}

#[test]
fn namespace_and_trusted_key_verification_modes() {
    let (_dir, engine) = engine();
    put_blob(&engine, "ns1", b"content");
    let snap = engine
        .create_snapshot(&ns("ns1"), None, BTreeMap::new())
        .unwrap();

    // Nothing registered yet.
    assert!(engine
        .verify_snapshot(&snap.snapshot_id, &VerifyMode::NamespaceKey)
        .is_err());

    engine
        .register_namespace_key(&ns("ns1"), engine.engine_pubkey(), BTreeMap::new(), false)
        .unwrap();
    assert!(engine
        .verify_snapshot(&snap.snapshot_id, &VerifyMode::NamespaceKey)
        .unwrap());

    // Re-registration without admin overwrite fails.
    let err = engine
        .register_namespace_key(&ns("ns1"), [7; 32], BTreeMap::new(), false)
        .unwrap_err();
    assert_eq!(err.status(), StatusKind::AlreadyExists);

    // Trusted key pinned to the wrong namespace verifies false.
    engine
        .pin_trusted_key(
            "release-key",
            engine.engine_pubkey(),
            Some(ns("other")),
            BTreeMap::new(),
            false,
        )
        .unwrap();
    assert!(!engine
        .verify_snapshot(
            &snap.snapshot_id,
            &VerifyMode::TrustedKey("release-key".to_string())
        )
        .unwrap());

    engine
        .pin_trusted_key(
            "release-key-ns1",
            engine.engine_pubkey(),
            Some(ns("ns1")),
            BTreeMap::new(),
            false,
        )
        .unwrap();
    assert!(engine
        .verify_snapshot(
            &snap.snapshot_id,
            &VerifyMode::TrustedKey("release-key-ns1".to_string())
        )
        .unwrap());
}

#[test]
fn tag_immutability_scenario() {
    let (_dir, engine) = engine();
    put_blob(&engine, "prod", b"v1 content");
    let s1 = engine
        .create_snapshot(&ns("prod"), None, BTreeMap::new())
        .unwrap();
    put_blob(&engine, "prod", b"v2 content");
    let s2 = engine
        .create_snapshot(&ns("prod"), None, BTreeMap::new())
        .unwrap();

    engine.create_tag(&ns("prod"), "v1", &s1.snapshot_id).unwrap();
    let err = engine
        .create_tag(&ns("prod"), "v1", &s2.snapshot_id)
        .unwrap_err();
    assert_eq!(err.status(), StatusKind::AlreadyExists);
    assert!(matches!(
        err,
        EngineError::Meta(MetaError::AlreadyExists { .. })
    ));
    assert_eq!(
        engine.get_tag(&ns("prod"), "v1").unwrap().snapshot_id,
        s1.snapshot_id
    );
}

#[test]
fn branch_moves_record_ordered_history() {
    let (_dir, engine) = engine();
    put_blob(&engine, "prod", b"one");
    let s1 = engine
        .create_snapshot(&ns("prod"), None, BTreeMap::new())
        .unwrap();
    put_blob(&engine, "prod", b"two");
    let s2 = engine
        .create_snapshot(&ns("prod"), None, BTreeMap::new())
        .unwrap();

    engine
        .create_branch(&ns("prod"), "main", &s1.snapshot_id, BTreeMap::new())
        .unwrap();
    engine
        .create_branch(&ns("prod"), "main", &s2.snapshot_id, BTreeMap::new())
        .unwrap();

    assert_eq!(
        engine.get_branch(&ns("prod"), "main").unwrap().snapshot_id,
        s2.snapshot_id
    );
    let history = engine.get_branch_history(&ns("prod"), "main").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].old_snapshot_id, None);
    assert_eq!(history[0].new_snapshot_id, s1.snapshot_id);
    assert_eq!(history[1].old_snapshot_id, Some(s1.snapshot_id));
    assert_eq!(history[1].new_snapshot_id, s2.snapshot_id);

    engine.delete_branch(&ns("prod"), "main").unwrap();
    assert!(engine.get_branch(&ns("prod"), "main").is_err());
    assert_eq!(engine.get_branch_history(&ns("prod"), "main").unwrap().len(), 2);
}

#[test]
fn search_never_returns_invisible_assets() {
    let (_dir, engine) = engine();

    // One committed and one pending embedding, same namespace.
    let mut committed = PutAssetRequest::blob(ns("ml"), b"committed vector".to_vec());
    committed.embedding = Some(vec![1.0, 0.0, 0.0]);
    let visible = engine.put_asset(committed).unwrap();

    let tx = engine.begin_transaction().unwrap();
    let mut pending = PutAssetRequest::blob(ns("ml"), b"pending vector".to_vec());
    pending.embedding = Some(vec![0.99, 0.01, 0.0]);
    pending.tx_id = Some(tx);
    let hidden = engine.put_asset(pending).unwrap();

    let hits = engine
        .vector_search(&ns("ml"), &[1.0, 0.0, 0.0], 10, &[])
        .unwrap();
    assert!(hits.iter().any(|h| h.asset_id == visible));
    assert!(hits.iter().all(|h| h.asset_id != hidden));

    // After commit the pending vector surfaces.
    engine.commit_transaction(&tx).unwrap();
    let hits = engine
        .vector_search(&ns("ml"), &[1.0, 0.0, 0.0], 10, &[])
        .unwrap();
    assert!(hits.iter().any(|h| h.asset_id == hidden));
}

#[test]
fn search_applies_metadata_filters() {
    let (_dir, engine) = engine();

    for (tag, vector) in [("train", [1.0f32, 0.0]), ("eval", [0.9, 0.1])] {
        let mut req = PutAssetRequest::blob(ns("ml"), format!("split:{tag}").into_bytes());
        req.embedding = Some(vector.to_vec());
        req.metadata.insert("split".to_string(), tag.to_string());
        engine.put_asset(req).unwrap();
    }

    let hits = engine
        .vector_search(
            &ns("ml"),
            &[1.0, 0.0],
            10,
            &[("split".to_string(), "eval".to_string())],
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    let record = engine.get_asset(&hits[0].asset_id, false).unwrap().record;
    assert_eq!(record.metadata.get("split"), Some(&"eval".to_string()));
}

#[test]
fn embed_assets_auto_index_with_declared_metric() {
    let (_dir, engine) = engine();

    let payload = aifs_codecs::embed::encode(&aifs_codecs::EmbedPayload {
        model_name: "test-model".to_string(),
        dimension: 2,
        distance_metric: "euclidean".to_string(),
        parameters: BTreeMap::new(),
        vector: vec![3.0, 4.0],
    })
    .unwrap();

    let mut req = PutAssetRequest::blob(ns("vec"), payload);
    req.kind = AssetKind::Embed;
    let id = engine.put_asset(req).unwrap();

    let hits = engine.vector_search(&ns("vec"), &[3.0, 4.0], 1, &[]).unwrap();
    assert_eq!(hits[0].asset_id, id);
    assert!(hits[0].score.abs() < 1e-6);

    // Dimension is pinned per namespace now.
    let err = engine
        .vector_search(&ns("vec"), &[1.0, 2.0, 3.0], 1, &[])
        .unwrap_err();
    assert_eq!(err.status(), StatusKind::InvalidArgument);
}

#[test]
fn lineage_cycles_fail_the_put() {
    let (_dir, engine) = engine();
    let a = put_blob(&engine, "ns1", b"parent");

    // a -> b
    let mut req = PutAssetRequest::blob(ns("ns1"), b"child".to_vec());
    req.parents = vec![ParentLink {
        asset_id: a,
        transform_name: "t".to_string(),
        transform_digest: "11".repeat(32),
    }];
    let b = engine.put_asset(req).unwrap();

    // Re-putting content equal to `a` with parent `b` closes a cycle.
    let mut cyclic = PutAssetRequest::blob(ns("ns1"), b"parent".to_vec());
    cyclic.parents = vec![ParentLink {
        asset_id: b,
        transform_name: "t".to_string(),
        transform_digest: "11".repeat(32),
    }];
    let err = engine.put_asset(cyclic).unwrap_err();
    assert_eq!(err.status(), StatusKind::FailedPrecondition);

    // The original asset is untouched by the failed put.
    assert!(engine.get_asset(&a, true).is_ok());
}

#[test]
fn delete_then_prune_removes_unreferenced_chunks() {
    let (_dir, engine) = engine();
    let keep = put_blob(&engine, "ns1", b"keep me");
    let drop_me = put_blob(&engine, "ns1", b"drop me");

    engine.delete_asset(&drop_me).unwrap();
    assert!(engine.get_asset(&drop_me, false).is_err());

    let pruned = engine.prune_chunks().unwrap();
    assert_eq!(pruned, 1);
    assert!(engine.get_asset(&keep, true).is_ok());
    assert_eq!(engine.info().unwrap().chunk_count, 1);
}

#[test]
fn chunk_rewrap_preserves_reads() {
    let (_dir, engine) = engine();
    let id = put_blob(&engine, "ns1", b"rotate my key");
    let record = engine.get_asset(&id, false).unwrap().record;
    let chunk = record.chunks[0];

    let new_key_id = engine.rewrap_chunk(&chunk).unwrap();
    assert!(new_key_id.starts_with("local/"));
    assert_eq!(
        engine.get_asset(&id, true).unwrap().bytes.unwrap(),
        b"rotate my key"
    );
}

#[test]
fn large_structured_payload_spans_chunks() {
    let (_dir, engine) = engine();

    // A tensor bigger than one 4 MiB chunk.
    let elements = 5 * 1024 * 1024u64;
    let header = aifs_codecs::TensorHeader {
        dtype: aifs_codecs::Dtype::U8 as i32,
        shape: vec![elements],
        strides: Vec::new(),
        null_bitmap: None,
        metadata: BTreeMap::new(),
    };
    let buffer = vec![7u8; elements as usize];
    let payload = aifs_codecs::tensor::encode(&header, &buffer).unwrap();

    let mut req = PutAssetRequest::blob(ns("ns1"), payload.clone());
    req.kind = AssetKind::Tensor;
    let id = engine.put_asset(req).unwrap();

    let asset = engine.get_asset(&id, true).unwrap();
    assert!(asset.record.chunks.len() > 1);
    assert_eq!(asset.bytes.unwrap(), payload);
}

#[test]
fn events_fire_on_commit_and_snapshot() {
    let (_dir, engine) = engine();
    let mut events = engine.subscribe_events();

    let id = put_blob(&engine, "ns1", b"event payload");
    let snap = engine
        .create_snapshot(&ns("ns1"), None, BTreeMap::new())
        .unwrap();

    match events.try_recv().unwrap() {
        aifs_engine::EngineEvent::AssetsCommitted { asset_ids, .. } => {
            assert_eq!(asset_ids, vec![id]);
        }
        other => panic!("unexpected event {other:?}"),
    }
    match events.try_recv().unwrap() {
        aifs_engine::EngineEvent::SnapshotCreated { snapshot_id, .. } => {
            assert_eq!(snapshot_id, snap.snapshot_id);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn indexes_rebuild_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        storage_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let seed = [3u8; 32];

    let id = {
        let engine = AifsEngine::open(
            config.clone(),
            EngineOptions {
                signing_seed: Some(seed),
                ..Default::default()
            },
        )
        .unwrap();
        let mut req = PutAssetRequest::blob(ns("ml"), b"persisted".to_vec());
        req.embedding = Some(vec![0.5, 0.5]);
        engine.put_asset(req).unwrap()
    };

    let engine = AifsEngine::open(
        config,
        EngineOptions {
            signing_seed: Some(seed),
            ..Default::default()
        },
    )
    .unwrap();
    let hits = engine.vector_search(&ns("ml"), &[0.5, 0.5], 1, &[]).unwrap();
    assert_eq!(hits[0].asset_id, id);
}
