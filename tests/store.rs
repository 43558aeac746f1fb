//! End-to-end lifecycle tests against the in-memory backend, covering both
//! dispatch placements.

use std::collections::BTreeSet;

use numastore::{
    DispatchContext, DispatchOptions, InstanceId, LocalExecutor, MemoryBackend,
    NUMA_TOPOLOGY_COLUMN, NumaCell, NumaTopology, StoreError, VirtNumaCell, VirtNumaTopology,
};

fn cpus(list: &[u32]) -> BTreeSet<u32> {
    list.iter().copied().collect()
}

fn instance() -> InstanceId {
    InstanceId::parse("9f2a7c1e-0d5b-4d8a-93f1-5a7e2c4b6d80").unwrap()
}

/// The worked example: two cells, second with pagesize 4.
fn example_topology(id: InstanceId) -> NumaTopology {
    NumaTopology::new(
        id,
        vec![
            NumaCell::new(0, cpus(&[0, 1]), 1024, None),
            NumaCell::new(1, cpus(&[2, 3]), 2048, Some(4)),
        ],
    )
}

fn seed_column(backend: &mut MemoryBackend, id: InstanceId, text: &str) {
    let mut row = numastore::StorageRow::new();
    row.insert(NUMA_TOPOLOGY_COLUMN.to_string(), Some(text.to_string()));
    backend.insert_row(id, row);
}

#[test]
fn save_then_get_preserves_cells_exactly() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    let mut topo = example_topology(id);

    let mut ctx = DispatchContext::direct(&mut backend);
    topo.save(&mut ctx).unwrap();
    assert!(topo.changed_fields().is_empty());

    let mut ctx = DispatchContext::direct(&mut backend);
    let got = NumaTopology::get_by_instance_id(&mut ctx, id)
        .unwrap()
        .unwrap();
    assert_eq!(got, topo);
    assert_eq!(got.cells()[0].id(), 0);
    assert_eq!(got.cells()[1].id(), 1);
    assert_eq!(got.cells()[1].pagesize(), Some(4));
    assert!(got.changed_fields().is_empty());
}

#[test]
fn missing_row_is_not_found_but_null_column_is_no_topology() {
    let mut backend = MemoryBackend::new();
    let id = instance();

    let mut ctx = DispatchContext::direct(&mut backend);
    let err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    match err {
        StoreError::NotFound { instance_id } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }

    let mut ctx = DispatchContext::direct(&mut backend);
    NumaTopology::delete_by_instance_id(&mut ctx, id).unwrap();

    let mut ctx = DispatchContext::direct(&mut backend);
    assert_eq!(NumaTopology::get_by_instance_id(&mut ctx, id).unwrap(), None);
}

#[test]
fn delete_is_idempotent() {
    let mut backend = MemoryBackend::new();
    let id = instance();

    let mut ctx = DispatchContext::direct(&mut backend);
    example_topology(id).save(&mut ctx).unwrap();

    for _ in 0..2 {
        let mut ctx = DispatchContext::direct(&mut backend);
        NumaTopology::delete_by_instance_id(&mut ctx, id).unwrap();
        let row = backend.row(&id).unwrap();
        assert_eq!(row.get(NUMA_TOPOLOGY_COLUMN), Some(&None));
    }
}

#[test]
fn legacy_row_reads_clean_and_upgrades_on_save() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    seed_column(
        &mut backend,
        id,
        r#"{"cells": [{"id": 0, "cpus": "0,1", "mem": {"total": 1024}, "pagesize": null},
                      {"id": 1, "cpus": "2-3", "mem": {"total": 2048}, "pagesize": 4}]}"#,
    );

    let mut ctx = DispatchContext::direct(&mut backend);
    let mut topo = NumaTopology::get_by_instance_id(&mut ctx, id)
        .unwrap()
        .unwrap();
    assert_eq!(topo, example_topology(id));
    // Already matches storage: nothing to persist.
    assert!(topo.changed_fields().is_empty());

    let mut ctx = DispatchContext::direct(&mut backend);
    topo.save(&mut ctx).unwrap();

    let stored = backend
        .row(&id)
        .and_then(|row| row.get(NUMA_TOPOLOGY_COLUMN).cloned().flatten())
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(value["type"], "NumaTopology");
    assert_eq!(value["version"], "1.1");
}

#[test]
fn legacy_reads_can_be_disabled() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    seed_column(
        &mut backend,
        id,
        r#"{"cells": [{"id": 0, "cpus": "0", "mem": {"total": 512}}]}"#,
    );

    let mut ctx = DispatchContext::direct(&mut backend).with_options(DispatchOptions {
        reject_legacy_reads: true,
    });
    let err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    assert!(matches!(err, StoreError::Malformed { .. }));
}

#[test]
fn malformed_column_names_the_instance() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    seed_column(&mut backend, id, "this is not any known encoding");

    let mut ctx = DispatchContext::direct(&mut backend);
    let err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    match err {
        StoreError::Malformed { instance_id, .. } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn higher_major_version_is_rejected_not_partially_decoded() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    seed_column(
        &mut backend,
        id,
        r#"{"type": "NumaTopology", "version": "2.0", "fields": {"cells": []}}"#,
    );

    let mut ctx = DispatchContext::direct(&mut backend);
    let err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    match err {
        StoreError::SchemaVersion { instance_id, .. } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn newer_minor_with_unknown_field_decodes() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    seed_column(
        &mut backend,
        id,
        &format!(
            r#"{{"type": "NumaTopology", "version": "1.2",
                 "fields": {{"instance_uuid": "{id}",
                             "cells": [{{"type": "NumaCell", "version": "1.2",
                                         "fields": {{"id": 0, "cpuset": [0], "memory": 512,
                                                     "pagesize": null, "cpu_policy": "dedicated"}}}}],
                             "fanout_hint": 7}}}}"#
        ),
    );

    let mut ctx = DispatchContext::direct(&mut backend);
    let topo = NumaTopology::get_by_instance_id(&mut ctx, id)
        .unwrap()
        .unwrap();
    assert_eq!(topo.cells().len(), 1);
    assert_eq!(topo.cells()[0].cpuset(), &cpus(&[0]));
}

#[test]
fn domain_lifecycle_round_trip() {
    let mut backend = MemoryBackend::new();
    let id = instance();
    let domain = VirtNumaTopology::new(vec![
        VirtNumaCell::new(0, cpus(&[0, 1]), 1024, None),
        VirtNumaCell::new(1, cpus(&[2, 3]), 2048, Some(4)),
    ]);

    let mut topo = NumaTopology::from_domain(id, &domain).unwrap();
    let mut ctx = DispatchContext::direct(&mut backend);
    topo.save(&mut ctx).unwrap();

    let mut ctx = DispatchContext::direct(&mut backend);
    let got = NumaTopology::get_by_instance_id(&mut ctx, id)
        .unwrap()
        .unwrap();
    assert_eq!(got.to_domain(), domain);
}

#[test]
fn remote_dispatch_matches_local_semantics() {
    let id = instance();
    let peer = LocalExecutor::new(MemoryBackend::new());

    // Not found crosses the relay intact.
    let mut ctx = DispatchContext::remote(&peer);
    assert!(!ctx.has_direct_storage_access());
    match NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err() {
        StoreError::NotFound { instance_id } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }

    // Save through the relay, read back through the relay.
    let mut topo = example_topology(id);
    let mut ctx = DispatchContext::remote(&peer);
    topo.save(&mut ctx).unwrap();
    assert!(topo.changed_fields().is_empty());

    let mut ctx = DispatchContext::remote(&peer);
    let got = NumaTopology::get_by_instance_id(&mut ctx, id)
        .unwrap()
        .unwrap();
    assert_eq!(got, topo);

    // Delete through the relay, then null column is observable.
    let mut ctx = DispatchContext::remote(&peer);
    NumaTopology::delete_by_instance_id(&mut ctx, id).unwrap();
    let mut ctx = DispatchContext::remote(&peer);
    assert_eq!(NumaTopology::get_by_instance_id(&mut ctx, id).unwrap(), None);

    // The row really lives in the peer's backend.
    let backend = peer.backend_mut();
    assert_eq!(
        backend.row(&id).unwrap().get(NUMA_TOPOLOGY_COLUMN),
        Some(&None)
    );
}

#[test]
fn remote_relay_ships_legacy_rows_as_envelopes() {
    let id = instance();
    let mut backend = MemoryBackend::new();
    seed_column(
        &mut backend,
        id,
        r#"{"cells": [{"id": 0, "cpus": "0-1", "mem": {"total": 1024}}]}"#,
    );
    let peer = LocalExecutor::new(backend);

    let mut ctx = DispatchContext::remote(&peer);
    let topo = NumaTopology::get_by_instance_id(&mut ctx, id)
        .unwrap()
        .unwrap();
    assert_eq!(topo.cells()[0].cpuset(), &cpus(&[0, 1]));
    assert!(topo.changed_fields().is_empty());
}

#[test]
fn legacy_read_policy_holds_under_both_placements() {
    let id = instance();
    let legacy = r#"{"cells": [{"id": 0, "cpus": "0", "mem": {"total": 512}}]}"#;
    let strict = DispatchOptions {
        reject_legacy_reads: true,
    };

    // Same row, same options: direct placement refuses...
    let mut backend = MemoryBackend::new();
    seed_column(&mut backend, id, legacy);
    let mut ctx = DispatchContext::direct(&mut backend).with_options(strict);
    let direct_err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    assert!(matches!(direct_err, StoreError::Malformed { .. }));

    // ...and remote placement refuses identically: the policy travels with
    // the call and the peer decodes under it.
    let mut backend = MemoryBackend::new();
    seed_column(&mut backend, id, legacy);
    let peer = LocalExecutor::new(backend);
    let mut ctx = DispatchContext::remote(&peer).with_options(strict);
    let remote_err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    match remote_err {
        StoreError::Malformed { instance_id, .. } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn strict_peer_refuses_legacy_rows_for_permissive_callers() {
    let id = instance();
    let mut backend = MemoryBackend::new();
    seed_column(
        &mut backend,
        id,
        r#"{"cells": [{"id": 0, "cpus": "0", "mem": {"total": 512}}]}"#,
    );
    let peer = LocalExecutor::new(backend).with_options(DispatchOptions {
        reject_legacy_reads: true,
    });

    // The peer's policy is a floor: a permissive caller cannot loosen it.
    let mut ctx = DispatchContext::remote(&peer);
    let err = NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err();
    assert!(matches!(err, StoreError::Malformed { .. }));
}

#[test]
fn malformed_fault_crosses_the_relay() {
    let id = instance();
    let mut backend = MemoryBackend::new();
    seed_column(&mut backend, id, "this is not any known encoding");
    let peer = LocalExecutor::new(backend);

    let mut ctx = DispatchContext::remote(&peer);
    match NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err() {
        StoreError::Malformed { instance_id, .. } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn schema_version_fault_crosses_the_relay() {
    let id = instance();
    let mut backend = MemoryBackend::new();
    seed_column(
        &mut backend,
        id,
        r#"{"type": "NumaTopology", "version": "2.0", "fields": {"cells": []}}"#,
    );
    let peer = LocalExecutor::new(backend);

    let mut ctx = DispatchContext::remote(&peer);
    match NumaTopology::get_by_instance_id(&mut ctx, id).unwrap_err() {
        StoreError::SchemaVersion { instance_id, .. } => assert_eq!(instance_id, id),
        other => panic!("unexpected error: {other:?}"),
    }
}
