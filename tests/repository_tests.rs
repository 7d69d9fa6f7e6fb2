mod common;

use std::collections::HashSet;
use std::sync::Arc;

use admin_config::core::models::{AdminConfig, Allow};
use admin_config::errors::{AdminConfigError, StoreError};
use admin_config::repository::records::{
    ADMIN_CONFIGURATION_PARTITION, AdminConfigRecord, AllowedUserChunk,
};
use admin_config::repository::{AdminConfigRepo, AdminConfigRepository};
use admin_config::storage::{
    ContinuationToken, MemoryTableBackend, QueryPage, TableBackend, TableOperation, TableQuery,
    TableRow, TableStorage,
};
use async_trait::async_trait;
use common::{Harness, TABLE_PREFIX, sorted, user_ids};
use uuid::Uuid;

fn allow_list(name: &str, ids: Vec<String>) -> AdminConfig {
    AdminConfig::new(name, Allow::AllOff)
        .with_description(format!("{name} description"))
        .with_user_ids(ids)
}

#[tokio::test]
async fn test_insert_250_users_is_stored_as_three_chunks() {
    let h = Harness::new();
    let ids = user_ids(250);

    let stored = h.repo.insert(allow_list("beta", ids.clone())).await.unwrap();
    assert!(!stored.config_id.is_nil());
    assert_eq!(stored.user_ids.as_deref(), Some(ids.as_slice()));

    let mut sizes: Vec<usize> = h
        .chunks(stored.config_id)
        .iter()
        .map(|c| c.user_ids().count())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);

    let all = h.repo.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    let loaded = &all[0];
    assert_eq!(loaded.config_id, stored.config_id);
    assert_eq!(loaded.flag_name, "beta");
    assert_eq!(loaded.flag_value, Allow::AllOff);
    assert_eq!(loaded.flag_description, "beta description");
    assert_eq!(sorted(loaded.user_ids.clone().unwrap()), ids);
}

#[tokio::test]
async fn test_update_to_empty_list_removes_every_chunk() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(120))).await.unwrap();
    assert_eq!(h.chunk_rows(stored.config_id).len(), 2);

    let emptied = AdminConfig {
        user_ids: Some(Vec::new()),
        ..stored.clone()
    };
    h.repo.update(emptied).await.unwrap();

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(loaded.user_ids, Some(Vec::new()));
    assert!(h.chunk_rows(stored.config_id).is_empty());
}

#[tokio::test]
async fn test_update_replaces_chunk_set() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(150))).await.unwrap();

    let replacement: Vec<String> = (0..30).map(|i| format!("N{i}")).collect();
    let updated = AdminConfig {
        flag_description: "narrowed".into(),
        user_ids: Some(replacement.clone()),
        ..stored.clone()
    };
    h.repo.update(updated).await.unwrap();

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(loaded.flag_description, "narrowed");
    assert_eq!(loaded.user_ids, Some(replacement));
    assert_eq!(h.chunk_rows(stored.config_id).len(), 1);
}

#[tokio::test]
async fn test_switching_off_allow_list_mode_drops_user_ids() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(10))).await.unwrap();

    let switched = AdminConfig {
        flag_value: Allow::AllOn,
        ..stored.clone()
    };
    h.repo.upsert(switched).await.unwrap();

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(loaded.flag_value, Allow::AllOn);
    assert!(loaded.user_ids.is_none());
    assert!(h.chunk_rows(stored.config_id).is_empty());
}

#[tokio::test]
async fn test_get_unknown_name_is_none() {
    let h = Harness::new();
    h.repo.insert(AdminConfig::new("known", Allow::AllOn)).await.unwrap();

    assert!(h.repo.get("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_on_empty_store_is_none() {
    let h = Harness::new();
    assert!(h.repo.get("anything").await.unwrap().is_none());
    assert!(h.repo.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_unknown_name_fails_without_changes() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(5))).await.unwrap();
    h.backend.reset_call_log();

    match h.repo.delete("gamma").await {
        Err(AdminConfigError::NotFound(name)) => assert_eq!(name, "gamma"),
        other => panic!("Unexpected result: {other:?}"),
    }

    assert!(h.backend.write_calls().is_empty());
    assert_eq!(h.config_rows().len(), 1);
    assert_eq!(h.chunk_rows(stored.config_id).len(), 1);
}

#[tokio::test]
async fn test_delete_removes_record_and_chunks() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(201))).await.unwrap();
    let kept = h.repo.insert(AdminConfig::new("other", Allow::AllOn)).await.unwrap();

    h.repo.delete("beta").await.unwrap();

    assert!(h.chunk_rows(stored.config_id).is_empty());
    let remaining = h.repo.get_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].config_id, kept.config_id);
}

#[tokio::test]
async fn test_sequential_inserts_get_distinct_ids() {
    let h = Harness::new();
    let mut seen = HashSet::new();

    for i in 0..50 {
        let stored = h
            .repo
            .insert(AdminConfig::new(format!("flag-{i}"), Allow::AllOn))
            .await
            .unwrap();
        assert!(seen.insert(stored.config_id), "duplicate id {}", stored.config_id);
    }
    assert_eq!(h.config_rows().len(), 50);
}

#[tokio::test]
async fn test_get_all_skips_chunk_scan_outside_allow_list_mode() {
    let h = Harness::new();
    let on = h
        .repo
        .insert(AdminConfig::new("on", Allow::AllOn).with_user_ids(["ignored"]))
        .await
        .unwrap();
    let off = h.repo.insert(allow_list("off", user_ids(3))).await.unwrap();
    assert!(h.chunk_rows(on.config_id).is_empty());
    h.backend.reset_call_log();

    h.repo.get_all().await.unwrap();

    let chunk_table = h.chunk_table();
    assert_eq!(h.backend.query_count(&chunk_table, &on.config_id.to_string()), 0);
    assert_eq!(h.backend.query_count(&chunk_table, &off.config_id.to_string()), 1);
    assert_eq!(
        h.backend
            .query_count(&h.config_table(), ADMIN_CONFIGURATION_PARTITION),
        1
    );
}

#[tokio::test]
async fn test_chunks_of_other_generations_are_not_read() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(2))).await.unwrap();

    let pending = AllowedUserChunk::new(stored.config_id, Some("pending-generation"), "X1,X2".into());
    h.backend
        .put_row(&h.chunk_table(), TableRow::from_entity(&pending).unwrap());

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(sorted(loaded.user_ids.unwrap()), user_ids(2));

    // No record ever pointed at it, so it may belong to a write in flight.
    h.repo.upsert(loaded_with_ids(&stored, user_ids(1))).await.unwrap();
    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(loaded.user_ids, Some(user_ids(1)));
    let generations: HashSet<Option<String>> = h
        .chunks(stored.config_id)
        .into_iter()
        .map(|c| c.generation)
        .collect();
    assert_eq!(generations.len(), 2);
    assert!(generations.contains(&Some("pending-generation".to_string())));
}

fn loaded_with_ids(config: &AdminConfig, ids: Vec<String>) -> AdminConfig {
    AdminConfig {
        user_ids: Some(ids),
        ..config.clone()
    }
}

#[tokio::test]
async fn test_records_without_generation_read_untagged_chunks() {
    let h = Harness::new();
    let id = Uuid::new_v4();
    let record = AdminConfigRecord::new(id, &AdminConfig::new("legacy", Allow::AllOff), None);
    h.backend
        .put_row(&h.config_table(), TableRow::from_entity(&record).unwrap());
    for payload in ["a,b", "c"] {
        let chunk = AllowedUserChunk::new(id, None, payload.into());
        h.backend
            .put_row(&h.chunk_table(), TableRow::from_entity(&chunk).unwrap());
    }

    let loaded = h.repo.get("legacy").await.unwrap().unwrap();
    assert_eq!(
        sorted(loaded.user_ids.unwrap()),
        vec!["a".to_string(), "b".into(), "c".into()]
    );
}

#[tokio::test]
async fn test_rewriting_legacy_record_reclaims_untagged_chunks() {
    let h = Harness::new();
    let id = Uuid::new_v4();
    let record = AdminConfigRecord::new(id, &AdminConfig::new("legacy", Allow::AllOff), None);
    h.backend
        .put_row(&h.config_table(), TableRow::from_entity(&record).unwrap());
    let chunk = AllowedUserChunk::new(id, None, "a,b".into());
    h.backend
        .put_row(&h.chunk_table(), TableRow::from_entity(&chunk).unwrap());

    let loaded = h.repo.get("legacy").await.unwrap().unwrap();
    h.repo
        .update(loaded_with_ids(&loaded, vec!["c".into()]))
        .await
        .unwrap();

    let chunks = h.chunks(id);
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].generation.is_some());
    let loaded = h.repo.get("legacy").await.unwrap().unwrap();
    assert_eq!(loaded.user_ids, Some(vec!["c".to_string()]));
}

#[tokio::test]
async fn test_failed_chunk_write_keeps_previous_list() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(150))).await.unwrap();

    // First chunk of the new set lands, the second fails.
    h.backend.pass_next_write();
    h.backend
        .fail_next_write(StoreError::Service("throttled".into()));
    let replacement: Vec<String> = (0..250).map(|i| format!("N{i:03}")).collect();
    let err = h
        .repo
        .update(loaded_with_ids(&stored, replacement))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdminConfigError::Storage(StoreError::Service(_))
    ));

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(sorted(loaded.user_ids.unwrap()), user_ids(150));
    assert_eq!(h.chunk_rows(stored.config_id).len(), 2);
}

#[tokio::test]
async fn test_failed_reclaim_is_retried_by_next_write() {
    let h = Harness::new();
    let stored = h.repo.insert(allow_list("beta", user_ids(150))).await.unwrap();

    // New chunk and record land, then the first reclaim delete fails.
    h.backend.pass_next_write();
    h.backend.pass_next_write();
    h.backend
        .fail_next_write(StoreError::Service("throttled".into()));
    h.repo
        .update(loaded_with_ids(&stored, user_ids(50)))
        .await
        .unwrap();

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(sorted(loaded.user_ids.unwrap()), user_ids(50));
    assert_eq!(h.chunk_rows(stored.config_id).len(), 2);

    h.repo
        .update(loaded_with_ids(&stored, user_ids(20)))
        .await
        .unwrap();

    let loaded = h.repo.get("beta").await.unwrap().unwrap();
    assert_eq!(sorted(loaded.user_ids.unwrap()), user_ids(20));
    assert_eq!(h.chunk_rows(stored.config_id).len(), 1);
}

/// Yields to the scheduler before every call so concurrent repository
/// operations interleave at each storage round-trip.
struct InterleavingBackend {
    inner: MemoryTableBackend,
}

#[async_trait]
impl TableBackend for InterleavingBackend {
    async fn query(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<ContinuationToken>,
    ) -> Result<QueryPage, StoreError> {
        tokio::task::yield_now().await;
        self.inner.query(table, query, continuation).await
    }

    async fn execute(&self, table: &str, operation: TableOperation) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.execute(table, operation).await
    }

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, StoreError> {
        tokio::task::yield_now().await;
        self.inner.create_table_if_not_exists(table).await
    }
}

#[tokio::test]
async fn test_concurrent_upserts_leave_one_complete_list() {
    let backend = Arc::new(InterleavingBackend {
        inner: MemoryTableBackend::new(),
    });
    let repo = AdminConfigRepo::new(TableStorage::new(backend.clone(), TABLE_PREFIX));
    let stored = repo
        .insert(allow_list("beta", vec!["I1".into()]))
        .await
        .unwrap();

    let a = vec!["A1".to_string(), "A2".to_string()];
    let b = vec!["B1".to_string(), "B2".to_string()];
    let (first, second) = tokio::join!(
        repo.upsert(loaded_with_ids(&stored, a.clone())),
        repo.upsert(loaded_with_ids(&stored, b.clone())),
    );
    first.unwrap();
    second.unwrap();

    let ids = sorted(repo.get("beta").await.unwrap().unwrap().user_ids.unwrap());
    assert!(ids == a || ids == b, "mixed or lost user list: {ids:?}");

    // A later write still converges to a single chunk set.
    repo.upsert(loaded_with_ids(&stored, vec!["C1".into()]))
        .await
        .unwrap();
    let ids = repo.get("beta").await.unwrap().unwrap().user_ids.unwrap();
    assert_eq!(ids, vec!["C1".to_string()]);
}

#[tokio::test]
async fn test_unknown_stored_flag_value_fails_reads() {
    let h = Harness::new();
    let id = Uuid::new_v4();
    let mut record = AdminConfigRecord::new(id, &AdminConfig::new("odd", Allow::AllOn), None);
    record.flag_value = "Sometimes".into();
    h.backend
        .put_row(&h.config_table(), TableRow::from_entity(&record).unwrap());

    match h.repo.get_all().await {
        Err(AdminConfigError::InvalidFlagValue(v)) => assert_eq!(v, "Sometimes"),
        other => panic!("Unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_stored_flag_value_is_case_insensitive() {
    let h = Harness::new();
    let id = Uuid::new_v4();
    let mut record = AdminConfigRecord::new(id, &AdminConfig::new("lower", Allow::AllOn), None);
    record.flag_value = "allon".into();
    h.backend
        .put_row(&h.config_table(), TableRow::from_entity(&record).unwrap());

    let loaded = h.repo.get("lower").await.unwrap().unwrap();
    assert_eq!(loaded.flag_value, Allow::AllOn);
}

#[tokio::test]
async fn test_update_of_missing_config_fails_and_leaves_no_chunks() {
    let h = Harness::new();
    // Provision tables so the failure comes from the missing record.
    h.repo.insert(AdminConfig::new("seed", Allow::AllOn)).await.unwrap();

    let ghost = AdminConfig {
        config_id: Uuid::new_v4(),
        ..allow_list("ghost", user_ids(3))
    };
    let err = h.repo.update(ghost.clone()).await.unwrap_err();

    assert!(matches!(
        err,
        AdminConfigError::Storage(StoreError::EntityNotFound { .. })
    ));
    assert!(h.chunk_rows(ghost.config_id).is_empty());
}

#[tokio::test]
async fn test_upsert_creates_missing_config() {
    let h = Harness::new();
    let id = Uuid::new_v4();
    let config = AdminConfig {
        config_id: id,
        ..allow_list("fresh", user_ids(101))
    };

    let returned = h.repo.upsert(config).await.unwrap();
    assert_eq!(returned.config_id, id);

    let loaded = h.repo.get("fresh").await.unwrap().unwrap();
    assert_eq!(loaded.config_id, id);
    assert_eq!(loaded.user_ids.unwrap().len(), 101);
    assert_eq!(h.chunk_rows(id).len(), 2);
}

#[tokio::test]
async fn test_update_requires_config_id() {
    let h = Harness::new();
    let err = h
        .repo
        .upsert(AdminConfig::new("no-id", Allow::AllOn))
        .await
        .unwrap_err();
    assert!(matches!(err, AdminConfigError::InvalidConfigId(_)));
    assert!(h.backend.write_calls().is_empty());
}

#[tokio::test]
async fn test_user_ids_containing_delimiter_are_rejected() {
    let h = Harness::new();
    let err = h
        .repo
        .insert(allow_list("bad", vec!["U1".into(), "U2,U3".into()]))
        .await
        .unwrap_err();

    match err {
        AdminConfigError::InvalidUserId(id) => assert_eq!(id, "U2,U3"),
        other => panic!("Unexpected error: {other:?}"),
    }
    assert!(h.backend.write_calls().is_empty());
}

#[tokio::test]
async fn test_insert_provisions_missing_tables() {
    let h = Harness::new();
    h.repo.insert(allow_list("beta", user_ids(1))).await.unwrap();

    let created = h.backend.created_tables();
    assert!(created.contains(&h.config_table()));
    assert!(created.contains(&h.chunk_table()));
}

#[tokio::test]
async fn test_backend_failure_propagates_unchanged() {
    let h = Harness::new();
    h.backend
        .fail_next_write(StoreError::Service("throttled".into()));

    let err = h.repo.insert(allow_list("beta", user_ids(3))).await.unwrap_err();

    match err {
        AdminConfigError::Storage(e) => assert_eq!(e, StoreError::Service("throttled".into())),
        other => panic!("Unexpected error: {other:?}"),
    }
    assert_eq!(h.backend.write_calls().len(), 1);
    assert!(h.config_rows().is_empty());
}

#[tokio::test]
async fn test_reads_page_through_large_partitions() {
    let h = Harness::with_backend(MemoryTableBackend::with_page_size(2));
    let stored = h.repo.insert(allow_list("beta", user_ids(950))).await.unwrap();
    for i in 0..4 {
        h.repo
            .insert(AdminConfig::new(format!("flag-{i}"), Allow::AllOn))
            .await
            .unwrap();
    }

    let all = h.repo.get_all().await.unwrap();
    assert_eq!(all.len(), 5);
    let beta = all.iter().find(|c| c.config_id == stored.config_id).unwrap();
    assert_eq!(sorted(beta.user_ids.clone().unwrap()), user_ids(950));
}
