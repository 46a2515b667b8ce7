//! In-memory implementation of the relation store.
//!
//! Tuples live in per-`(object_type, object_id, relation)` buckets, keyed
//! inside each bucket by the subject triple. That layout makes every read
//! the evaluator issues either a two-level hash lookup (the direct-tuple
//! point lookup) or a single-bucket scan (userset and tuple-to-userset
//! enumeration), and it makes the last-write-wins identity semantics fall
//! out of the bucket map itself.
//!
//! # Performance characteristics
//!
//! - **insert/delete tuple**: O(1) average
//! - **find_direct_tuple**: O(1) average
//! - **find_userset_tuples / find_tuples_by_relation**: O(bucket size)
//! - **list_candidate_object_ids**: O(distinct buckets), sorted output
//!
//! `DashMap` provides lock-free concurrent access; reads taken during a
//! concurrent write see either the old or the new value of a bucket,
//! which is all the consistency the evaluator asks for.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use tessera_domain::condition::ConditionDefinition;
use tessera_domain::schema::RelationConfig;
use tessera_domain::tuple::{ObjectRef, TupleCondition};
use tessera_domain::{DomainResult, RelationStore, StoredTuple, SubjectRef, TupleKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    object_type: String,
    object_id: String,
    relation: String,
}

impl BucketKey {
    fn new(object_type: &str, object_id: &str, relation: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
        }
    }

    fn from_tuple_key(key: &TupleKey) -> Self {
        Self::new(&key.object.object_type, &key.object.object_id, &key.relation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubjectKey {
    subject_type: String,
    subject_id: String,
    subject_relation: Option<String>,
}

impl SubjectKey {
    fn from_subject(subject: &SubjectRef) -> Self {
        Self {
            subject_type: subject.subject_type.clone(),
            subject_id: subject.subject_id.clone(),
            subject_relation: subject.subject_relation.clone(),
        }
    }

    fn to_subject(&self) -> SubjectRef {
        SubjectRef {
            subject_type: self.subject_type.clone(),
            subject_id: self.subject_id.clone(),
            subject_relation: self.subject_relation.clone(),
        }
    }
}

type Bucket = HashMap<SubjectKey, Option<TupleCondition>>;

/// In-memory reference implementation of [`RelationStore`].
#[derive(Debug, Default)]
pub struct MemoryRelationStore {
    tuples: DashMap<BucketKey, Bucket>,
    relation_configs: DashMap<(String, String), RelationConfig>,
    condition_definitions: DashMap<String, ConditionDefinition>,
}

impl MemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the common `Arc<MemoryRelationStore>` shape.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn tuple_count(&self) -> usize {
        self.tuples.iter().map(|bucket| bucket.value().len()).sum()
    }

    fn rebuild(bucket: &BucketKey, subject: &SubjectKey, condition: &Option<TupleCondition>) -> StoredTuple {
        StoredTuple {
            key: TupleKey::new(
                ObjectRef::new(bucket.object_type.clone(), bucket.object_id.clone()),
                bucket.relation.clone(),
                subject.to_subject(),
            ),
            condition: condition.clone(),
        }
    }
}

#[async_trait]
impl RelationStore for MemoryRelationStore {
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        subject_relation: Option<&str>,
    ) -> DomainResult<Option<StoredTuple>> {
        let bucket_key = BucketKey::new(object_type, object_id, relation);
        let subject_key = SubjectKey {
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            subject_relation: subject_relation.map(|s| s.to_string()),
        };
        Ok(self.tuples.get(&bucket_key).and_then(|bucket| {
            bucket
                .get(&subject_key)
                .map(|condition| Self::rebuild(&bucket_key, &subject_key, condition))
        }))
    }

    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTuple>> {
        let bucket_key = BucketKey::new(object_type, object_id, relation);
        Ok(self
            .tuples
            .get(&bucket_key)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|(subject, _)| subject.subject_relation.is_some())
                    .map(|(subject, condition)| Self::rebuild(&bucket_key, subject, condition))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTuple>> {
        let bucket_key = BucketKey::new(object_type, object_id, relation);
        Ok(self
            .tuples
            .get(&bucket_key)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|(subject, condition)| Self::rebuild(&bucket_key, subject, condition))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> DomainResult<Option<RelationConfig>> {
        Ok(self
            .relation_configs
            .get(&(object_type.to_string(), relation.to_string()))
            .map(|config| config.value().clone()))
    }

    async fn find_condition_definition(
        &self,
        name: &str,
    ) -> DomainResult<Option<ConditionDefinition>> {
        Ok(self
            .condition_definitions
            .get(name)
            .map(|definition| definition.value().clone()))
    }

    #[instrument(skip(self, tuple), fields(tuple = %tuple), level = "debug")]
    async fn insert_tuple(&self, tuple: StoredTuple) -> DomainResult<()> {
        let bucket_key = BucketKey::from_tuple_key(&tuple.key);
        let subject_key = SubjectKey::from_subject(&tuple.key.subject);
        self.tuples
            .entry(bucket_key)
            .or_default()
            .insert(subject_key, tuple.condition);
        Ok(())
    }

    #[instrument(skip(self, key), fields(tuple = %key), level = "debug")]
    async fn delete_tuple(&self, key: &TupleKey) -> DomainResult<bool> {
        let bucket_key = BucketKey::from_tuple_key(key);
        let subject_key = SubjectKey::from_subject(&key.subject);
        let existed = match self.tuples.get_mut(&bucket_key) {
            Some(mut bucket) => bucket.remove(&subject_key).is_some(),
            None => false,
        };
        if existed {
            // Empty buckets would otherwise keep the object id alive for
            // candidate enumeration.
            self.tuples.remove_if(&bucket_key, |_, bucket| bucket.is_empty());
        }
        Ok(existed)
    }

    async fn list_candidate_object_ids(&self, object_type: &str) -> DomainResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .tuples
            .iter()
            .filter(|entry| entry.key().object_type == object_type)
            .map(|entry| entry.key().object_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<SubjectRef>> {
        let bucket_key = BucketKey::new(object_type, object_id, relation);
        let mut subjects: Vec<SubjectRef> = self
            .tuples
            .get(&bucket_key)
            .map(|bucket| bucket.keys().map(SubjectKey::to_subject).collect())
            .unwrap_or_default();
        subjects.sort_by_key(|subject| subject.to_string());
        Ok(subjects)
    }

    async fn upsert_relation_config(&self, config: RelationConfig) -> DomainResult<()> {
        self.relation_configs.insert(
            (config.object_type.clone(), config.relation.clone()),
            config,
        );
        Ok(())
    }

    async fn delete_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> DomainResult<bool> {
        Ok(self
            .relation_configs
            .remove(&(object_type.to_string(), relation.to_string()))
            .is_some())
    }

    async fn upsert_condition_definition(
        &self,
        definition: ConditionDefinition,
    ) -> DomainResult<()> {
        self.condition_definitions
            .insert(definition.name.clone(), definition);
        Ok(())
    }

    async fn delete_condition_definition(&self, name: &str) -> DomainResult<bool> {
        Ok(self.condition_definitions.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(object_id: &str, relation: &str, subject: SubjectRef) -> StoredTuple {
        StoredTuple::new(ObjectRef::new("document", object_id), relation, subject)
    }

    #[tokio::test]
    async fn point_lookup_distinguishes_subject_relation() {
        let store = MemoryRelationStore::new();
        store
            .insert_tuple(tuple("d", "viewer", SubjectRef::direct("group", "eng")))
            .await
            .unwrap();
        store
            .insert_tuple(tuple(
                "d",
                "viewer",
                SubjectRef::userset("group", "eng", "member"),
            ))
            .await
            .unwrap();

        let plain = store
            .find_direct_tuple("document", "d", "viewer", "group", "eng", None)
            .await
            .unwrap()
            .expect("plain tuple");
        assert!(plain.key.subject.subject_relation.is_none());

        let userset = store
            .find_direct_tuple("document", "d", "viewer", "group", "eng", Some("member"))
            .await
            .unwrap()
            .expect("userset tuple");
        assert_eq!(
            userset.key.subject.subject_relation.as_deref(),
            Some("member")
        );

        assert!(store
            .find_direct_tuple("document", "d", "viewer", "group", "eng", Some("admin"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn userset_enumeration_filters_plain_subjects() {
        let store = MemoryRelationStore::new();
        store
            .insert_tuple(tuple("d", "viewer", SubjectRef::direct("user", "alice")))
            .await
            .unwrap();
        store
            .insert_tuple(tuple(
                "d",
                "viewer",
                SubjectRef::userset("group", "eng", "member"),
            ))
            .await
            .unwrap();

        let usersets = store
            .find_userset_tuples("document", "d", "viewer")
            .await
            .unwrap();
        assert_eq!(usersets.len(), 1);
        assert!(usersets[0].key.subject.is_userset());

        let all = store
            .find_tuples_by_relation("document", "d", "viewer")
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn identity_rewrite_is_last_write_wins() {
        let store = MemoryRelationStore::new();
        let subject = SubjectRef::direct("user", "alice");
        store
            .insert_tuple(
                tuple("d", "viewer", subject.clone())
                    .with_condition(TupleCondition::new("first")),
            )
            .await
            .unwrap();
        store
            .insert_tuple(
                tuple("d", "viewer", subject.clone())
                    .with_condition(TupleCondition::new("second")),
            )
            .await
            .unwrap();

        assert_eq!(store.tuple_count(), 1);
        let stored = store
            .find_direct_tuple("document", "d", "viewer", "user", "alice", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.condition.unwrap().name, "second");

        // A later unconditional write clears the condition.
        store
            .insert_tuple(tuple("d", "viewer", subject))
            .await
            .unwrap();
        let stored = store
            .find_direct_tuple("document", "d", "viewer", "user", "alice", None)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.condition.is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence_and_prunes_candidates() {
        let store = MemoryRelationStore::new();
        let stored = tuple("d", "viewer", SubjectRef::direct("user", "alice"));
        store.insert_tuple(stored.clone()).await.unwrap();

        assert_eq!(
            store.list_candidate_object_ids("document").await.unwrap(),
            vec!["d".to_string()]
        );

        assert!(store.delete_tuple(&stored.key).await.unwrap());
        assert!(!store.delete_tuple(&stored.key).await.unwrap());
        assert!(store
            .list_candidate_object_ids("document")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn candidate_ids_are_sorted_and_deduplicated() {
        let store = MemoryRelationStore::new();
        for (id, relation) in [("b", "viewer"), ("a", "viewer"), ("b", "editor")] {
            store
                .insert_tuple(tuple(id, relation, SubjectRef::direct("user", "alice")))
                .await
                .unwrap();
        }
        assert_eq!(
            store.list_candidate_object_ids("document").await.unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[tokio::test]
    async fn schema_records_upsert_and_delete() {
        let store = MemoryRelationStore::new();
        store
            .upsert_relation_config(RelationConfig::new("document", "viewer"))
            .await
            .unwrap();
        assert!(store
            .find_relation_config("document", "viewer")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .delete_relation_config("document", "viewer")
            .await
            .unwrap());
        assert!(store
            .find_relation_config("document", "viewer")
            .await
            .unwrap()
            .is_none());

        store
            .upsert_condition_definition(ConditionDefinition::new("gate", "true"))
            .await
            .unwrap();
        assert!(store
            .find_condition_definition("gate")
            .await
            .unwrap()
            .is_some());
        assert!(store.delete_condition_definition("gate").await.unwrap());
        assert!(!store.delete_condition_definition("gate").await.unwrap());
    }
}
