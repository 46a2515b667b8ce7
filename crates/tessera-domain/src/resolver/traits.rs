//! Store operations the evaluator and façade consume.

use async_trait::async_trait;

use crate::condition::ConditionDefinition;
use crate::error::DomainResult;
use crate::schema::RelationConfig;
use crate::tuple::{StoredTuple, SubjectRef, TupleKey};

/// The narrow, indexed interface over persisted tuples and schema records.
///
/// Implementations must provide stable iteration within a single call and
/// read-your-writes within the issuing process. Point lookups are expected
/// to be index-backed (O(log n) or better); no transactional isolation is
/// assumed across evaluator calls.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Point lookup on the full tuple identity. Wildcard subjects are not
    /// expanded here; the evaluator asks for `subject_id = "*"` explicitly.
    async fn find_direct_tuple(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        subject_type: &str,
        subject_id: &str,
        subject_relation: Option<&str>,
    ) -> DomainResult<Option<StoredTuple>>;

    /// All tuples on this object/relation whose subject is a userset.
    async fn find_userset_tuples(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTuple>>;

    /// All tuples on this object/relation, any subject shape.
    async fn find_tuples_by_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<StoredTuple>>;

    async fn find_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> DomainResult<Option<RelationConfig>>;

    async fn find_condition_definition(
        &self,
        name: &str,
    ) -> DomainResult<Option<ConditionDefinition>>;

    /// Inserts a tuple; an existing tuple with the same identity is
    /// overwritten (condition metadata is last-write-wins).
    async fn insert_tuple(&self, tuple: StoredTuple) -> DomainResult<()>;

    /// Deletes by identity; returns whether a matching tuple existed.
    async fn delete_tuple(&self, key: &TupleKey) -> DomainResult<bool>;

    /// Every object id of the given type that appears in at least one
    /// tuple, in the store's iteration order.
    async fn list_candidate_object_ids(&self, object_type: &str) -> DomainResult<Vec<String>>;

    /// Direct subjects (including userset descriptors) stored on this
    /// object/relation, as stored — no rewrite or userset expansion.
    async fn list_direct_subjects(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<SubjectRef>>;

    async fn upsert_relation_config(&self, config: RelationConfig) -> DomainResult<()>;

    async fn delete_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> DomainResult<bool>;

    async fn upsert_condition_definition(
        &self,
        definition: ConditionDefinition,
    ) -> DomainResult<()>;

    async fn delete_condition_definition(&self, name: &str) -> DomainResult<bool>;
}
