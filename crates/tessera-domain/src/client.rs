//! The `Authorizer` façade: the public surface over a relation store.
//!
//! Reads delegate to the check resolver; writes are validated against the
//! schema before they touch the store, so the tuple relation only ever
//! contains facts the current configs admit (the evaluator still honors
//! the schema defensively at read time, since configs can change after a
//! tuple lands).

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::condition::ConditionDefinition;
use crate::error::{DomainError, DomainResult};
use crate::resolver::{CheckRequest, CheckResolver, RelationStore, ResolverConfig};
use crate::schema::RelationConfig;
use crate::tuple::{ObjectRef, StoredTuple, SubjectRef, TupleKey};

/// Thin façade binding a store to a check resolver.
pub struct Authorizer<S> {
    store: Arc<S>,
    resolver: CheckResolver<S>,
}

impl<S> Authorizer<S>
where
    S: RelationStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: ResolverConfig) -> Self {
        Self {
            resolver: CheckResolver::with_config(Arc::clone(&store), config),
            store,
        }
    }

    /// Decides a single authorization question.
    pub async fn check(&self, request: &CheckRequest) -> DomainResult<bool> {
        self.resolver.check(request).await
    }

    /// [`Authorizer::check`] with a caller-supplied cancellation signal.
    pub async fn check_cancellable(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> DomainResult<bool> {
        self.resolver.check_cancellable(request, cancel).await
    }

    /// Writes a tuple after schema-driven validation. A tuple with the
    /// same identity is overwritten; condition metadata is
    /// last-write-wins.
    pub async fn add_tuple(&self, tuple: StoredTuple) -> DomainResult<()> {
        tuple.validate()?;

        let key = &tuple.key;
        let Some(config) = self
            .store
            .find_relation_config(&key.object.object_type, &key.relation)
            .await?
        else {
            return Err(DomainError::RelationConfigNotFound {
                object_type: key.object.object_type.clone(),
                relation: key.relation.clone(),
            });
        };

        let subject = &key.subject;
        if subject.is_userset() && !config.allows_userset_subjects {
            return Err(DomainError::UsersetNotAllowed {
                object_type: config.object_type,
                relation: config.relation,
            });
        }
        if !config.accepts_subject(subject) {
            return Err(DomainError::InvalidSubjectType {
                object_type: config.object_type,
                relation: config.relation,
                subject_type: subject.subject_type.clone(),
                allowed: config.directly_assignable_types.unwrap_or_default(),
            });
        }

        debug!(tuple = %tuple, "writing tuple");
        self.store.insert_tuple(tuple).await
    }

    /// Deletes by identity; returns whether a matching tuple existed.
    pub async fn remove_tuple(&self, key: &TupleKey) -> DomainResult<bool> {
        debug!(tuple = %key, "removing tuple");
        self.store.delete_tuple(key).await
    }

    /// Objects of `object_type` on which `subject` holds `relation`.
    pub async fn list_objects(
        &self,
        object_type: &str,
        relation: &str,
        subject: &SubjectRef,
        context: Map<String, Value>,
    ) -> DomainResult<Vec<String>> {
        self.resolver
            .list_objects(object_type, relation, subject, context)
            .await
    }

    /// Direct subjects stored on `object#relation`, including userset
    /// descriptors, as stored. Deliberately lower-power than `check`: no
    /// rewrite following, no userset expansion.
    pub async fn list_subjects(
        &self,
        object: &ObjectRef,
        relation: &str,
    ) -> DomainResult<Vec<SubjectRef>> {
        self.store
            .list_direct_subjects(&object.object_type, &object.object_id, relation)
            .await
    }

    /// Upserts a relation config.
    pub async fn write_relation_config(&self, config: RelationConfig) -> DomainResult<()> {
        if config.object_type.is_empty() || config.relation.is_empty() {
            return Err(DomainError::invalid_request(
                "relation config needs object_type and relation",
            ));
        }
        self.store.upsert_relation_config(config).await
    }

    /// Deletes a relation config; returns whether it existed.
    pub async fn delete_relation_config(
        &self,
        object_type: &str,
        relation: &str,
    ) -> DomainResult<bool> {
        self.store.delete_relation_config(object_type, relation).await
    }

    /// Upserts a condition definition. The expression must compile;
    /// definitions that cannot parse are rejected rather than left to
    /// fail (closed) on every check.
    pub async fn write_condition_definition(
        &self,
        definition: ConditionDefinition,
    ) -> DomainResult<()> {
        if definition.name.is_empty() {
            return Err(DomainError::invalid_request("condition needs a name"));
        }
        self.resolver.conditions().validate(&definition)?;
        self.store.upsert_condition_definition(definition).await
    }

    /// Deletes a condition definition; returns whether it existed.
    /// Tuples referencing the deleted condition stop granting.
    pub async fn delete_condition_definition(&self, name: &str) -> DomainResult<bool> {
        self.store.delete_condition_definition(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::mocks::MockRelationStore;

    fn doc_viewer_config(types: &[&str], usersets: bool) -> RelationConfig {
        RelationConfig {
            directly_assignable_types: Some(types.iter().map(|s| s.to_string()).collect()),
            allows_userset_subjects: usersets,
            ..RelationConfig::new("document", "viewer")
        }
    }

    fn viewer_tuple(subject: SubjectRef) -> StoredTuple {
        StoredTuple::new(ObjectRef::new("document", "readme"), "viewer", subject)
    }

    async fn authorizer_with(config: RelationConfig) -> Authorizer<MockRelationStore> {
        let store = Arc::new(MockRelationStore::new());
        store.add_config(config).await;
        Authorizer::new(store)
    }

    #[tokio::test]
    async fn add_tuple_requires_a_relation_config() {
        let authorizer = Authorizer::new(Arc::new(MockRelationStore::new()));
        let err = authorizer
            .add_tuple(viewer_tuple(SubjectRef::direct("user", "alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RelationConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn add_tuple_rejects_unassignable_subject_type() {
        let authorizer = authorizer_with(doc_viewer_config(&["user"], false)).await;
        let err = authorizer
            .add_tuple(viewer_tuple(SubjectRef::direct("service", "ci")))
            .await
            .unwrap_err();
        match err {
            DomainError::InvalidSubjectType { allowed, .. } => {
                assert_eq!(allowed, vec!["user".to_string()]);
            }
            other => panic!("expected InvalidSubjectType, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_tuple_rejects_userset_when_not_allowed() {
        let authorizer = authorizer_with(doc_viewer_config(&["group"], false)).await;
        let err = authorizer
            .add_tuple(viewer_tuple(SubjectRef::userset("group", "eng", "member")))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UsersetNotAllowed { .. }));
    }

    #[tokio::test]
    async fn add_tuple_rejects_wildcard_without_schema_entry() {
        let authorizer = authorizer_with(doc_viewer_config(&["user"], false)).await;
        let err = authorizer
            .add_tuple(viewer_tuple(SubjectRef::wildcard("user")))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidSubjectType { .. }));
    }

    #[tokio::test]
    async fn add_then_check_then_remove() {
        let authorizer = authorizer_with(doc_viewer_config(&["user"], false)).await;
        let tuple = viewer_tuple(SubjectRef::direct("user", "alice"));
        authorizer.add_tuple(tuple.clone()).await.unwrap();

        let request = CheckRequest::new(
            ObjectRef::new("document", "readme"),
            "viewer",
            SubjectRef::direct("user", "alice"),
        );
        assert!(authorizer.check(&request).await.unwrap());

        assert!(authorizer.remove_tuple(&tuple.key).await.unwrap());
        assert!(!authorizer.check(&request).await.unwrap());
        // A second delete finds nothing.
        assert!(!authorizer.remove_tuple(&tuple.key).await.unwrap());
    }

    #[tokio::test]
    async fn list_subjects_returns_stored_descriptors_without_expansion() {
        let authorizer = authorizer_with(doc_viewer_config(&["user", "group"], true)).await;
        authorizer
            .add_tuple(viewer_tuple(SubjectRef::direct("user", "alice")))
            .await
            .unwrap();
        authorizer
            .add_tuple(viewer_tuple(SubjectRef::userset("group", "eng", "member")))
            .await
            .unwrap();

        let mut subjects = authorizer
            .list_subjects(&ObjectRef::new("document", "readme"), "viewer")
            .await
            .unwrap();
        subjects.sort_by_key(|s| s.to_string());
        assert_eq!(
            subjects,
            vec![
                SubjectRef::userset("group", "eng", "member"),
                SubjectRef::direct("user", "alice"),
            ]
        );
    }

    #[tokio::test]
    async fn condition_writes_validate_the_expression() {
        let authorizer = authorizer_with(doc_viewer_config(&["user"], false)).await;

        let broken = ConditionDefinition::new("broken", "tier ==");
        assert!(matches!(
            authorizer.write_condition_definition(broken).await,
            Err(DomainError::Condition(_))
        ));

        let ok = ConditionDefinition::new("gate", "tier == \"pro\"");
        authorizer.write_condition_definition(ok).await.unwrap();
        assert!(authorizer.delete_condition_definition("gate").await.unwrap());
        assert!(!authorizer.delete_condition_definition("gate").await.unwrap());
    }

    #[tokio::test]
    async fn relation_config_delete_reports_existence() {
        let authorizer = authorizer_with(doc_viewer_config(&["user"], false)).await;
        assert!(authorizer
            .delete_relation_config("document", "viewer")
            .await
            .unwrap());
        assert!(!authorizer
            .delete_relation_config("document", "viewer")
            .await
            .unwrap());
    }
}
