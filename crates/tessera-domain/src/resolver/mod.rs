//! The check evaluator: a recursive decision procedure over the
//! relationship graph.
//!
//! `check` answers "does subject S hold relation R on object O under
//! context ctx" by interpreting the relation's [`RelationConfig`] against
//! the tuple store: direct tuples first (exact match, then the type
//! wildcard, then userset-subject expansion), then the rewrite and
//! composition fields (computed userset, implied-by union,
//! tuple-to-userset, intersection), with `excluded_by` applied last so a
//! deny defeats every positive branch.
//!
//! The graph may contain cycles and unbounded indirection, so the
//! evaluator defends itself at read time:
//!
//! - **Depth bound**: traversal deeper than `max_depth` (default 25)
//!   resolves to deny.
//! - **Cycle guard**: a per-call visited set of `object#relation` nodes,
//!   copy-on-write via `Arc` so sibling branches do not see each other's
//!   paths.
//!
//! Both guards deny silently — authorization decisions are boolean
//! outputs, never errors. Store I/O failures do propagate; broken or
//! missing conditions drop the affected tuple and nothing else.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::condition::{merge_context, ConditionEvaluator};
use crate::error::{DomainError, DomainResult};
use crate::schema::{IntersectionOperand, RelationConfig};
use crate::tuple::{ObjectRef, StoredTuple, SubjectRef, WILDCARD_SUBJECT_ID};

mod traits;
pub use traits::RelationStore;

#[cfg(test)]
pub(crate) mod tests;

/// Configuration for the check resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum traversal depth before a branch resolves to deny.
    pub max_depth: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_depth: 25 }
    }
}

/// One authorization question.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
    /// Request context for conditional tuples. Wrapped in `Arc` for cheap
    /// cloning during traversal; it wins over tuple-bound context on key
    /// conflicts.
    pub context: Arc<Map<String, Value>>,
}

impl CheckRequest {
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject,
            context: Arc::new(Map::new()),
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Arc::new(context);
        self
    }

    fn step(&self, object: ObjectRef, relation: impl Into<String>) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject: self.subject.clone(),
            context: Arc::clone(&self.context),
        }
    }
}

/// Call-local traversal state: depth and the cycle-guard visited set.
#[derive(Debug, Clone)]
struct TraversalContext {
    depth: u32,
    visited: Arc<HashSet<String>>,
}

impl TraversalContext {
    fn new() -> Self {
        Self {
            depth: 0,
            visited: Arc::new(HashSet::new()),
        }
    }

    fn increment_depth(&self) -> Self {
        Self {
            depth: self.depth + 1,
            visited: Arc::clone(&self.visited),
        }
    }

    fn with_visited(&self, node: &str) -> Self {
        let mut visited = (*self.visited).clone();
        visited.insert(node.to_string());
        Self {
            depth: self.depth,
            visited: Arc::new(visited),
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The recursive check evaluator.
///
/// Stateless between calls apart from the compiled-condition cache; safe
/// to share across concurrent checks.
pub struct CheckResolver<S> {
    store: Arc<S>,
    conditions: ConditionEvaluator,
    config: ResolverConfig,
}

impl<S> CheckResolver<S>
where
    S: RelationStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ResolverConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: ResolverConfig) -> Self {
        Self {
            store,
            conditions: ConditionEvaluator::new(),
            config,
        }
    }

    /// The condition engine, shared with the façade for write-time
    /// expression validation.
    pub fn conditions(&self) -> &ConditionEvaluator {
        &self.conditions
    }

    /// Decides whether `request.subject` holds `request.relation` on
    /// `request.object`.
    ///
    /// Returns `Ok(false)` for every no-grant outcome, including a missing
    /// relation config, an exceeded depth bound and a detected cycle.
    /// Errors are reserved for malformed requests and store failures.
    pub async fn check(&self, request: &CheckRequest) -> DomainResult<bool> {
        validate_request(request)?;
        self.resolve_check(request.clone(), TraversalContext::new())
            .await
    }

    /// Like [`CheckResolver::check`], aborting with
    /// [`DomainError::Cancelled`] when `cancel` fires. Cancellation drops
    /// the in-flight traversal, which aborts outstanding store operations.
    pub async fn check_cancellable(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> DomainResult<bool> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DomainError::Cancelled),
            result = self.check(request) => result,
        }
    }

    /// Objects of `object_type` on which `subject` holds `relation`:
    /// candidate enumeration plus a per-candidate check. Checks run
    /// concurrently (the evaluator is pure); the result follows the
    /// store's candidate order.
    pub async fn list_objects(
        &self,
        object_type: &str,
        relation: &str,
        subject: &SubjectRef,
        context: Map<String, Value>,
    ) -> DomainResult<Vec<String>> {
        let candidates = self.store.list_candidate_object_ids(object_type).await?;
        let context = Arc::new(context);

        let mut checks: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(index, object_id)| {
                let request = CheckRequest {
                    object: ObjectRef::new(object_type, object_id.clone()),
                    relation: relation.to_string(),
                    subject: subject.clone(),
                    context: Arc::clone(&context),
                };
                async move { (index, self.check(&request).await) }
            })
            .collect();

        let mut allowed = Vec::new();
        while let Some((index, result)) = checks.next().await {
            if result? {
                allowed.push(index);
            }
        }

        allowed.sort_unstable();
        Ok(allowed
            .into_iter()
            .map(|index| candidates[index].clone())
            .collect())
    }

    /// Recursive resolution for one `object#relation` node.
    fn resolve_check(
        &self,
        request: CheckRequest,
        ctx: TraversalContext,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        Box::pin(async move {
            if ctx.depth >= self.config.max_depth {
                debug!(
                    object = %request.object,
                    relation = %request.relation,
                    max_depth = self.config.max_depth,
                    "depth bound reached, denying branch"
                );
                return Ok(false);
            }

            let node = format!("{}#{}", request.object, request.relation);
            if ctx.visited.contains(&node) {
                debug!(node = %node, "cycle detected, denying branch");
                return Ok(false);
            }

            let Some(config) = self
                .store
                .find_relation_config(&request.object.object_type, &request.relation)
                .await?
            else {
                debug!(
                    object_type = %request.object.object_type,
                    relation = %request.relation,
                    "no relation config, denying branch"
                );
                return Ok(false);
            };

            let ctx = ctx.with_visited(&node);

            let granted = if let Some(ref computed) = config.computed_userset {
                // A computed userset is a standalone definition: the
                // sibling composition fields are not consulted. Direct
                // tuples still get the first look.
                self.resolve_direct(&request, &config, &ctx).await?
                    || self.resolve_sibling(&request, computed, &ctx).await?
            } else if config.intersection.as_ref().is_some_and(|ops| !ops.is_empty()) {
                // An intersection defines the relation outright; direct
                // tuples participate only through a `direct` operand.
                self.resolve_intersection(&request, &config, &ctx).await?
            } else {
                self.resolve_direct(&request, &config, &ctx).await?
                    || self.resolve_implied(&request, &config, &ctx).await?
                    || self
                        .resolve_tuple_to_usersets(&request, &config, &ctx)
                        .await?
            };

            // Exclusion is the outermost wrapper: it defeats every
            // positive branch above.
            if granted {
                if let Some(ref excluded_by) = config.excluded_by {
                    if self.resolve_sibling(&request, excluded_by, &ctx).await? {
                        debug!(node = %node, excluded_by = %excluded_by, "excluded, denying");
                        return Ok(false);
                    }
                }
            }

            Ok(granted)
        })
    }

    /// Directly-assigned tuples: exact subject match, the type wildcard,
    /// then userset-subject expansion. Also the `direct` intersection
    /// operand.
    async fn resolve_direct(
        &self,
        request: &CheckRequest,
        config: &RelationConfig,
        ctx: &TraversalContext,
    ) -> DomainResult<bool> {
        let object = &request.object;
        let subject = &request.subject;

        // Exact hit on the full identity, schema permitting this subject
        // shape on the relation at all.
        if config.accepts_subject(subject) {
            let found = self
                .store
                .find_direct_tuple(
                    &object.object_type,
                    &object.object_id,
                    &request.relation,
                    &subject.subject_type,
                    &subject.subject_id,
                    subject.subject_relation.as_deref(),
                )
                .await?;
            if let Some(tuple) = found {
                if self.tuple_grants(&tuple, &request.context).await? {
                    return Ok(true);
                }
            }
        }

        // Type wildcard: `user:*` grants any plain `user:<id>`.
        if subject.subject_relation.is_none()
            && subject.subject_id != WILDCARD_SUBJECT_ID
            && config.allows_wildcard(&subject.subject_type)
        {
            let found = self
                .store
                .find_direct_tuple(
                    &object.object_type,
                    &object.object_id,
                    &request.relation,
                    &subject.subject_type,
                    WILDCARD_SUBJECT_ID,
                    None,
                )
                .await?;
            if let Some(tuple) = found {
                if self.tuple_grants(&tuple, &request.context).await? {
                    return Ok(true);
                }
            }
        }

        // Userset subjects: each one is a promise to expand recursively.
        if config.allows_userset_subjects {
            let tuples = self
                .store
                .find_userset_tuples(&object.object_type, &object.object_id, &request.relation)
                .await?;
            for tuple in tuples {
                if !self.tuple_grants(&tuple, &request.context).await? {
                    continue;
                }
                let member_of = &tuple.key.subject;
                let Some(ref member_relation) = member_of.subject_relation else {
                    continue;
                };
                let next = request.step(
                    ObjectRef::new(
                        member_of.subject_type.clone(),
                        member_of.subject_id.clone(),
                    ),
                    member_relation.clone(),
                );
                if self.resolve_check(next, ctx.increment_depth()).await? {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Checks a sibling relation on the same object. Serves both the
    /// computed-userset rewrite and the `excluded_by` lookup.
    async fn resolve_sibling(
        &self,
        request: &CheckRequest,
        relation: &str,
        ctx: &TraversalContext,
    ) -> DomainResult<bool> {
        let next = request.step(request.object.clone(), relation);
        self.resolve_check(next, ctx.increment_depth()).await
    }

    /// Implied-by union: any sibling that holds grants. Branches run
    /// concurrently and short-circuit on the first grant; an error only
    /// propagates when no branch granted.
    async fn resolve_implied(
        &self,
        request: &CheckRequest,
        config: &RelationConfig,
        ctx: &TraversalContext,
    ) -> DomainResult<bool> {
        let Some(ref siblings) = config.implied_by else {
            return Ok(false);
        };

        let next_ctx = ctx.increment_depth();
        let mut branches: FuturesUnordered<_> = siblings
            .iter()
            .map(|sibling| {
                let next = request.step(request.object.clone(), sibling.clone());
                self.resolve_check(next, next_ctx.clone())
            })
            .collect();

        let mut deferred_error = None;
        while let Some(result) = branches.next().await {
            match result {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(error) => deferred_error = Some(error),
            }
        }
        match deferred_error {
            Some(error) => Err(error),
            None => Ok(false),
        }
    }

    async fn resolve_tuple_to_usersets(
        &self,
        request: &CheckRequest,
        config: &RelationConfig,
        ctx: &TraversalContext,
    ) -> DomainResult<bool> {
        let Some(ref entries) = config.tuple_to_userset else {
            return Ok(false);
        };
        for entry in entries {
            if self
                .resolve_tuple_to_userset(request, &entry.tupleset, &entry.computed_userset, ctx)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// One tuple-to-userset entry: follow the tupleset edges off this
    /// object, then ask for `computed_userset` on each referenced object.
    async fn resolve_tuple_to_userset(
        &self,
        request: &CheckRequest,
        tupleset: &str,
        computed_userset: &str,
        ctx: &TraversalContext,
    ) -> DomainResult<bool> {
        let tuples = self
            .store
            .find_tuples_by_relation(
                &request.object.object_type,
                &request.object.object_id,
                tupleset,
            )
            .await?;

        for tuple in tuples {
            let linked = &tuple.key.subject;
            // Tupleset edges name plain objects; usersets and wildcards
            // cannot be followed.
            if linked.is_userset() || linked.is_wildcard() {
                continue;
            }
            if !self.tuple_grants(&tuple, &request.context).await? {
                continue;
            }
            let next = request.step(
                ObjectRef::new(linked.subject_type.clone(), linked.subject_id.clone()),
                computed_userset,
            );
            if self.resolve_check(next, ctx.increment_depth()).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// AND-composition: every operand must hold, evaluated left-to-right,
    /// stopping at the first that does not.
    async fn resolve_intersection(
        &self,
        request: &CheckRequest,
        config: &RelationConfig,
        ctx: &TraversalContext,
    ) -> DomainResult<bool> {
        let Some(ref operands) = config.intersection else {
            return Ok(false);
        };
        if operands.is_empty() {
            return Ok(false);
        }

        for operand in operands {
            let holds = match operand {
                IntersectionOperand::Direct => self.resolve_direct(request, config, ctx).await?,
                IntersectionOperand::ComputedUserset { relation } => {
                    self.resolve_sibling(request, relation, ctx).await?
                }
                IntersectionOperand::TupleToUserset {
                    tupleset,
                    computed_userset,
                } => {
                    self.resolve_tuple_to_userset(request, tupleset, computed_userset, ctx)
                        .await?
                }
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether a retrieved tuple is live under the request context. An
    /// unconditional tuple always grants; a conditional one grants only
    /// when its condition evaluates true. Missing definitions and
    /// evaluation failures drop the tuple — fail closed — and are logged,
    /// not surfaced.
    async fn tuple_grants(
        &self,
        tuple: &StoredTuple,
        request_context: &Map<String, Value>,
    ) -> DomainResult<bool> {
        let Some(ref condition) = tuple.condition else {
            return Ok(true);
        };

        let Some(definition) = self.store.find_condition_definition(&condition.name).await? else {
            debug!(
                tuple = %tuple,
                condition = %condition.name,
                "condition definition missing, tuple does not grant"
            );
            return Ok(false);
        };

        let merged = merge_context(condition.context.as_ref(), request_context);
        match self.conditions.evaluate(&definition, &merged) {
            Ok(holds) => Ok(holds),
            Err(error) => {
                debug!(tuple = %tuple, %error, "condition evaluation failed, tuple does not grant");
                Ok(false)
            }
        }
    }
}

fn validate_request(request: &CheckRequest) -> DomainResult<()> {
    require_field("object_type", &request.object.object_type)?;
    require_field("object_id", &request.object.object_id)?;
    require_field("relation", &request.relation)?;
    require_field("subject_type", &request.subject.subject_type)?;
    require_field("subject_id", &request.subject.subject_id)?;
    if let Some(ref subject_relation) = request.subject.subject_relation {
        require_field("subject_relation", subject_relation)?;
        if request.subject.subject_id == WILDCARD_SUBJECT_ID {
            return Err(DomainError::invalid_request(
                "wildcard subject cannot carry a subject_relation",
            ));
        }
    }
    Ok(())
}

fn require_field(name: &str, value: &str) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::invalid_request(format!(
            "{name} cannot be empty"
        )));
    }
    Ok(())
}
