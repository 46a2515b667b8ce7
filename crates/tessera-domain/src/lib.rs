//! tessera-domain: relationship-based access control decision core.
//!
//! Given a store of relationship tuples and per-relation configs that say
//! how relations compose, the crate answers one question: is subject S in
//! relation R to object O, under context ctx?
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 tessera-domain                   │
//! ├─────────────────────────────────────────────────┤
//! │  tuple/      - Relationship tuple types          │
//! │  schema/     - Relation configs and rewrites     │
//! │  condition/  - Conditional-grant evaluation      │
//! │  resolver/   - Recursive check evaluator         │
//! │  client/     - Authorizer façade + write checks  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The evaluator is stateless between calls, fails closed on anything
//! condition-related, and bounds itself with a depth cap and a per-call
//! visited set so cyclic schemas cannot diverge.

pub mod client;
pub mod condition;
pub mod error;
pub mod resolver;
pub mod schema;
pub mod tuple;

pub use client::Authorizer;
pub use error::{DomainError, DomainResult};
pub use resolver::{CheckRequest, CheckResolver, RelationStore, ResolverConfig};
pub use tuple::{ObjectRef, StoredTuple, SubjectRef, TupleCondition, TupleKey};
