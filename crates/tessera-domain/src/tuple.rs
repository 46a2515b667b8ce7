//! Relationship tuple types.
//!
//! A tuple is one relationship fact: `object#relation@subject`, optionally
//! gated by a named condition. Tuple identity (for dedup and deletion) is
//! the six non-condition fields; condition data is mutable metadata that a
//! later write on the same identity overwrites.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};

/// Subject id sentinel for type-wildcard tuples.
pub const WILDCARD_SUBJECT_ID: &str = "*";

/// Maximum length for identity string fields.
const MAX_FIELD_LENGTH: usize = 255;

/// An object reference (e.g. `document:readme`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_type: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.object_id)
    }
}

/// A subject reference: a plain subject (`user:alice`), a type wildcard
/// (`user:*`) or a userset (`group:eng#member`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: String,
    pub subject_id: String,
    /// Non-`None` marks a userset subject: "members of `subject_type:subject_id`".
    pub subject_relation: Option<String>,
}

impl SubjectRef {
    pub fn direct(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: None,
        }
    }

    pub fn userset(
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: Some(relation.into()),
        }
    }

    pub fn wildcard(subject_type: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: WILDCARD_SUBJECT_ID.to_string(),
            subject_relation: None,
        }
    }

    /// True for `type:*` subjects (wildcards never carry a subject relation).
    pub fn is_wildcard(&self) -> bool {
        self.subject_id == WILDCARD_SUBJECT_ID && self.subject_relation.is_none()
    }

    pub fn is_userset(&self) -> bool {
        self.subject_relation.is_some()
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)?;
        if let Some(ref rel) = self.subject_relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

/// The identity of a tuple: the six fields the primary key covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub object: ObjectRef,
    pub relation: String,
    pub subject: SubjectRef,
}

impl TupleKey {
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject,
        }
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.subject)
    }
}

/// Condition metadata attached to a tuple. The tuple grants only while the
/// named condition evaluates true under the merged context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleCondition {
    pub name: String,
    /// Tuple-bound context; merged under the request context at check time.
    pub context: Option<Map<String, Value>>,
}

impl TupleCondition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: None,
        }
    }

    pub fn with_context(name: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            context: Some(context),
        }
    }
}

/// A persisted relationship tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTuple {
    pub key: TupleKey,
    pub condition: Option<TupleCondition>,
}

impl StoredTuple {
    pub fn new(object: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            key: TupleKey::new(object, relation, subject),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: TupleCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Structural validation: field presence and length only. Whether the
    /// subject is assignable to the relation is schema-driven and checked
    /// by the façade, not here.
    pub fn validate(&self) -> DomainResult<()> {
        let key = &self.key;
        check_field("object_type", &key.object.object_type)?;
        check_field("object_id", &key.object.object_id)?;
        check_field("relation", &key.relation)?;
        check_field("subject_type", &key.subject.subject_type)?;
        check_field("subject_id", &key.subject.subject_id)?;
        if let Some(ref rel) = key.subject.subject_relation {
            check_field("subject_relation", rel)?;
            if key.subject.subject_id == WILDCARD_SUBJECT_ID {
                return Err(DomainError::invalid_request(
                    "wildcard subject cannot carry a subject_relation",
                ));
            }
        }
        if let Some(ref cond) = self.condition {
            check_field("condition_name", &cond.name)?;
        }
        Ok(())
    }
}

impl fmt::Display for StoredTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if let Some(ref cond) = self.condition {
            write!(f, "[{}]", cond.name)?;
        }
        Ok(())
    }
}

fn check_field(name: &str, value: &str) -> DomainResult<()> {
    if value.is_empty() {
        return Err(DomainError::invalid_request(format!(
            "{name} cannot be empty"
        )));
    }
    if value.len() > MAX_FIELD_LENGTH {
        return Err(DomainError::invalid_request(format!(
            "{name} exceeds maximum length of {MAX_FIELD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_viewer_alice() -> StoredTuple {
        StoredTuple::new(
            ObjectRef::new("document", "readme"),
            "viewer",
            SubjectRef::direct("user", "alice"),
        )
    }

    #[test]
    fn display_formats() {
        assert_eq!(
            doc_viewer_alice().to_string(),
            "document:readme#viewer@user:alice"
        );
        assert_eq!(
            SubjectRef::userset("group", "eng", "member").to_string(),
            "group:eng#member"
        );
        assert_eq!(SubjectRef::wildcard("user").to_string(), "user:*");
    }

    #[test]
    fn wildcard_detection() {
        assert!(SubjectRef::wildcard("user").is_wildcard());
        assert!(!SubjectRef::direct("user", "alice").is_wildcard());
        // A userset on id "*" is not a wildcard subject.
        assert!(!SubjectRef::userset("group", "*", "member").is_wildcard());
    }

    #[test]
    fn validate_accepts_plain_tuple() {
        assert!(doc_viewer_alice().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_fields() {
        let tuple = StoredTuple::new(
            ObjectRef::new("document", ""),
            "viewer",
            SubjectRef::direct("user", "alice"),
        );
        assert!(matches!(
            tuple.validate(),
            Err(DomainError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn validate_rejects_wildcard_with_subject_relation() {
        let tuple = StoredTuple::new(
            ObjectRef::new("document", "readme"),
            "viewer",
            SubjectRef::userset("user", "*", "member"),
        );
        assert!(tuple.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_field() {
        let tuple = StoredTuple::new(
            ObjectRef::new("document", "x".repeat(256)),
            "viewer",
            SubjectRef::direct("user", "alice"),
        );
        assert!(tuple.validate().is_err());
    }

    #[test]
    fn condition_is_metadata_not_identity() {
        let plain = doc_viewer_alice();
        let gated = doc_viewer_alice().with_condition(TupleCondition::new("in_office_hours"));
        assert_eq!(plain.key, gated.key);
        assert_ne!(plain, gated);
    }
}
