//! Schema types: how a `(object_type, relation)` pair is computed.
//!
//! A [`RelationConfig`] describes one relation on one object type. The
//! fields compose: direct assignment (gated by `directly_assignable_types`),
//! union with sibling relations (`implied_by`), a rewrite to a sibling
//! (`computed_userset`), tuple-to-userset lookups, AND-composition
//! (`intersection`) and a single denying sibling (`excluded_by`).
//!
//! Configs referenced from other configs may be absent at read time; the
//! evaluator treats a missing config as deny rather than an error.

use serde::{Deserialize, Serialize};

use crate::tuple::SubjectRef;

/// How one `(object_type, relation)` is computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub object_type: String,
    pub relation: String,

    /// Subject type descriptors a direct tuple may carry: `"T"` (any
    /// subject of type T), `"T:*"` (the type wildcard is permitted) or
    /// `"T#rel"` (a specific userset of T). `None` means the relation is
    /// never directly assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directly_assignable_types: Option<Vec<String>>,

    /// Sibling relations on the same object whose truth implies this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_by: Option<Vec<String>>,

    /// Single sibling relation that defines this one by rewrite. When set,
    /// the sibling composition fields (`implied_by`, `tuple_to_userset`,
    /// `intersection`) are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_userset: Option<String>,

    /// Follow direct tuples on `tupleset`, then ask for `computed_userset`
    /// on each referenced object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple_to_userset: Option<Vec<TupleToUserset>>,

    /// Sibling relation whose truth denies this one, applied last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_by: Option<String>,

    /// AND-composition; all operands must hold, evaluated left-to-right.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection: Option<Vec<IntersectionOperand>>,

    /// Gates acceptance of tuples whose subject carries a `subject_relation`.
    #[serde(default)]
    pub allows_userset_subjects: bool,
}

/// One tuple-to-userset rewrite entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleToUserset {
    /// Relation on this object whose direct tuples name the referenced objects.
    pub tupleset: String,
    /// Relation to check on each referenced object.
    pub computed_userset: String,
}

/// Operand of an AND-composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntersectionOperand {
    /// Direct tuples of this relation, honoring `directly_assignable_types`.
    Direct,
    /// Another relation on the same object.
    ComputedUserset { relation: String },
    /// A tuple-to-userset lookup.
    TupleToUserset {
        tupleset: String,
        computed_userset: String,
    },
}

/// Parsed form of a `directly_assignable_types` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignableType {
    /// `"T"` — any plain subject of type T.
    Plain(String),
    /// `"T:*"` — the type wildcard of T is permitted.
    Wildcard(String),
    /// `"T#rel"` — the named userset of T is permitted.
    Userset {
        subject_type: String,
        relation: String,
    },
}

impl AssignableType {
    /// Parses a descriptor. Entries are stored as written; malformed
    /// descriptors parse as `Plain` of the whole string and simply never
    /// match a real subject.
    pub fn parse(entry: &str) -> Self {
        if let Some(subject_type) = entry.strip_suffix(":*") {
            return Self::Wildcard(subject_type.to_string());
        }
        if let Some((subject_type, relation)) = entry.split_once('#') {
            return Self::Userset {
                subject_type: subject_type.to_string(),
                relation: relation.to_string(),
            };
        }
        Self::Plain(entry.to_string())
    }
}

impl RelationConfig {
    pub fn new(object_type: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            relation: relation.into(),
            ..Self::default()
        }
    }

    fn assignable_types(&self) -> impl Iterator<Item = AssignableType> + '_ {
        self.directly_assignable_types
            .iter()
            .flatten()
            .map(|entry| AssignableType::parse(entry))
    }

    /// Whether the schema permits the `subject_type:*` wildcard here.
    pub fn allows_wildcard(&self, subject_type: &str) -> bool {
        self.assignable_types()
            .any(|t| matches!(t, AssignableType::Wildcard(ref wt) if wt == subject_type))
    }

    /// Whether a direct tuple with this subject is acceptable on this
    /// relation. Used for write-time validation and honored defensively
    /// when matching stored tuples at read time.
    pub fn accepts_subject(&self, subject: &SubjectRef) -> bool {
        if subject.is_wildcard() {
            return self.allows_wildcard(&subject.subject_type);
        }
        match subject.subject_relation {
            Some(ref subject_relation) => {
                if !self.allows_userset_subjects {
                    return false;
                }
                self.assignable_types().any(|t| match t {
                    AssignableType::Plain(ref st) => st == &subject.subject_type,
                    AssignableType::Userset {
                        ref subject_type,
                        ref relation,
                    } => subject_type == &subject.subject_type && relation == subject_relation,
                    AssignableType::Wildcard(_) => false,
                })
            }
            None => self
                .assignable_types()
                .any(|t| matches!(t, AssignableType::Plain(ref st) if st == &subject.subject_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assignable_type_forms() {
        assert_eq!(
            AssignableType::parse("user"),
            AssignableType::Plain("user".to_string())
        );
        assert_eq!(
            AssignableType::parse("user:*"),
            AssignableType::Wildcard("user".to_string())
        );
        assert_eq!(
            AssignableType::parse("group#member"),
            AssignableType::Userset {
                subject_type: "group".to_string(),
                relation: "member".to_string(),
            }
        );
    }

    fn editor_config(types: &[&str], usersets: bool) -> RelationConfig {
        RelationConfig {
            directly_assignable_types: Some(types.iter().map(|s| s.to_string()).collect()),
            allows_userset_subjects: usersets,
            ..RelationConfig::new("document", "editor")
        }
    }

    #[test]
    fn plain_subject_needs_plain_entry() {
        let config = editor_config(&["user"], false);
        assert!(config.accepts_subject(&SubjectRef::direct("user", "alice")));
        assert!(!config.accepts_subject(&SubjectRef::direct("service", "ci")));
        // A wildcard entry does not admit plain subjects on write.
        let config = editor_config(&["user:*"], false);
        assert!(!config.accepts_subject(&SubjectRef::direct("user", "alice")));
    }

    #[test]
    fn wildcard_subject_needs_wildcard_entry() {
        let config = editor_config(&["user"], false);
        assert!(!config.accepts_subject(&SubjectRef::wildcard("user")));
        let config = editor_config(&["user", "user:*"], false);
        assert!(config.accepts_subject(&SubjectRef::wildcard("user")));
        assert!(config.allows_wildcard("user"));
        assert!(!config.allows_wildcard("group"));
    }

    #[test]
    fn userset_subject_gated_on_allows_userset_subjects() {
        let subject = SubjectRef::userset("group", "eng", "member");
        // Type listed but usersets not enabled.
        assert!(!editor_config(&["group"], false).accepts_subject(&subject));
        // Enabled via the bare type.
        assert!(editor_config(&["group"], true).accepts_subject(&subject));
        // Enabled via an exact userset descriptor.
        assert!(editor_config(&["group#member"], true).accepts_subject(&subject));
        // Descriptor for a different relation does not match.
        assert!(!editor_config(&["group#admin"], true).accepts_subject(&subject));
    }

    #[test]
    fn intersection_operand_serde_tags() {
        let operands = vec![
            IntersectionOperand::Direct,
            IntersectionOperand::ComputedUserset {
                relation: "writer".to_string(),
            },
            IntersectionOperand::TupleToUserset {
                tupleset: "owner".to_string(),
                computed_userset: "member".to_string(),
            },
        ];
        let json = serde_json::to_value(&operands).unwrap();
        assert_eq!(json[0]["type"], "direct");
        assert_eq!(json[1]["type"], "computedUserset");
        assert_eq!(json[2]["type"], "tupleToUserset");
        assert_eq!(json[2]["tupleset"], "owner");

        let back: Vec<IntersectionOperand> = serde_json::from_value(json).unwrap();
        assert_eq!(back, operands);
    }

    #[test]
    fn relation_config_roundtrips_through_json() {
        let config = RelationConfig {
            directly_assignable_types: Some(vec!["user".to_string()]),
            implied_by: Some(vec!["owner".to_string()]),
            excluded_by: Some("blocked".to_string()),
            ..RelationConfig::new("document", "viewer")
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RelationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
