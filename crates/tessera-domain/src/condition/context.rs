//! Variable bindings for condition evaluation.
//!
//! Context values arrive as JSON (tuple-bound context merged with the
//! request context) and are coerced to the types the condition declares
//! before being handed to the expression engine.

use std::collections::HashMap;

use cel_interpreter::objects::Key;
use cel_interpreter::{Context, Value};
use chrono::{DateTime, Duration, FixedOffset};

use super::ParamType;

/// A typed value bound into a condition's evaluation context.
#[derive(Debug, Clone)]
pub enum ConditionValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    Duration(Duration),
    List(Vec<ConditionValue>),
    Map(HashMap<String, ConditionValue>),
    Null,
}

impl ConditionValue {
    /// Coerces a JSON value to the declared parameter type. The error is
    /// a short description of the actual value; the evaluator attaches the
    /// parameter name.
    pub fn from_typed(ty: ParamType, value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value as Json;
        match (ty, value) {
            (ParamType::Bool, Json::Bool(b)) => Ok(Self::Bool(*b)),
            (ParamType::String, Json::String(s)) => Ok(Self::String(s.clone())),
            (ParamType::Int, Json::Number(n)) => {
                n.as_i64().map(Self::Int).ok_or_else(|| describe(value))
            }
            (ParamType::Double, Json::Number(n)) => {
                n.as_f64().map(Self::Double).ok_or_else(|| describe(value))
            }
            (ParamType::Timestamp, Json::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(Self::Timestamp)
                .map_err(|_| describe(value)),
            (ParamType::Duration, Json::String(s)) => parse_duration(s)
                .map(Self::Duration)
                .ok_or_else(|| describe(value)),
            // Durations may also arrive as bare integer seconds.
            (ParamType::Duration, Json::Number(n)) => n
                .as_i64()
                .map(|secs| Self::Duration(Duration::seconds(secs)))
                .ok_or_else(|| describe(value)),
            (ParamType::List, Json::Array(items)) => {
                Ok(Self::List(items.iter().map(Self::from_json).collect()))
            }
            (ParamType::Map, Json::Object(entries)) => Ok(Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            )),
            _ => Err(describe(value)),
        }
    }

    /// Infers a value from untyped JSON; used for list elements and map
    /// values, which carry no declared type of their own.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Json::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(_) => "bool".to_string(),
        serde_json::Value::Number(_) => "number".to_string(),
        serde_json::Value::String(s) => format!("string \"{s}\""),
        serde_json::Value::Array(_) => "list".to_string(),
        serde_json::Value::Object(_) => "map".to_string(),
    }
}

/// Parses `"3600s"` and the composite `XhYmZs` forms (`"1h30m"`, `"2h"`,
/// `"90m10s"`). Seconds are integral; anything else is rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    if input.is_empty() {
        return None;
    }
    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut saw_component = false;
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: i64 = digits.parse().ok()?;
        digits.clear();
        total = total
            + match ch {
                'h' => Duration::hours(amount),
                'm' => Duration::minutes(amount),
                's' => Duration::seconds(amount),
                _ => return None,
            };
        saw_component = true;
    }
    // Trailing digits without a unit make the whole string invalid.
    if !digits.is_empty() || !saw_component {
        return None;
    }
    Some(total)
}

/// Variable bindings handed to the expression engine.
#[derive(Debug, Default, Clone)]
pub struct ConditionContext {
    variables: HashMap<String, ConditionValue>,
}

impl ConditionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: ConditionValue) {
        self.variables.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Builds the engine-level context. `add_variable` only fails on
    /// duplicate names, which a `HashMap` cannot produce.
    pub(crate) fn to_cel_context(&self) -> Context<'_> {
        let mut ctx = Context::default();
        for (name, value) in &self.variables {
            ctx.add_variable(name.as_str(), to_cel_value(value))
                .expect("variable names are unique");
        }
        ctx
    }
}

fn to_cel_value(value: &ConditionValue) -> Value {
    match value {
        ConditionValue::Bool(b) => Value::Bool(*b),
        ConditionValue::Int(i) => Value::Int(*i),
        ConditionValue::Double(f) => Value::Float(*f),
        ConditionValue::String(s) => Value::String(s.clone().into()),
        ConditionValue::Timestamp(ts) => Value::Timestamp(*ts),
        ConditionValue::Duration(d) => Value::Duration(*d),
        ConditionValue::List(items) => Value::List(
            items
                .iter()
                .map(to_cel_value)
                .collect::<Vec<_>>()
                .into(),
        ),
        ConditionValue::Map(entries) => {
            let converted: HashMap<Key, Value> = entries
                .iter()
                .map(|(k, v)| (Key::String(k.clone().into()), to_cel_value(v)))
                .collect();
            Value::Map(converted.into())
        }
        ConditionValue::Null => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_scalars() {
        assert!(matches!(
            ConditionValue::from_typed(ParamType::Bool, &json!(true)),
            Ok(ConditionValue::Bool(true))
        ));
        assert!(matches!(
            ConditionValue::from_typed(ParamType::Int, &json!(42)),
            Ok(ConditionValue::Int(42))
        ));
        assert!(matches!(
            ConditionValue::from_typed(ParamType::Double, &json!(1.5)),
            Ok(ConditionValue::Double(_))
        ));
        // Integers widen to double when a double is declared.
        assert!(matches!(
            ConditionValue::from_typed(ParamType::Double, &json!(3)),
            Ok(ConditionValue::Double(_))
        ));
    }

    #[test]
    fn rejects_type_mismatches() {
        assert!(ConditionValue::from_typed(ParamType::Bool, &json!("yes")).is_err());
        assert!(ConditionValue::from_typed(ParamType::Int, &json!(1.5)).is_err());
        assert!(ConditionValue::from_typed(ParamType::String, &json!(7)).is_err());
        assert!(ConditionValue::from_typed(ParamType::Timestamp, &json!("not-a-time")).is_err());
        assert!(ConditionValue::from_typed(ParamType::List, &json!({"a": 1})).is_err());
    }

    #[test]
    fn coerces_timestamp() {
        let value = ConditionValue::from_typed(ParamType::Timestamp, &json!("2024-06-01T12:00:00Z"))
            .unwrap();
        match value {
            ConditionValue::Timestamp(ts) => assert_eq!(ts.timestamp(), 1_717_243_200),
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn parses_duration_forms() {
        assert_eq!(parse_duration("3600s"), Some(Duration::seconds(3600)));
        assert_eq!(
            parse_duration("1h30m"),
            Some(Duration::hours(1) + Duration::minutes(30))
        );
        assert_eq!(
            parse_duration("2h5m10s"),
            Some(Duration::seconds(2 * 3600 + 5 * 60 + 10))
        );
        assert_eq!(parse_duration("90m"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("12"), None);
        assert_eq!(parse_duration("1d"), None);
        assert_eq!(parse_duration("1h2"), None);
    }

    #[test]
    fn infers_nested_json() {
        let value = ConditionValue::from_typed(
            ParamType::List,
            &json!(["dashboard", "library-panel"]),
        )
        .unwrap();
        match value {
            ConditionValue::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }
}
