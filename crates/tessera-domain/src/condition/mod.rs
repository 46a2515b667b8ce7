//! Conditional-grant evaluation.
//!
//! A tuple may name a [`ConditionDefinition`]: a boolean expression over
//! typed parameters. At check time the tuple grants only while the
//! expression evaluates true under the *merged context* — the tuple-bound
//! context overlaid with the request context (request wins on conflict).
//!
//! The expression language is the usual small typed one: literals,
//! equality and ordering comparisons, `&&`/`||`/`!`, parentheses, list
//! membership via `in`, and timestamp + duration arithmetic. Evaluation is
//! sandboxed — no user functions, no loops, no mutation.
//!
//! Every failure mode here (missing definition, coercion failure,
//! evaluation error, non-boolean result) narrows access: the check
//! evaluator treats an erroring condition as "tuple does not grant".

mod cache;
mod context;
mod error;
mod expression;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use cache::ConditionExpressionCache;
pub use context::{parse_duration, ConditionContext, ConditionValue};
pub use error::ConditionError;
pub use expression::ConditionExpression;

/// Declared type of a condition parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    String,
    Int,
    Double,
    Timestamp,
    Duration,
    List,
    Map,
}

/// A named, reusable condition: typed parameters plus a boolean expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub name: String,
    pub parameters: BTreeMap<String, ParamType>,
    pub expression: String,
}

impl ConditionDefinition {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            expression: expression.into(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.parameters.insert(name.into(), ty);
        self
    }
}

/// Overlays the request context on the tuple-bound context. The request
/// wins on key conflicts, keeping conditions referentially transparent
/// with respect to the caller's view.
pub fn merge_context(
    tuple_context: Option<&Map<String, Value>>,
    request_context: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = tuple_context.cloned().unwrap_or_default();
    for (key, value) in request_context {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Evaluates condition definitions against merged contexts.
///
/// Holds the compiled-expression cache; otherwise stateless. Shared freely
/// across concurrent checks.
#[derive(Debug, Default)]
pub struct ConditionEvaluator {
    cache: ConditionExpressionCache,
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles the definition's expression, reporting syntax errors.
    /// Used by the façade to reject broken definitions at write time.
    pub fn validate(&self, definition: &ConditionDefinition) -> Result<(), ConditionError> {
        self.cache.get_or_parse(&definition.expression).map(|_| ())
    }

    /// Evaluates `definition` under `context`.
    ///
    /// Only declared parameters are bound; a declared parameter absent from
    /// the context stays unbound and errors if the expression touches it.
    /// Context keys with no matching declaration are ignored.
    pub fn evaluate(
        &self,
        definition: &ConditionDefinition,
        context: &Map<String, Value>,
    ) -> Result<bool, ConditionError> {
        let expression = self.cache.get_or_parse(&definition.expression)?;

        let mut bindings = ConditionContext::new();
        for (name, ty) in &definition.parameters {
            let Some(raw) = context.get(name) else {
                continue;
            };
            let value = ConditionValue::from_typed(*ty, raw).map_err(|actual| {
                ConditionError::ParameterType {
                    parameter: name.clone(),
                    expected: param_type_name(*ty),
                    actual,
                }
            })?;
            bindings.set(name.clone(), value);
        }

        expression.evaluate_bool(&bindings)
    }
}

fn param_type_name(ty: ParamType) -> &'static str {
    match ty {
        ParamType::Bool => "bool",
        ParamType::String => "string",
        ParamType::Int => "int",
        ParamType::Double => "double",
        ParamType::Timestamp => "timestamp",
        ParamType::Duration => "duration",
        ParamType::List => "list",
        ParamType::Map => "map",
    }
}
