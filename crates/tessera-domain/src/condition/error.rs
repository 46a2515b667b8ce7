//! Condition-specific error types.

use thiserror::Error;

/// Errors from compiling or evaluating a condition expression.
///
/// During a check these never escape to the caller: a tuple whose condition
/// errors simply does not grant. They do surface from
/// `write_condition_definition`, which rejects unparseable expressions.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// The expression is not valid syntax.
    #[error("failed to parse condition expression '{expression}': {message}")]
    Parse { expression: String, message: String },

    /// The expression failed at evaluation time (undefined identifier,
    /// unsupported operator for the operand types, and so on).
    #[error("failed to evaluate condition expression '{expression}': {message}")]
    Evaluation { expression: String, message: String },

    /// A tuple references a condition with no stored definition.
    #[error("condition '{name}' is not defined")]
    DefinitionNotFound { name: String },

    /// A context value could not be coerced to the declared parameter type.
    #[error("parameter '{parameter}' expects {expected}, got {actual}")]
    ParameterType {
        parameter: String,
        expected: &'static str,
        actual: String,
    },

    /// The expression evaluated to something other than a boolean.
    #[error("condition expression '{expression}' did not yield a boolean (got {actual})")]
    NotBoolean { expression: String, actual: String },
}
