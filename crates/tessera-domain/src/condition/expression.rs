//! Compiled condition expressions.

use std::panic;

use cel_interpreter::{Program, Value};

use super::context::ConditionContext;
use super::ConditionError;

/// A compiled condition expression, ready to evaluate against a context.
pub struct ConditionExpression {
    source: String,
    program: Program,
}

impl std::fmt::Debug for ConditionExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionExpression")
            .field("source", &self.source)
            .finish()
    }
}

impl ConditionExpression {
    /// Compiles an expression string.
    ///
    /// The underlying parser can panic on some malformed input; panics are
    /// caught and reported as parse errors.
    pub fn parse(expression: &str) -> Result<Self, ConditionError> {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| Program::compile(expression)));

        let program = match result {
            Ok(Ok(program)) => program,
            Ok(Err(e)) => {
                return Err(ConditionError::Parse {
                    expression: expression.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_panic) => {
                return Err(ConditionError::Parse {
                    expression: expression.to_string(),
                    message: "parser encountered an internal error".to_string(),
                });
            }
        };

        Ok(Self {
            source: expression.to_string(),
            program,
        })
    }

    /// The original source expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression and requires a boolean result.
    ///
    /// Undefined identifiers, unsupported operand types and other engine
    /// failures report as [`ConditionError::Evaluation`]; a non-boolean
    /// result reports as [`ConditionError::NotBoolean`].
    pub fn evaluate_bool(&self, context: &ConditionContext) -> Result<bool, ConditionError> {
        let cel_ctx = context.to_cel_context();
        let value = self
            .program
            .execute(&cel_ctx)
            .map_err(|e| ConditionError::Evaluation {
                expression: self.source.clone(),
                message: e.to_string(),
            })?;

        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean {
                expression: self.source.clone(),
                actual: format!("{other:?}"),
            }),
        }
    }
}
