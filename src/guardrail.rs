//! Precondition expressions attached to an Action's `reason` field.
//!
//! Grounded on `guardrail.py`: a `reason` is either a human explanation
//! (passes unconditionally) or an expression (evaluated, gates the action).
//! Expression-ness is detected with the same 8-operator check
//! [`crate::expression::is_expression`] uses for minifier output, unifying
//! the narrower 4-operator check the original's `minifier.py` used in one
//! place with the fuller check `guardrail.py` used elsewhere.

use crate::context::Context;
use crate::expression::{evaluate, is_expression, truthy};
use crate::model::ActionStatement;

#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailViolation {
    pub code: &'static str,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<GuardrailViolation>,
}

pub struct GuardrailValidator;

impl GuardrailValidator {
    /// Evaluate `action.reason` (if present and expression-shaped) against
    /// `ctx`. A boolean result gates the action; a non-null, non-boolean
    /// result is treated as truthy; a non-expression reason passes
    /// unconditionally.
    pub fn validate(action: &ActionStatement, ctx: &dyn Context) -> ValidationResult {
        let Some(reason) = &action.reason else {
            return ValidationResult {
                valid: true,
                errors: Vec::new(),
            };
        };
        if !is_expression(reason) {
            return ValidationResult {
                valid: true,
                errors: Vec::new(),
            };
        }
        match evaluate(reason, ctx) {
            Ok(value) => {
                if truthy(&value) {
                    ValidationResult {
                        valid: true,
                        errors: Vec::new(),
                    }
                } else {
                    ValidationResult {
                        valid: false,
                        errors: vec![GuardrailViolation {
                            code: "PRECONDITION_FAILED",
                            message: format!("guardrail '{reason}' evaluated false"),
                        }],
                    }
                }
            }
            Err(err) => ValidationResult {
                valid: false,
                errors: vec![GuardrailViolation {
                    code: "INVALID_EXPRESSION",
                    message: err.to_string(),
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapContext;
    use crate::model::Value;

    fn action_with_reason(reason: &str) -> ActionStatement {
        ActionStatement {
            verb: "withdraw".to_string(),
            args: Vec::new(),
            named_args: Default::default(),
            policy: None,
            policy_expr: None,
            priority: None,
            reason: Some(reason.to_string()),
        }
    }

    #[test]
    fn scenario_6_guardrail_pass_and_fail() {
        let mut ctx = MapContext::new();
        ctx.set("balance", Value::Int(1500));

        let passing = action_with_reason("balance>1000");
        assert!(GuardrailValidator::validate(&passing, &ctx).valid);

        let failing = action_with_reason("balance>2000");
        let result = GuardrailValidator::validate(&failing, &ctx);
        assert!(!result.valid);
        assert_eq!(result.errors[0].code, "PRECONDITION_FAILED");
    }

    #[test]
    fn non_expression_reason_passes_unconditionally() {
        let ctx = MapContext::new();
        let action = action_with_reason("manual sign-off required");
        assert!(GuardrailValidator::validate(&action, &ctx).valid);
    }
}
