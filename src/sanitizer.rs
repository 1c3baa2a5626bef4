//! Four-layer validation pipeline: parse → routing → schema → guardrail.
//!
//! Grounded on `sanitizer.py`'s `SAGSanitizer`/`AgentRegistry`. Unlike the
//! error taxonomy in `error.rs`, every layer here produces data
//! (`ValidationError`) rather than a thrown error — see the module doc on
//! `error.rs` for why.

use std::collections::HashSet;

use crate::context::Context;
use crate::guardrail::GuardrailValidator;
use crate::model::{Message, Statement};
use crate::parser::parse_message;
use crate::schema::{SchemaRegistry, SchemaValidator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorType {
    Parse,
    Routing,
    Schema,
    Guardrail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    pub error_type: ErrorType,
    pub code: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SanitizeResult {
    pub valid: bool,
    pub message: String,
    pub errors: Vec<ValidationError>,
}

impl SanitizeResult {
    fn ok() -> Self {
        SanitizeResult {
            valid: true,
            message: "ok".to_string(),
            errors: Vec::new(),
        }
    }
}

/// A set of known agent ids, consulted by the routing layer.
#[derive(Clone, Debug, Default)]
pub struct AgentRegistry {
    known: HashSet<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        AgentRegistry::default()
    }

    pub fn register(&mut self, agent_id: impl Into<String>) {
        self.known.insert(agent_id.into());
    }

    pub fn is_known(&self, agent_id: &str) -> bool {
        self.known.contains(agent_id)
    }

    pub fn unregister(&mut self, agent_id: &str) {
        self.known.remove(agent_id);
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Stop at the first layer that produces errors.
    Strict,
    /// Run every layer; return `valid=true` with errors as warnings.
    Permissive,
}

pub struct SAGSanitizer<'a> {
    pub registry: &'a AgentRegistry,
    pub schemas: &'a SchemaRegistry,
    pub mode: SanitizeMode,
}

impl<'a> SAGSanitizer<'a> {
    pub fn new(registry: &'a AgentRegistry, schemas: &'a SchemaRegistry, mode: SanitizeMode) -> Self {
        SAGSanitizer {
            registry,
            schemas,
            mode,
        }
    }

    /// Run all four layers over raw wire text.
    pub fn sanitize(&self, raw_input: &str, ctx: &dyn Context) -> SanitizeResult {
        let message = match parse_message(raw_input) {
            Ok(m) => m,
            Err(e) => {
                let error = ValidationError {
                    error_type: ErrorType::Parse,
                    code: "PARSE_ERROR".to_string(),
                    message: e.to_string(),
                };
                return SanitizeResult {
                    valid: false,
                    message: "parse failed".to_string(),
                    errors: vec![error],
                };
            }
        };
        self.sanitize_parsed(&message, ctx, true)
    }

    /// Run layers 2-4 on an already-parsed model.
    pub fn sanitize_output(&self, message: &Message, ctx: &dyn Context) -> SanitizeResult {
        self.sanitize_parsed(message, ctx, false)
    }

    fn sanitize_parsed(&self, message: &Message, ctx: &dyn Context, _from_raw: bool) -> SanitizeResult {
        let mut errors = self.validate_routing(message);
        if self.mode == SanitizeMode::Strict && !errors.is_empty() {
            return self.finish(errors);
        }

        errors.extend(self.validate_schemas(message));
        if self.mode == SanitizeMode::Strict && !errors.is_empty() {
            return self.finish(errors);
        }

        errors.extend(self.validate_guardrails(message, ctx));
        self.finish(errors)
    }

    fn finish(&self, errors: Vec<ValidationError>) -> SanitizeResult {
        if errors.is_empty() {
            return SanitizeResult::ok();
        }
        match self.mode {
            SanitizeMode::Strict => SanitizeResult {
                valid: false,
                message: format!("{} validation error(s)", errors.len()),
                errors,
            },
            SanitizeMode::Permissive => SanitizeResult {
                valid: true,
                message: format!("{} warning(s)", errors.len()),
                errors,
            },
        }
    }

    fn validate_routing(&self, message: &Message) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !self.registry.is_known(&message.header.source) {
            errors.push(ValidationError {
                error_type: ErrorType::Routing,
                code: "UNKNOWN_SOURCE".to_string(),
                message: format!("unknown source agent '{}'", message.header.source),
            });
        }
        if !self.registry.is_known(&message.header.destination) {
            errors.push(ValidationError {
                error_type: ErrorType::Routing,
                code: "UNKNOWN_DESTINATION".to_string(),
                message: format!("unknown destination agent '{}'", message.header.destination),
            });
        }
        errors
    }

    fn validate_schemas(&self, message: &Message) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for statement in &message.statements {
            if let Statement::Action(action) = statement {
                let result = SchemaValidator::validate(action, self.schemas);
                for violation in result.errors {
                    errors.push(ValidationError {
                        error_type: ErrorType::Schema,
                        code: violation.code.to_string(),
                        message: violation.message,
                    });
                }
            }
        }
        errors
    }

    fn validate_guardrails(&self, message: &Message, ctx: &dyn Context) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for statement in &message.statements {
            if let Statement::Action(action) = statement {
                let result = GuardrailValidator::validate(action, ctx);
                for violation in result.errors {
                    errors.push(ValidationError {
                        error_type: ErrorType::Guardrail,
                        code: violation.code.to_string(),
                        message: violation.message,
                    });
                }
            }
        }
        errors
    }
}
