//! Per-verb typed argument contracts.
//!
//! Grounded on `schema.py`'s `ArgType`/`ArgumentSpec`/`VerbSchema`/
//! `SchemaRegistry`/`SchemaValidator`, with the nested `Builder` flattened
//! into ordinary `with_*` constructors (the teacher's builder-method idiom
//! rather than a separate builder type).

use std::collections::HashMap;

use regex::Regex;

use crate::model::{ActionStatement, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgType {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Object,
    Any,
}

impl ArgType {
    fn type_name(self) -> &'static str {
        match self {
            ArgType::String => "String",
            ArgType::Integer => "Integer",
            ArgType::Float => "Float",
            ArgType::Boolean => "Boolean",
            ArgType::List => "List",
            ArgType::Object => "Object",
            ArgType::Any => "Any",
        }
    }

    fn is_compatible(self, value: &Value) -> bool {
        if matches!(value, Value::Null) || matches!(self, ArgType::Any) {
            return true;
        }
        match (self, value) {
            (ArgType::String, Value::String(_) | Value::Path(_)) => true,
            // Booleans are not integers even though Rust's bool isn't
            // numeric either way; kept explicit to mirror the original's
            // deliberate `INTEGER excludes boolean` rule.
            (ArgType::Integer, Value::Int(_)) => true,
            (ArgType::Integer, Value::Bool(_)) => false,
            (ArgType::Float, Value::Float(_)) => true,
            (ArgType::Boolean, Value::Bool(_)) => true,
            (ArgType::List, Value::List(_)) => true,
            (ArgType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ArgumentSpec {
    pub name: String,
    pub arg_type: ArgType,
    pub required: bool,
    pub description: String,
    pub allowed_values: Option<Vec<Value>>,
    pub pattern: Option<Regex>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl ArgumentSpec {
    pub fn new(name: impl Into<String>, arg_type: ArgType) -> Self {
        ArgumentSpec {
            name: name.into(),
            arg_type,
            required: false,
            description: String::new(),
            allowed_values: None,
            pattern: None,
            min_value: None,
            max_value: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    /// `STRING`-only per spec.md §4.4.
    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Regex::new(pattern).ok();
        self
    }

    /// `INTEGER`/`FLOAT`-only per spec.md §4.4.
    #[must_use]
    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct VerbSchema {
    pub positional: Vec<ArgumentSpec>,
    pub named: HashMap<String, ArgumentSpec>,
    pub allow_extra_args: bool,
}

impl VerbSchema {
    pub fn new() -> Self {
        VerbSchema::default()
    }

    #[must_use]
    pub fn with_positional(mut self, spec: ArgumentSpec) -> Self {
        self.positional.push(spec);
        self
    }

    #[must_use]
    pub fn with_named(mut self, spec: ArgumentSpec) -> Self {
        self.named.insert(spec.name.clone(), spec);
        self
    }

    #[must_use]
    pub fn allow_extra_args(mut self) -> Self {
        self.allow_extra_args = true;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    verbs: HashMap<String, VerbSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    pub fn register(&mut self, verb: impl Into<String>, schema: VerbSchema) {
        self.verbs.insert(verb.into(), schema);
    }

    pub fn get(&self, verb: &str) -> Option<&VerbSchema> {
        self.verbs.get(verb)
    }

    /// Small illustrative verb set (`deploy`, `query`, `notify`) used by the
    /// crate's own tests/doctests. Not required for any runtime path —
    /// callers build their own registries from scratch.
    pub fn with_builtin_profile() -> Self {
        let mut registry = SchemaRegistry::new();
        registry.register(
            "deploy",
            VerbSchema::new()
                .with_positional(
                    ArgumentSpec::new("app", ArgType::String)
                        .required()
                        .with_description("application identifier"),
                )
                .with_named(ArgumentSpec::new("version", ArgType::Integer).required()),
        );
        registry.register(
            "query",
            VerbSchema::new().with_positional(
                ArgumentSpec::new("target", ArgType::String)
                    .required()
                    .with_description("query target"),
            ),
        );
        registry.register(
            "notify",
            VerbSchema::new()
                .with_positional(ArgumentSpec::new("channel", ArgType::String).required())
                .with_named(ArgumentSpec::new("message", ArgType::String).required())
                .allow_extra_args(),
        );
        registry
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Parse,
    Routing,
    Schema,
    Guardrail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SchemaValidationResult {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SchemaViolation {
    pub code: &'static str,
    pub message: String,
}

pub struct SchemaValidator;

impl SchemaValidator {
    /// Validation order (spec.md §4.4): each declared positional (missing →
    /// type → allowedValues → pattern → range), then extra positionals,
    /// then each incoming named (unknown → type → constraints), then each
    /// declared required named missing.
    pub fn validate(action: &ActionStatement, registry: &SchemaRegistry) -> SchemaValidationResult {
        let Some(schema) = registry.get(&action.verb) else {
            // Open-world default: unknown verbs pass.
            return SchemaValidationResult {
                valid: true,
                errors: Vec::new(),
            };
        };

        let mut errors = Vec::new();

        for (idx, spec) in schema.positional.iter().enumerate() {
            match action.args.get(idx) {
                None => {
                    if spec.required {
                        errors.push(SchemaViolation {
                            code: "MISSING_ARG",
                            message: format!("missing required positional argument '{}'", spec.name),
                        });
                    }
                }
                Some(value) => Self::check_value(spec, value, &mut errors),
            }
        }

        if action.args.len() > schema.positional.len() && !schema.allow_extra_args {
            errors.push(SchemaViolation {
                code: "TOO_MANY_ARGS",
                message: format!(
                    "verb '{}' accepts {} positional argument(s), got {}",
                    action.verb,
                    schema.positional.len(),
                    action.args.len()
                ),
            });
        }

        for (name, value) in &action.named_args {
            match schema.named.get(name) {
                None => {
                    if !schema.allow_extra_args {
                        errors.push(SchemaViolation {
                            code: "INVALID_ARGS",
                            message: format!("unknown named argument '{name}'"),
                        });
                    }
                }
                Some(spec) => Self::check_value(spec, value, &mut errors),
            }
        }

        for spec in schema.named.values() {
            if spec.required && !action.named_args.contains_key(&spec.name) {
                errors.push(SchemaViolation {
                    code: "MISSING_ARG",
                    message: format!("missing required named argument '{}'", spec.name),
                });
            }
        }

        SchemaValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn check_value(spec: &ArgumentSpec, value: &Value, errors: &mut Vec<SchemaViolation>) {
        if matches!(value, Value::Null) {
            return;
        }
        if !spec.arg_type.is_compatible(value) {
            errors.push(SchemaViolation {
                code: "TYPE_MISMATCH",
                message: format!(
                    "argument '{}' expected {}, got {}",
                    spec.name,
                    spec.arg_type.type_name(),
                    value.type_name()
                ),
            });
            return;
        }
        if let Some(allowed) = &spec.allowed_values {
            if !allowed.contains(value) {
                errors.push(SchemaViolation {
                    code: "VALUE_NOT_ALLOWED",
                    message: format!("argument '{}' value {} is not an allowed value", spec.name, value),
                });
            }
        }
        if let Some(pattern) = &spec.pattern {
            if let Value::String(s) = value {
                if !pattern.is_match(s) {
                    errors.push(SchemaViolation {
                        code: "PATTERN_MISMATCH",
                        message: format!("argument '{}' does not match required pattern", spec.name),
                    });
                }
            }
        }
        if spec.min_value.is_some() || spec.max_value.is_some() {
            if let Some(n) = value.as_f64() {
                let below = spec.min_value.is_some_and(|min| n < min);
                let above = spec.max_value.is_some_and(|max| n > max);
                if below || above {
                    errors.push(SchemaViolation {
                        code: "VALUE_OUT_OF_RANGE",
                        message: format!("argument '{}' value {} is out of range", spec.name, value),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_2_schema_rejection() {
        let registry = SchemaRegistry::with_builtin_profile();
        let action = ActionStatement {
            verb: "deploy".to_string(),
            args: vec![Value::Int(42)],
            named_args: Default::default(),
            policy: None,
            policy_expr: None,
            priority: None,
            reason: None,
        };
        let result = SchemaValidator::validate(&action, &registry);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2); // TYPE_MISMATCH + missing `version`
        assert!(result.errors.iter().any(|e| e.code == "TYPE_MISMATCH"));
    }

    #[test]
    fn unknown_verb_passes_open_world() {
        let registry = SchemaRegistry::new();
        let action = ActionStatement {
            verb: "anything".to_string(),
            args: vec![Value::Int(1)],
            named_args: Default::default(),
            policy: None,
            policy_expr: None,
            priority: None,
            reason: None,
        };
        assert!(SchemaValidator::validate(&action, &registry).valid);
    }

    #[test]
    fn null_passes_every_constraint() {
        let mut registry = SchemaRegistry::new();
        registry.register(
            "greet",
            VerbSchema::new().with_positional(
                ArgumentSpec::new("name", ArgType::String)
                    .required()
                    .with_pattern("^[A-Z]"),
            ),
        );
        let action = ActionStatement {
            verb: "greet".to_string(),
            args: vec![Value::Null],
            named_args: Default::default(),
            policy: None,
            policy_expr: None,
            priority: None,
            reason: None,
        };
        assert!(SchemaValidator::validate(&action, &registry).valid);
    }
}
