//! Abstract data types for headers, statements, and values.
//!
//! The statement family is a sealed sum type (`Statement`) rather than an
//! open class hierarchy: dispatch is by `match`, never by trait-object
//! polymorphism, matching the "avoid open polymorphism" guidance for tagged
//! statements.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A message header. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub version: i32,
    pub message_id: String,
    pub source: String,
    pub destination: String,
    pub timestamp: i64,
    pub correlation: Option<String>,
    pub ttl: Option<i64>,
}

impl Header {
    /// Build a header with no correlation or ttl set.
    pub fn new(
        version: i32,
        message_id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Header {
            version,
            message_id: message_id.into(),
            source: source.into(),
            destination: destination.into(),
            timestamp,
            correlation: None,
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Declared urgency of an Action statement. Ranked `Low < Normal < High < Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Priority::Low),
            "NORMAL" => Some(Priority::Normal),
            "HIGH" => Some(Priority::High),
            "CRITICAL" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// A SAG value: the payload type carried by arguments, asserted facts, and
/// knowledge statements.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// An unresolved dotted-path reference (an identifier used where a
    /// value was expected, resolved later against a `Context`).
    Path(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) | Value::Path(_) => "String",
            Value::List(_) => "List",
            Value::Object(_) => "Object",
        }
    }

    /// Convert to an equivalent `serde_json::Value`. A `Path` has no native
    /// JSON representation and is emitted as its raw identifier string — by
    /// the time a value reaches JSON (checkpoint facts, `compareWithJson`)
    /// it has always already been fully resolved or was never a path.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::Path(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert from a `serde_json::Value`. Never produces `Path` — JSON has
    /// no way to express an unresolved reference.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(raw))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) | Value::Path(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::List(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct ActionStatement {
    pub verb: String,
    pub args: Vec<Value>,
    pub named_args: IndexMap<String, Value>,
    pub policy: Option<String>,
    pub policy_expr: Option<String>,
    pub priority: Option<Priority>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryStatement {
    pub expression: String,
    pub constraint: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssertStatement {
    pub path: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControlStatement {
    pub condition: String,
    pub then_statement: Box<Statement>,
    pub else_statement: Option<Box<Statement>>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct EventStatement {
    pub event_name: String,
    pub args: Vec<Value>,
    pub named_args: IndexMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ErrorStatement {
    pub error_code: String,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FoldStatement {
    pub fold_id: String,
    pub summary: String,
    pub state: Option<IndexMap<String, Value>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecallStatement {
    pub fold_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeStatement {
    pub topic: String,
    pub filter_expr: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnsubscribeStatement {
    pub topic: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KnowledgeStatement {
    pub topic: String,
    pub value: Value,
    pub version: i64,
}

/// A single statement inside a message body. Tagged sum type — match on
/// this rather than introducing a `Statement` trait.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Action(ActionStatement),
    Query(QueryStatement),
    Assert(AssertStatement),
    Control(ControlStatement),
    Event(EventStatement),
    Error(ErrorStatement),
    Fold(FoldStatement),
    Recall(RecallStatement),
    Subscribe(SubscribeStatement),
    Unsubscribe(UnsubscribeStatement),
    Knowledge(KnowledgeStatement),
}

/// A full SAG message: one header plus an ordered body of statements.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub header: Header,
    pub statements: Vec<Statement>,
}

impl Message {
    pub fn new(header: Header, statements: Vec<Statement>) -> Self {
        Message { header, statements }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}
