//! SAG: a compact, line-oriented wire format for inter-agent messages, and
//! Grove, a bottom-up multi-agent orchestration engine built on top of it.
//!
//! The grammar/model/parser/minifier/evaluator/schema/guardrail/sanitizer
//! modules (`model`, `lexer`, `parser`, `minifier`, `expression`, `context`,
//! `schema`, `guardrail`, `sanitizer`) are synchronous and have no I/O of
//! their own. `correlation`, `fold`, `knowledge`, and `tree` layer
//! conversation threading, content-addressed summarization, versioned fact
//! storage, and topology on top. `grove` drives a tree of agents through
//! one bottom-up pass; `interactive` exposes the same propagation one step
//! at a time for a human-in-the-loop session. `checkpoint` is the only
//! async module, persisting and restoring grove state to disk.

pub mod checkpoint;
pub mod context;
pub mod correlation;
pub mod error;
pub mod expression;
pub mod fold;
pub mod grove;
pub mod guardrail;
pub mod interactive;
pub mod knowledge;
pub mod lexer;
pub mod minifier;
pub mod model;
pub mod parser;
pub mod sanitizer;
pub mod schema;
pub mod tree;

pub use error::{Error, EvaluationError, Result, StateError, StoreError, TopologyError};
pub use minifier::to_minified_string;
pub use model::{Header, Message, Priority, Statement, Value};
pub use parser::parse_message;
