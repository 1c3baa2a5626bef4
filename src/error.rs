//! Error taxonomy for the crate.
//!
//! `ValidationError` (parse/routing/schema/guardrail failures collected by
//! the sanitizer) is deliberately **not** a variant here: it is returned as
//! plain data inside a `ValidationResult`/`SanitizeResult`, never thrown as
//! control flow. Everything else — topology, evaluation, runtime state, and
//! checkpoint store failures — is fatal to the operation that produced it
//! and surfaces through this enum.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire-format parse failure, carrying the offending `line:column`.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        /// 1-indexed line of the failure.
        line: usize,
        /// 1-indexed column of the failure.
        column: usize,
        /// Human-readable description.
        message: String,
    },

    /// Expression evaluation failure.
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Agent tree topology failure.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Interactive grove / chat session runtime-state failure.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Checkpoint store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Construct a [`Error::Parse`] at the given position.
    pub fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Failures raised while evaluating a Boolean/arithmetic expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// `/` with a zero right-hand side.
    #[error("division by zero")]
    DivisionByZero,
    /// A relational or arithmetic operator was applied to a non-numeric operand.
    #[error("cannot apply operator '{op}' to non-numeric value {value}")]
    NonNumericOperand {
        /// The offending operator.
        op: String,
        /// Debug rendering of the operand.
        value: String,
    },
    /// A dotted path in the expression resolved to nothing and the
    /// expression required a concrete value.
    #[error("unresolved path '{0}'")]
    UnresolvedPath(String),
    /// The raw expression text itself failed to tokenize/parse.
    #[error("malformed expression: {0}")]
    Syntax(String),
}

/// Failures raised by [`crate::tree::TreeEngine`] operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    /// `add_root` called when a root already exists.
    #[error("tree already has a root node")]
    RootAlreadyExists,
    /// `add_child` referenced a parent id that isn't in the tree.
    #[error("parent node '{0}' not found")]
    UnknownParent(String),
    /// `add_child`/`add_root` reused an id already present in the tree.
    #[error("node '{0}' already exists")]
    DuplicateAgentId(String),
    /// An operation referenced an agent id that isn't in the tree.
    #[error("node '{0}' not found")]
    UnknownNode(String),
    /// `get_root` called on an empty tree.
    #[error("tree has no root node")]
    NoRoot,
}

/// Failures raised by [`crate::interactive::InteractiveGrove`] / `ChatSession`
/// state machines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    /// `step()` called before `setup()`.
    #[error("must call setup() before step()")]
    StepBeforeSetup,
    /// `step()` called after the last level already ran.
    #[error("execution already complete")]
    StepAfterComplete,
    /// `checkpoint()`/`rollback()` called with no `CheckpointManager` attached.
    #[error("no CheckpointManager configured")]
    NoCheckpointManager,
}

/// Failures raised by [`crate::checkpoint::CheckpointManager`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// `load`/`rollback` referenced an id with no checkpoint file.
    #[error("checkpoint '{0}' not found")]
    CheckpointNotFound(String),
    /// Underlying filesystem failure.
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The checkpoint JSON could not be serialized or deserialized.
    #[error("checkpoint (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
