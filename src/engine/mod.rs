//! Session & sandbox orchestration engine.
//!
//! Drives the stateless `clarinet` CLI as if it were an interactive session:
//!
//! - [`workspace`] materializes a throwaway Clarinet project per operation
//! - [`invoker`] runs the binary against that project and captures its output
//! - [`interpret`] turns the unstructured text into a typed result
//! - [`session`] holds the active contract and REPL history per session
//! - [`orchestrator`] sequences the above for the HTTP gateway

pub mod interpret;
pub mod invoker;
pub mod orchestrator;
pub mod session;
pub mod workspace;

pub use interpret::{CheckOutcome, EvalOutcome, StateEntry};
pub use invoker::{CommandOutput, Invocation, InvokeError, ProcessRunner, ToolRunner};
pub use orchestrator::{Orchestrator, StateSnapshot, TerminalOutcome};
pub use session::{Session, SessionHandle, SessionRegistry};
pub use workspace::{Workspace, WorkspaceError};

use serde::{Deserialize, Serialize};

/// Name the CLI is invoked by; terminal commands must start with it.
pub const TOOL_NAME: &str = "clarinet";

/// Source file extension stripped from contract names.
pub const CONTRACT_EXTENSION: &str = ".clar";

/// A Clarity contract as supplied by the IDE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,
    pub code: String,
}

impl Contract {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Project-internal identifier: the name without its `.clar` suffix.
    pub fn sanitized_name(&self) -> &str {
        self.name
            .strip_suffix(CONTRACT_EXTENSION)
            .unwrap_or(&self.name)
    }

    /// Validate the sanitized name and return it.
    ///
    /// Clarity contract identifiers start with a letter and contain only
    /// ASCII letters, digits, `-` and `_`. Anything else is refused before
    /// it can be used as a file path inside a workspace.
    pub fn validated_name(&self) -> Result<&str, EngineError> {
        let name = self.sanitized_name();
        let mut chars = name.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if starts_with_letter && rest_ok {
            Ok(name)
        } else {
            Err(EngineError::InvalidInput(format!(
                "invalid contract name '{}'",
                self.name
            )))
        }
    }
}

/// Faults raised by the engine. Tool-reported failures are not errors; they
/// come back as ordinary outcomes with `success == false`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Invocation(#[from] InvokeError),

    #[error("{0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_name_strips_extension() {
        assert_eq!(Contract::new("counter.clar", "").sanitized_name(), "counter");
        assert_eq!(Contract::new("counter", "").sanitized_name(), "counter");
        assert_eq!(
            Contract::new("counter.clar.clar", "").sanitized_name(),
            "counter.clar"
        );
    }

    #[test]
    fn validated_name_accepts_clarity_identifiers() {
        assert_eq!(
            Contract::new("my-token_v2.clar", "").validated_name().unwrap(),
            "my-token_v2"
        );
    }

    #[test]
    fn validated_name_rejects_paths_and_empty() {
        for bad in ["", ".clar", "../evil", "a/b", "1abc", "with space", "x.y"] {
            assert!(
                Contract::new(bad, "").validated_name().is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }
}
