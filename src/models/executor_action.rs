//! Executor action definitions
//!
//! The generic executor template runs the same binary for both directions; the
//! action selects whether the release payload is applied or torn down.

use std::fmt;
use std::str::FromStr;

/// What the single-release executor does with its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutorAction {
    /// Create (or update) the release and wait for it to become ready
    #[default]
    Install,
    /// Delete the release and wait for it to disappear
    Delete,
}

impl ExecutorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorAction::Install => "install",
            ExecutorAction::Delete => "delete",
        }
    }

    pub fn all() -> &'static [Self] {
        &[ExecutorAction::Install, ExecutorAction::Delete]
    }
}

impl fmt::Display for ExecutorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ExecutorAction> for String {
    fn from(action: ExecutorAction) -> Self {
        action.as_str().to_string()
    }
}

impl FromStr for ExecutorAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "install" | "apply" => Ok(ExecutorAction::Install),
            "delete" | "uninstall" => Ok(ExecutorAction::Delete),
            _ => Err(format!("Unknown executor action: {}", s)),
        }
    }
}
