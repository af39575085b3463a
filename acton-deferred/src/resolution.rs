//! How a resumption request is answered.

use crate::jobs::Placeholder;
use serde::{Deserialize, Serialize};

/// Answer to a resumption request.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<O> {
    /// The awaited job is not finished; show the placeholder again.
    Pending(Placeholder),
    /// A step produced output and the sequence continues on a later request.
    Advanced(O),
    /// The sequence reached its terminal result.
    Completed(O),
}

impl<O> Resolution<O> {
    /// Whether the caller should keep waiting.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Whether the sequence is complete.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The placeholder, if pending.
    #[must_use]
    pub const fn placeholder(&self) -> Option<&Placeholder> {
        match self {
            Self::Pending(placeholder) => Some(placeholder),
            Self::Advanced(_) | Self::Completed(_) => None,
        }
    }

    /// The output, if any step produced one.
    #[must_use]
    pub fn into_output(self) -> Option<O> {
        match self {
            Self::Pending(_) => None,
            Self::Advanced(output) | Self::Completed(output) => Some(output),
        }
    }

    /// Map the output.
    pub fn map<T, F: FnOnce(O) -> T>(self, f: F) -> Resolution<T> {
        match self {
            Self::Pending(placeholder) => Resolution::Pending(placeholder),
            Self::Advanced(output) => Resolution::Advanced(f(output)),
            Self::Completed(output) => Resolution::Completed(f(output)),
        }
    }
}

/// What happens to a router and its jobs once the terminal step returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPolicy {
    /// Stay on the terminal step; later requests re-run it.
    #[default]
    Retain,
    /// Restore the initial snapshot and reset every job used in the run.
    Reset,
}

impl TerminalPolicy {
    /// Whether terminal completion resets state.
    #[must_use]
    pub const fn resets(self) -> bool {
        matches!(self, Self::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_variant() {
        let advanced = Resolution::Advanced(2).map(|n| n * 10);
        assert_eq!(advanced, Resolution::Advanced(20));

        let completed: Resolution<i32> = Resolution::Completed(1);
        assert!(completed.is_completed());
        assert_eq!(completed.into_output(), Some(1));
    }

    #[test]
    fn test_terminal_policy_serde() {
        let policy: TerminalPolicy = serde_json::from_str("\"reset\"").unwrap();
        assert!(policy.resets());
        assert!(!TerminalPolicy::default().resets());
    }
}
