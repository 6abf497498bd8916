use std::fmt;

use crate::key::{Key, format_keys};

/// Errors surfaced by graph mutation and queries.
///
/// A failing operation never partially applies: the graph is left exactly as
/// it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A query referenced a key that was never added (as node or parent).
    #[error("key not found in graph: {0}")]
    UnknownKey(Key),

    /// `add_node` tried to redefine the parents of an existing node.
    #[error(
        "parent mismatch for {key}: existing parents [{}], requested [{}]",
        format_keys(.existing),
        format_keys(.requested)
    )]
    InconsistentParentage {
        key: Key,
        existing: Vec<Key>,
        requested: Vec<Key>,
    },

    /// An ordering query found a cycle, or a mutation would have closed one.
    #[error("graph cycle detected involving: {}", format_keys(.keys))]
    GraphCycle { keys: Vec<Key> },
}

impl GraphError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownKey(_) => ErrorCode::UnknownKey,
            Self::InconsistentParentage { .. } => ErrorCode::InconsistentParentage,
            Self::GraphCycle { .. } => ErrorCode::GraphCycle,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownKey,
    InconsistentParentage,
    GraphCycle,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UnknownKey => "E2001",
            Self::InconsistentParentage => "E2002",
            Self::GraphCycle => "E2003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::UnknownKey => "Revision not in graph",
            Self::InconsistentParentage => "Revision parents redefined",
            Self::GraphCycle => "Cycle in revision ancestry",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::UnknownKey => Some("Add the revision (or a child referencing it) before querying."),
            Self::InconsistentParentage => {
                Some("A revision's parents are immutable; re-add it with the original parents.")
            }
            Self::GraphCycle => Some("Check the parent map for a revision that descends from itself."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::UnknownKey,
            ErrorCode::InconsistentParentage,
            ErrorCode::GraphCycle,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::GraphCycle.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn errors_map_to_codes() {
        let err = GraphError::UnknownKey(Key::from("nope"));
        assert_eq!(err.code(), ErrorCode::UnknownKey);
        assert_eq!(err.to_string(), "key not found in graph: nope");

        let err = GraphError::InconsistentParentage {
            key: Key::from("rev4"),
            existing: vec![Key::from("rev3"), Key::from("rev2b")],
            requested: vec![Key::from("rev2b")],
        };
        assert_eq!(err.code(), ErrorCode::InconsistentParentage);
        assert_eq!(
            err.to_string(),
            "parent mismatch for rev4: existing parents [rev3, rev2b], requested [rev2b]"
        );

        let err = GraphError::GraphCycle {
            keys: vec![Key::from("0"), Key::from("1")],
        };
        assert_eq!(err.code().to_string(), "E2003");
    }
}
