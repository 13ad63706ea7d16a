//! Order status transition rules.

use std::str::FromStr;

use common::{OrderStatus, ParseEnumError};
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Which status changes the lifecycle accepts.
///
/// Both policies refuse to leave a terminal status:
/// ```text
///                 Permissive         ForwardOnly
/// PENDING   → *   yes                only later statuses or CANCELLED
/// SHIPPING  → PREPARING   yes        no
/// DELIVERED → *   no                 no
/// CANCELLED → *   no                 no
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionPolicy {
    /// Any move out of a non-terminal status, including backward moves.
    #[default]
    Permissive,
    /// Only moves further along the happy path, or to `CANCELLED`.
    ForwardOnly,
}

impl TransitionPolicy {
    /// Returns true if moving from `from` to `to` is allowed.
    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        if from.is_terminal() {
            return false;
        }
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::ForwardOnly => {
                match (from.happy_path_position(), to.happy_path_position()) {
                    (_, None) => true,
                    (Some(from), Some(to)) => to > from,
                    (None, Some(_)) => false,
                }
            }
        }
    }

    /// Fails with [`OrderError::IllegalStateTransition`] unless the move is
    /// allowed.
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if self.allows(from, to) {
            Ok(())
        } else {
            Err(OrderError::IllegalStateTransition { from, to })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Permissive => "permissive",
            TransitionPolicy::ForwardOnly => "forward-only",
        }
    }
}

impl std::fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransitionPolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "forward-only" | "forward_only" => Ok(TransitionPolicy::ForwardOnly),
            _ => Err(ParseEnumError {
                kind: "transition policy",
                value: s.to_string(),
            }),
        }
    }
}
