//! Identity of whoever invokes the order pipeline.

use common::UserId;
use serde::{Deserialize, Serialize};

/// The caller as established by the authentication module.
///
/// The pipeline never parses credentials; it only consumes the caller id
/// (absent for guests) and the operator flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Caller {
    user_id: Option<UserId>,
    is_operator: bool,
}

impl Caller {
    /// An unauthenticated caller.
    pub fn guest() -> Self {
        Self::default()
    }

    /// An authenticated customer.
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            is_operator: false,
        }
    }

    /// An authenticated operator.
    pub fn operator(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            is_operator: true,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_operator(&self) -> bool {
        self.is_operator
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Returns true if the caller owns an order placed by `owner`.
    ///
    /// Guest orders have no owner and are never owned by anyone.
    pub fn owns(&self, owner: Option<UserId>) -> bool {
        matches!((self.user_id, owner), (Some(me), Some(owner)) if me == owner)
    }

    /// Returns true if the caller may read or cancel an order placed by `owner`.
    pub fn can_manage(&self, owner: Option<UserId>) -> bool {
        self.is_operator || self.owns(owner)
    }
}
