//! User profile model
//!
//! The billing engine reads user profiles through a narrow directory
//! contract: just enough to decide whether a caller/receiver pairing is
//! payable and which tier prices the receiver.

use super::pricing::ReceiverTier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User classification for the monetization rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    /// Regular member; pays for calls to hosts
    #[default]
    Member,
    /// Host; earns from calls received from members
    Host,
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKind::Member => write!(f, "member"),
            UserKind::Host => write!(f, "host"),
        }
    }
}

impl UserKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "member" => Some(UserKind::Member),
            "host" => Some(UserKind::Host),
            _ => None,
        }
    }
}

/// Minimal user profile consumed by billing decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identifier
    pub id: i64,

    /// Member or host
    pub kind: UserKind,

    /// Tier pricing calls received by this user
    pub tier: ReceiverTier,
}

/// The platform's monetization rule
///
/// A call is billable only when a member calls a host. Any other pairing
/// (member-member, host-host, host-member) is metered for duration only,
/// with zero coin movement.
#[inline]
pub fn payable_pair(caller: &UserProfile, receiver: &UserProfile) -> bool {
    caller.kind == UserKind::Member && receiver.kind == UserKind::Host
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64, kind: UserKind) -> UserProfile {
        UserProfile {
            id,
            kind,
            tier: ReceiverTier::Standard,
        }
    }

    #[test]
    fn test_payable_pair() {
        let member = profile(1, UserKind::Member);
        let host = profile(2, UserKind::Host);

        assert!(payable_pair(&member, &host));
        assert!(!payable_pair(&host, &member));
        assert!(!payable_pair(&member, &profile(3, UserKind::Member)));
        assert!(!payable_pair(&host, &profile(4, UserKind::Host)));
    }
}
