//! Authorization capability consumed by the core (spec §1, §6).
//!
//! Authentication/identity itself is an external collaborator - this
//! crate only consumes an `Actor` capability handed to it by the
//! orchestration layer and checks it against each operation's required
//! role.

use crate::error::AssetStoreError;

/// The authenticated identity (or lack thereof) performing an operation.
///
/// The `Anonymous` variant exists because §6's operation table explicitly
/// marks five operations "public"; no route in this crate currently
/// constructs an `Actor` from an unauthenticated HTTP request without
/// product sign-off on exposing read APIs to anonymous callers (spec §9
/// Open Question 3) - callers that do should keep that confirmation in
/// mind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    Authed,
    Admin,
}

/// The minimum role an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Public,
    Authed,
    Admin,
}

impl Actor {
    fn role(self) -> Role {
        match self {
            Actor::Anonymous => Role::Public,
            Actor::Authed => Role::Authed,
            Actor::Admin => Role::Admin,
        }
    }

    /// Checks this actor satisfies `required`, returning `Unauthorized`
    /// for anonymous callers and `Forbidden` for authed-but-insufficient
    /// ones, matching the distinction spec §7 draws between the two.
    pub fn require(self, required: Role) -> Result<(), AssetStoreError> {
        if self.role() >= required {
            return Ok(());
        }
        match self {
            Actor::Anonymous => Err(AssetStoreError::Unauthorized),
            _ => Err(AssetStoreError::Forbidden),
        }
    }
}
