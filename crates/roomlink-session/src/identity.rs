//! Identity hook: who is the local player?
//!
//! Roomlink does not log anyone in. The embedding app already knows the
//! player (from its account system, a platform SDK, or a device id) and
//! hands that over through the [`IdentityProvider`] trait once, at
//! session start.

use std::future::Future;

use roomlink_protocol::PlayerId;

use crate::SessionError;

/// The local player as seen by the room layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub player_id: PlayerId,
    pub nickname: String,
}

impl LocalIdentity {
    pub fn new(player_id: PlayerId, nickname: impl Into<String>) -> Self {
        Self {
            player_id,
            nickname: nickname.into(),
        }
    }

    /// The key used by per-identity policies (join rate limit, brute-force
    /// guard).
    pub fn policy_key(&self) -> String {
        self.player_id.to_string()
    }
}

/// Supplies the local player's identity.
///
/// # Example
///
/// ```rust
/// use roomlink_protocol::PlayerId;
/// use roomlink_session::{IdentityProvider, LocalIdentity, SessionError};
///
/// struct DeviceIdentity {
///     device_id: u64,
/// }
///
/// impl IdentityProvider for DeviceIdentity {
///     async fn identify(&self) -> Result<LocalIdentity, SessionError> {
///         Ok(LocalIdentity::new(PlayerId(self.device_id), "guest"))
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    fn identify(&self) -> impl Future<Output = Result<LocalIdentity, SessionError>> + Send;
}

/// An identity fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub LocalIdentity);

impl IdentityProvider for StaticIdentity {
    async fn identify(&self) -> Result<LocalIdentity, SessionError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_identity_returns_clone() {
        let provider = StaticIdentity(LocalIdentity::new(PlayerId(7), "ada"));
        let identity = provider.identify().await.unwrap();
        assert_eq!(identity.player_id, PlayerId(7));
        assert_eq!(identity.nickname, "ada");
        assert_eq!(identity.policy_key(), "P-7");
    }
}
