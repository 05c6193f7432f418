//! Identity port - authentication state owned by the sign-in flow

use crate::domain::Identity;

/// Read-only view of the authentication state
pub trait IdentityProvider: Send + Sync {
    /// Currently signed-in identity, if any
    fn current(&self) -> Option<Identity>;

    fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// True while the sign-in flow is still restoring a session
    fn is_loading(&self) -> bool;
}
