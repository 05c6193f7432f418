//! Key providers - where the sync passphrase comes from
//!
//! Whoever can produce the passphrase for an identity can decrypt that
//! identity's snapshots. The provider in use therefore states the security
//! property of a deployment:
//!
//! - `IdentityKeyProvider`: derived from the identity itself. Any device
//!   signed in as the same user can decrypt; the relay cannot.
//! - `PassphraseKeyProvider`: a secret the user typed. Only devices that know
//!   the passphrase can decrypt.

use serde::Serialize;
use zeroize::Zeroizing;

use crate::domain::result::Result;
use crate::domain::Identity;

/// Origin of the passphrase used for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeySource {
    /// Derived from identity fields
    Identity,
    /// Configured user passphrase
    Passphrase,
    /// Passphrase remembered from a manual unlock
    Remembered,
    /// Passphrase supplied for a single call
    Explicit,
}

/// Strategy yielding the passphrase a sync key is derived from
pub trait KeyProvider: Send + Sync {
    fn passphrase(&self, identity: &Identity) -> Result<Zeroizing<String>>;

    fn source(&self) -> KeySource;
}

/// Deterministic passphrase derived from the identity's id and email
#[derive(Debug, Clone, Default)]
pub struct IdentityKeyProvider;

impl KeyProvider for IdentityKeyProvider {
    fn passphrase(&self, identity: &Identity) -> Result<Zeroizing<String>> {
        Ok(Zeroizing::new(format!(
            "finsync:{}:{}",
            identity.id,
            identity.email.trim().to_lowercase()
        )))
    }

    fn source(&self) -> KeySource {
        KeySource::Identity
    }
}

/// User-supplied passphrase, identical for every identity
pub struct PassphraseKeyProvider {
    passphrase: Zeroizing<String>,
}

impl PassphraseKeyProvider {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl KeyProvider for PassphraseKeyProvider {
    fn passphrase(&self, _identity: &Identity) -> Result<Zeroizing<String>> {
        Ok(self.passphrase.clone())
    }

    fn source(&self) -> KeySource {
        KeySource::Passphrase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_passphrase_is_stable_across_devices() {
        let a = Identity::new("user-42", "Ana@Example.com ");
        let b = Identity::new("user-42", "ana@example.com");

        let provider = IdentityKeyProvider;
        assert_eq!(
            *provider.passphrase(&a).unwrap(),
            *provider.passphrase(&b).unwrap()
        );
    }

    #[test]
    fn test_identity_passphrase_differs_per_user() {
        let provider = IdentityKeyProvider;
        let a = provider
            .passphrase(&Identity::new("user-1", "a@example.com"))
            .unwrap();
        let b = provider
            .passphrase(&Identity::new("user-2", "a@example.com"))
            .unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_passphrase_provider_ignores_identity() {
        let provider = PassphraseKeyProvider::new("hunter2");
        let p = provider
            .passphrase(&Identity::new("anyone", "x@example.com"))
            .unwrap();
        assert_eq!(p.as_str(), "hunter2");
        assert_eq!(provider.source(), KeySource::Passphrase);
    }
}
