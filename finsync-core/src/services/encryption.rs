//! Encryption codec - snapshot encryption for relay transport
//!
//! Keys are derived with Argon2id from a passphrase and a salt. Payloads are
//! sealed with AES-256-GCM; the wire format is `nonce(12) || ciphertext || tag(16)`.
//! A SHA-256 digest of the plaintext travels next to the ciphertext and is
//! checked after decryption.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::domain::result::{Error, Result};
use crate::domain::{Argon2Params, EncryptedPayload};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SALT_LEN: usize = 16;

/// Domain separator for per-identity salts
const IDENTITY_SALT_CONTEXT: &str = "finsync/sync-salt/v1:";

/// Symmetric key derived from a passphrase. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SyncKey([u8; KEY_LEN]);

impl SyncKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SyncKey(..)")
    }
}

/// Codec for encrypting snapshots
#[derive(Debug, Clone)]
pub struct EncryptionCodec {
    params: Argon2Params,
}

impl Default for EncryptionCodec {
    fn default() -> Self {
        Self::new(Argon2Params::default())
    }
}

impl EncryptionCodec {
    pub fn new(params: Argon2Params) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &Argon2Params {
        &self.params
    }

    /// Derive an encryption key from a passphrase using Argon2id.
    ///
    /// Deterministic: the same passphrase and salt always yield the same key,
    /// which is what lets every device of a user decrypt without exchanging
    /// secrets.
    pub fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<SyncKey> {
        if self.params.hash_len as usize != KEY_LEN {
            return Err(Error::Config(format!(
                "argon2 hash length must be {} bytes, got {}",
                KEY_LEN, self.params.hash_len
            )));
        }

        let argon2_params = argon2::Params::new(
            self.params.memory_cost,
            self.params.time_cost,
            self.params.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| Error::Config(format!("Failed to create argon2 params: {:?}", e)))?;

        let argon2 = argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2_params,
        );

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| Error::encryption(format!("Failed to derive key: {:?}", e)))?;

        let derived = SyncKey(key);
        key.zeroize();
        Ok(derived)
    }

    /// Encrypt a plaintext. Returns `nonce || ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &[u8], key: &SyncKey) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| Error::encryption(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a sealed payload.
    ///
    /// Fails with `Error::Encryption` on a wrong key, truncated input or any
    /// tampering; never returns unauthenticated bytes.
    pub fn decrypt(&self, sealed: &[u8], key: &SyncKey) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::encryption("Ciphertext too short"));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::encryption("Decryption failed: wrong key or corrupted data"))
    }

    /// Hex SHA-256 of the plaintext
    pub fn integrity_digest(plaintext: &[u8]) -> String {
        hex::encode(Sha256::digest(plaintext))
    }

    /// Encrypt and attach the integrity digest
    pub fn seal(&self, plaintext: &[u8], key: &SyncKey, version: &str) -> Result<EncryptedPayload> {
        Ok(EncryptedPayload {
            ciphertext: self.encrypt(plaintext, key)?,
            digest: Self::integrity_digest(plaintext),
            version: version.to_string(),
        })
    }

    /// Decrypt and verify the integrity digest, failing closed on mismatch.
    ///
    /// An empty digest is accepted for records written by clients that did
    /// not send one.
    pub fn open(&self, payload: &EncryptedPayload, key: &SyncKey) -> Result<Vec<u8>> {
        let plaintext = self.decrypt(&payload.ciphertext, key)?;

        if !payload.digest.is_empty() {
            let actual = Self::integrity_digest(&plaintext);
            if !actual.eq_ignore_ascii_case(&payload.digest) {
                return Err(Error::Integrity(format!(
                    "digest mismatch (expected {}, got {})",
                    payload.digest, actual
                )));
            }
        }

        Ok(plaintext)
    }

    /// Deterministic salt for a user, identical on every device
    pub fn identity_salt(user_id: &str) -> [u8; SALT_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(IDENTITY_SALT_CONTEXT.as_bytes());
        hasher.update(user_id.as_bytes());
        let digest = hasher.finalize();

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&digest[..SALT_LEN]);
        salt
    }

    /// Fresh random salt
    pub fn random_salt() -> [u8; SALT_LEN] {
        rand::thread_rng().gen()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Cheap parameters so tests don't spend seconds in Argon2
    pub(crate) fn fast_codec() -> EncryptionCodec {
        EncryptionCodec::new(Argon2Params {
            time_cost: 1,
            memory_cost: 1024,
            parallelism: 1,
            hash_len: 32,
        })
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let codec = fast_codec();
        let salt = EncryptionCodec::identity_salt("user-1");

        let k1 = codec.derive_key("correct horse", &salt).unwrap();
        let k2 = codec.derive_key("correct horse", &salt).unwrap();
        assert_eq!(k1, k2);

        let other_salt = EncryptionCodec::identity_salt("user-2");
        let k3 = codec.derive_key("correct horse", &other_salt).unwrap();
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_round_trip() {
        let codec = fast_codec();
        let key = codec
            .derive_key("pass", &EncryptionCodec::identity_salt("u"))
            .unwrap();

        for plaintext in [&b""[..], b"x", br#"{"transactions":[]}"#] {
            let sealed = codec.encrypt(plaintext, &key).unwrap();
            assert_eq!(codec.decrypt(&sealed, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_wrong_key_fails_with_encryption_error() {
        let codec = fast_codec();
        let salt = EncryptionCodec::identity_salt("u");
        let k1 = codec.derive_key("first", &salt).unwrap();
        let k2 = codec.derive_key("second", &salt).unwrap();

        let sealed = codec.encrypt(b"secret data", &k1).unwrap();
        let err = codec.decrypt(&sealed, &k2).unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }

    #[test]
    fn test_tampered_or_truncated_fails() {
        let codec = fast_codec();
        let key = SyncKey::from_bytes([7u8; KEY_LEN]);

        let mut sealed = codec.encrypt(b"secret data", &key).unwrap();
        sealed[NONCE_LEN + 1] ^= 0xFF;
        assert!(matches!(
            codec.decrypt(&sealed, &key),
            Err(Error::Encryption(_))
        ));

        assert!(codec.decrypt(&[0u8; 27], &key).is_err());
    }

    #[test]
    fn test_nonces_are_unique() {
        let codec = fast_codec();
        let key = SyncKey::from_bytes([1u8; KEY_LEN]);

        let a = codec.encrypt(b"same", &key).unwrap();
        let b = codec.encrypt(b"same", &key).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn test_open_verifies_digest() {
        let codec = fast_codec();
        let key = SyncKey::from_bytes([3u8; KEY_LEN]);

        let mut payload = codec.seal(b"payload", &key, "1.0").unwrap();
        assert_eq!(codec.open(&payload, &key).unwrap(), b"payload");

        payload.digest = EncryptionCodec::integrity_digest(b"something else");
        assert!(matches!(
            codec.open(&payload, &key),
            Err(Error::Integrity(_))
        ));

        payload.digest.clear();
        assert_eq!(codec.open(&payload, &key).unwrap(), b"payload");
    }

    #[test]
    fn test_rejects_non_256_bit_hash_len() {
        let codec = EncryptionCodec::new(Argon2Params {
            hash_len: 16,
            ..fast_codec().params().clone()
        });
        assert!(matches!(
            codec.derive_key("p", b"0123456789abcdef"),
            Err(Error::Config(_))
        ));
    }
}
