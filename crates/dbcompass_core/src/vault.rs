use crate::{DbError, EncryptedSecret};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Passphrase the process-wide key is derived from. The threat model is
/// "no plaintext passwords on disk", not multi-tenant isolation, so a
/// fixed passphrase hashed once is sufficient.
const VAULT_PASSPHRASE: &str = "dbcompass-credential-vault";

const NONCE_LEN: usize = 12;

static VAULT_KEY: OnceLock<[u8; 32]> = OnceLock::new();

fn vault_key() -> &'static [u8; 32] {
    VAULT_KEY.get_or_init(|| {
        let mut hasher = Sha256::new();
        hasher.update(VAULT_PASSPHRASE.as_bytes());
        hasher.finalize().into()
    })
}

/// Encrypts and decrypts stored connection passwords with AES-256-GCM.
///
/// Every call to [`CredentialVault::encrypt`] draws a fresh random nonce,
/// so encrypting the same plaintext twice yields different ciphertexts;
/// both decrypt back to the original.
pub struct CredentialVault;

impl CredentialVault {
    pub fn encrypt(plaintext: &str) -> Result<EncryptedSecret, DbError> {
        let key = *vault_key();
        let cipher = Aes256Gcm::new(&key.into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| DbError::decryption_failed(format!("encryption failed: {e}")))?;

        Ok(EncryptedSecret {
            iv: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        })
    }

    /// Fails with [`DbError::DecryptionFailed`] on malformed hex, a wrong
    /// nonce length, or an authentication failure. Callers treat that as
    /// "password unavailable" rather than aborting whatever they were doing.
    pub fn decrypt(secret: &EncryptedSecret) -> Result<String, DbError> {
        let nonce_bytes = hex::decode(&secret.iv)
            .map_err(|e| DbError::decryption_failed(format!("malformed iv: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(DbError::decryption_failed(format!(
                "iv must be {NONCE_LEN} bytes, got {}",
                nonce_bytes.len()
            )));
        }

        let ciphertext = hex::decode(&secret.ciphertext)
            .map_err(|e| DbError::decryption_failed(format!("malformed ciphertext: {e}")))?;

        let key = *vault_key();
        let cipher = Aes256Gcm::new(&key.into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| DbError::decryption_failed("ciphertext authentication failed"))?;

        String::from_utf8(plaintext)
            .map_err(|e| DbError::decryption_failed(format!("invalid UTF-8 in plaintext: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plaintext() {
        let secret = CredentialVault::encrypt("secret123").unwrap();
        assert_eq!(CredentialVault::decrypt(&secret).unwrap(), "secret123");
    }

    #[test]
    fn same_plaintext_yields_different_ciphertexts() {
        let a = CredentialVault::encrypt("secret123").unwrap();
        let b = CredentialVault::encrypt("secret123").unwrap();

        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
        assert_eq!(CredentialVault::decrypt(&a).unwrap(), "secret123");
        assert_eq!(CredentialVault::decrypt(&b).unwrap(), "secret123");
    }

    #[test]
    fn ciphertext_never_contains_plaintext() {
        let secret = CredentialVault::encrypt("secret123").unwrap();
        assert!(!secret.ciphertext.contains("secret123"));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let mut secret = CredentialVault::encrypt("secret123").unwrap();
        let mut bytes = hex::decode(&secret.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        secret.ciphertext = hex::encode(bytes);

        assert!(matches!(
            CredentialVault::decrypt(&secret),
            Err(DbError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn malformed_hex_fails() {
        let secret = EncryptedSecret {
            iv: "not hex".to_string(),
            ciphertext: "zz".to_string(),
        };

        assert!(matches!(
            CredentialVault::decrypt(&secret),
            Err(DbError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn wrong_iv_length_fails() {
        let mut secret = CredentialVault::encrypt("p").unwrap();
        secret.iv = "aabb".to_string();

        assert!(matches!(
            CredentialVault::decrypt(&secret),
            Err(DbError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn empty_password_round_trips() {
        let secret = CredentialVault::encrypt("").unwrap();
        assert_eq!(CredentialVault::decrypt(&secret).unwrap(), "");
    }
}
