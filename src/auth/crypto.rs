use anyhow::{Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng as AeadRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use std::fs;
use std::path::Path;
use zeroize::Zeroize;

/// Symmetric key used to encrypt usernames at rest. Generated once into
/// `key_path` on first run (0600 permissions where the platform supports
/// it) and reused thereafter.
pub struct UsernameCipher {
    cipher: ChaCha20Poly1305,
}

impl UsernameCipher {
    pub fn load_or_create(key_path: impl AsRef<Path>) -> Result<Self> {
        let key_path = key_path.as_ref();
        let mut key_bytes = if key_path.exists() {
            let hex_str = fs::read_to_string(key_path)
                .with_context(|| format!("reading key file {}", key_path.display()))?;
            hex::decode(hex_str.trim()).context("key file did not contain valid hex")?
        } else {
            if let Some(parent) = key_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut key = vec![0u8; 32];
            AeadRng.fill_bytes(&mut key);
            fs::write(key_path, hex::encode(&key))
                .with_context(|| format!("writing key file {}", key_path.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = fs::set_permissions(key_path, fs::Permissions::from_mode(0o600));
            }
            key
        };

        let cipher = ChaCha20Poly1305::new_from_slice(&key_bytes)
            .map_err(|_| anyhow::anyhow!("key file did not contain a 32-byte key"))?;
        key_bytes.zeroize();
        Ok(UsernameCipher { cipher })
    }

    /// Encrypts `username`, returning `nonce || ciphertext` hex-encoded so it
    /// can be stored as a single text column.
    pub fn encrypt(&self, username: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, username.as_bytes())
            .map_err(|_| anyhow::anyhow!("username encryption failed"))?;
        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(hex::encode(combined))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let raw = hex::decode(stored).context("stored username ciphertext was not valid hex")?;
        if raw.len() < 12 {
            anyhow::bail!("stored username ciphertext too short");
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| anyhow::anyhow!("username decryption failed"))?;
        String::from_utf8(plaintext).context("decrypted username was not valid utf-8")
    }
}

/// Hashes a password with Argon2id, salted per record. The distilled spec's
/// SHA-256+salt is the original program's legacy behavior (documented, not
/// reproduced); this is a from-scratch store, so there is no on-disk format
/// to migrate and the memory-hard upgrade carries no compatibility cost.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hash failed: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_username_through_cipher() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = UsernameCipher::load_or_create(dir.path().join("k")).unwrap();
        let enc = cipher.encrypt("Admin_G").unwrap();
        assert_ne!(enc, "Admin_G");
        assert_eq!(cipher.decrypt(&enc).unwrap(), "Admin_G");
    }

    #[test]
    fn reloading_key_file_decrypts_previously_stored_value() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("k");
        let enc = {
            let cipher = UsernameCipher::load_or_create(&key_path).unwrap();
            cipher.encrypt("someone").unwrap()
        };
        let cipher2 = UsernameCipher::load_or_create(&key_path).unwrap();
        assert_eq!(cipher2.decrypt(&enc).unwrap(), "someone");
    }

    #[test]
    fn password_hash_verifies_correct_and_rejects_incorrect() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}
