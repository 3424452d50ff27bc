//! # Credential vault
//!
//! Keeps the single API credential encrypted at rest.
//!
//! - The symmetric key ([`VaultKey`]) lives in its own file next to the config,
//!   created on first use with owner-only permissions on Unix.
//! - The credential is sealed with **XChaCha20-Poly1305** under a fresh random
//!   nonce and stored as `base64(nonce || ciphertext)` in the singleton
//!   `api_keys` row.
//! - [`CredentialVault::load`] never fails: a missing row, a key mismatch or a
//!   corrupt blob all read as "no credential configured" (with a warning in the log).
//!
//! ```no_run
//! use mdchat::database::Database;
//! use mdchat::vault::{CredentialVault, VaultKey};
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let database = Database::open("mdchat.db")?;
//! let key = VaultKey::load_or_create(std::path::Path::new("secret.key"))?;
//! let vault = CredentialVault::new(database, key);
//! vault.save("sk-example")?;
//! assert_eq!(vault.load().as_deref(), Some("sk-example"));
//! # Ok(()) }
//! ```

use std::{fmt, fs, path::Path};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use diesel::prelude::*;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{
    database::Database,
    error::{ChatError, Result},
    models::{ApiKey, SINGLETON_ID},
    schema::api_keys,
};

/// Length of the vault key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// XChaCha20 nonce length in bytes (192 bits).
const NONCE_LEN: usize = 24;

/// Symmetric key material for the vault.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey([u8; KEY_LEN]);

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

impl VaultKey {
    /// Draw a new key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Read the key file at `path`, or generate and write one if it does not exist.
    ///
    /// # Errors
    /// - [`ChatError::Configuration`] if the file exists but is not exactly [`KEY_LEN`] bytes.
    /// - [`ChatError::Io`] if the file cannot be read or created.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let bytes = fs::read(path)?;
            let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
                ChatError::Configuration(format!(
                    "key file {} holds {} bytes, expected {}",
                    path.display(),
                    bytes.len(),
                    KEY_LEN
                ))
            })?;
            debug!("Loaded vault key from {}", path.display());
            return Ok(Self(key));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let key = Self::generate();
        write_key_file(path, &key.0)?;
        info!("Created vault key at {}", path.display());
        Ok(key)
    }
}

#[cfg(unix)]
fn write_key_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_key_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // Relies on the per-user profile ACLs of the config directory.
    fs::write(path, bytes)
}

/// Encrypting store for the API credential.
pub struct CredentialVault {
    database: Database,
    key: VaultKey,
}

impl CredentialVault {
    /// Build a vault over `database` that seals credentials with `key`.
    pub fn new(database: Database, key: VaultKey) -> Self {
        Self { database, key }
    }

    /// Encrypt `secret` and overwrite the stored credential.
    pub fn save(&self, secret: &str) -> Result<()> {
        let row = ApiKey {
            id: SINGLETON_ID,
            encrypted_key: self.encrypt(secret)?,
        };

        let mut conn = self.database.connect()?;
        diesel::replace_into(api_keys::table)
            .values(&row)
            .execute(&mut conn)?;

        info!("Credential saved");
        Ok(())
    }

    /// Decrypt and return the stored credential, or `None` if there is none usable.
    pub fn load(&self) -> Option<String> {
        match self.try_load() {
            Ok(secret) => secret,
            Err(err) => {
                warn!("Ignoring stored credential: {}", err);
                None
            }
        }
    }

    /// Whether a credential row exists, decryptable or not.
    pub fn has_entry(&self) -> Result<bool> {
        Ok(self.stored_row()?.is_some())
    }

    /// Store an externally supplied credential if, and only if, the vault is empty.
    ///
    /// Empty or missing values are ignored. Returns `true` when something was written.
    pub fn seed(&self, secret: Option<&str>) -> Result<bool> {
        let Some(secret) = secret.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(false);
        };

        if self.has_entry()? {
            debug!("Vault already holds a credential, not seeding");
            return Ok(false);
        }

        self.save(secret)?;
        Ok(true)
    }

    /// Remove the stored credential.
    pub fn clear(&self) -> Result<()> {
        let mut conn = self.database.connect()?;
        diesel::delete(api_keys::table).execute(&mut conn)?;
        info!("Credential removed");
        Ok(())
    }

    fn try_load(&self) -> Result<Option<String>> {
        match self.stored_row()? {
            Some(row) => self.decrypt(&row.encrypted_key).map(Some),
            None => Ok(None),
        }
    }

    fn stored_row(&self) -> Result<Option<ApiKey>> {
        let mut conn = self.database.connect()?;
        let row = api_keys::table
            .find(SINGLETON_ID)
            .select(ApiKey::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.key.0))
    }

    fn encrypt(&self, secret: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(XNonce::from_slice(&nonce), secret.as_bytes())
            .map_err(|_| ChatError::Configuration("unable to encrypt credential".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = STANDARD
            .decode(encoded)
            .map_err(|e| ChatError::Decryption(format!("invalid encoding: {e}")))?;

        if blob.len() <= NONCE_LEN {
            return Err(ChatError::Decryption("ciphertext too short".into()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| ChatError::Decryption("key does not match stored credential".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| ChatError::Decryption("credential is not valid UTF-8".into()))
    }
}
