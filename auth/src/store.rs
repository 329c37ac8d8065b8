//! Persistence for the cached Instagram credential.

use crate::{AuthError, Credential};
use keyring::Entry;
use std::sync::Mutex;

pub const KEYRING_SERVICE_NAME: &str = "InstagramPicker";
const KEYRING_ACCOUNT: &str = "credential";

/// Somewhere a credential can be cached between picker sessions.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>, AuthError>;
    fn save(&self, credential: &Credential) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Stores the credential as JSON in the system keyring.
pub struct KeyringStore {
    service: String,
    account: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            account: KEYRING_ACCOUNT.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, AuthError> {
        Entry::new(&self.service, &self.account).map_err(|e| AuthError::Keyring(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringStore {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        match self.entry()?.get_password() {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| AuthError::Store(e.to_string())),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Keyring(e.to_string())),
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let raw = serde_json::to_string(credential).map_err(|e| AuthError::Store(e.to_string()))?;
        self.entry()?
            .set_password(&raw)
            .map_err(|e| AuthError::Keyring(e.to_string()))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Keyring(e.to_string())),
        }
    }
}

/// Keeps the credential for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl TokenStore for MemoryStore {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        let slot = self.slot.lock().map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let mut slot = self.slot.lock().map_err(|e| AuthError::Store(e.to_string()))?;
        *slot = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut slot = self.slot.lock().map_err(|e| AuthError::Store(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Uses `primary` and falls back to `secondary` whenever the primary errors,
/// e.g. when no keyring daemon is running.
pub struct FallbackStore {
    primary: Box<dyn TokenStore>,
    secondary: Box<dyn TokenStore>,
}

impl FallbackStore {
    pub fn new(primary: Box<dyn TokenStore>, secondary: Box<dyn TokenStore>) -> Self {
        Self { primary, secondary }
    }
}

impl TokenStore for FallbackStore {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        match self.primary.load() {
            Ok(Some(cred)) => Ok(Some(cred)),
            Ok(None) => self.secondary.load(),
            Err(e) => {
                tracing::warn!(error = %e, "Primary token store failed, using fallback");
                self.secondary.load()
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Err(e) = self.primary.save(credential) {
            tracing::warn!(error = %e, "Primary token store failed, using fallback");
            return self.secondary.save(credential);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let primary = self.primary.clear();
        let secondary = self.secondary.clear();
        match (primary, secondary) {
            (Err(e), Err(_)) => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(feature = "file-store")]
pub use file::FileStore;

#[cfg(feature = "file-store")]
mod file {
    use super::TokenStore;
    use crate::{AuthError, Credential};
    use std::path::{Path, PathBuf};

    /// Stores the credential in a JSON file, by default `~/.instagram-picker/tokens.json`.
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn default_path() -> PathBuf {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".instagram-picker")
                .join("tokens.json")
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Default for FileStore {
        fn default() -> Self {
            Self::new(Self::default_path())
        }
    }

    impl TokenStore for FileStore {
        fn load(&self) -> Result<Option<Credential>, AuthError> {
            if !self.path.exists() {
                return Ok(None);
            }
            let data = std::fs::read_to_string(&self.path).map_err(|e| AuthError::Io(e.to_string()))?;
            serde_json::from_str(&data)
                .map(Some)
                .map_err(|e| AuthError::Store(e.to_string()))
        }

        fn save(&self, credential: &Credential) -> Result<(), AuthError> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| AuthError::Io(e.to_string()))?;
            }
            let data = serde_json::to_string_pretty(credential).map_err(|e| AuthError::Store(e.to_string()))?;
            std::fs::write(&self.path, data).map_err(|e| AuthError::Io(e.to_string()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o600);
                std::fs::set_permissions(&self.path, perms).map_err(|e| AuthError::Io(e.to_string()))?;
            }
            Ok(())
        }

        fn clear(&self) -> Result<(), AuthError> {
            match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AuthError::Io(e.to_string())),
            }
        }
    }
}
