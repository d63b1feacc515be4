//! Startup configuration
//!
//! Three JSON files are read from the config directory once at startup:
//!
//! - `tokens.json`: provider API tokens (required, non-empty)
//! - `systemIPs.json`: addresses admitted by the SYSTEM rule (required, non-empty)
//! - `keys.json`: control API keys (optional; without it the API is open)
//!
//! Each file holds a plain JSON array of strings. Anything wrong with the
//! required files is fatal.

use crate::core::credentials::CredentialPool;
use crate::core::document::SystemAllowList;
use crate::core::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TOKENS_FILE: &str = "tokens.json";
pub const SYSTEM_IPS_FILE: &str = "systemIPs.json";
pub const KEYS_FILE: &str = "keys.json";

/// Control API keys accepted in the `key` header
pub struct ApiKeys {
    keys: Vec<SecretString>,
}

impl ApiKeys {
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            keys: keys
                .into_iter()
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::from)
                .collect(),
        }
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.keys.iter().any(|key| key.expose_secret() == candidate)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys").field("count", &self.keys.len()).finish()
    }
}

/// Everything read from the config directory
pub struct StartupConfig {
    pub credentials: CredentialPool,
    pub system: SystemAllowList,
    /// `None` when `keys.json` is absent or empty
    pub api_keys: Option<ApiKeys>,
}

/// Loads the startup configuration from `dir`.
///
/// # Errors
///
/// Returns `Err` if a required file is missing, is not a JSON array of
/// strings, or is empty, or if `keys.json` exists but cannot be parsed.
pub async fn load_startup_config(dir: &Path) -> Result<StartupConfig> {
    let tokens_path = dir.join(TOKENS_FILE);
    warn_if_shared(&tokens_path).await;
    let tokens = read_string_list(&tokens_path).await?;
    let credentials = CredentialPool::new(tokens)?;

    let system_path = dir.join(SYSTEM_IPS_FILE);
    let system = SystemAllowList::new(read_string_list(&system_path).await?)?;

    let keys_path = dir.join(KEYS_FILE);
    let api_keys = if tokio::fs::try_exists(&keys_path).await? {
        warn_if_shared(&keys_path).await;
        let keys = ApiKeys::new(read_string_list(&keys_path).await?);
        (!keys.is_empty()).then_some(keys)
    } else {
        None
    };

    info!(
        tokens = credentials.len(),
        system_addresses = system.as_slice().len(),
        api_keys = api_keys.as_ref().map_or(0, ApiKeys::len),
        "Configuration loaded"
    );
    if api_keys.is_none() {
        warn!("No API keys configured, control API is unauthenticated");
    }

    Ok(StartupConfig {
        credentials,
        system,
        api_keys,
    })
}

async fn read_string_list(path: &Path) -> Result<Vec<String>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&json).map_err(|e| {
        Error::Config(format!(
            "{} must be a JSON array of strings: {e}",
            path.display()
        ))
    })
}

/// Secrets files should be readable by their owner only.
async fn warn_if_shared(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = tokio::fs::metadata(path).await
            && metadata.permissions().mode() & 0o077 != 0
        {
            warn!(
                path = %path.display(),
                mode = %format!("{:o}", metadata.permissions().mode() & 0o777),
                "Secrets file is accessible by other users, consider chmod 600"
            );
        }
    }

    #[cfg(not(unix))]
    let _ = path;
}

/// Config directory used when none is given on the command line
pub fn default_config_dir() -> PathBuf {
    PathBuf::from(".")
}
