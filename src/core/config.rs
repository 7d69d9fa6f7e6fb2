use std::env;
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    DynamoDb,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackendKind,
    pub table_prefix: String,
    pub cache_ttl: Duration,
    pub dynamodb_endpoint_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_backend = match lookup("STORAGE_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("" | "dynamodb") => StorageBackendKind::DynamoDb,
            Some("memory") => StorageBackendKind::Memory,
            Some(other) => {
                return Err(format!(
                    "STORAGE_BACKEND: unsupported value '{}' (expected 'dynamodb' or 'memory')",
                    other
                ));
            }
        };

        let cache_ttl_secs = match lookup("CONFIG_CACHE_TTL_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("CONFIG_CACHE_TTL_SECS: {}", e))?,
            None => DEFAULT_CACHE_TTL_SECS,
        };

        Ok(Self {
            storage_backend,
            table_prefix: lookup("TABLE_PREFIX").unwrap_or_default(),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            dynamodb_endpoint_url: lookup("DYNAMODB_ENDPOINT_URL").filter(|v| !v.is_empty()),
        })
    }
}
