use std::path::Path;
use std::time::Duration;

use ota_hierarchy::FetchOptions;
use ota_store::{RetryPolicy, StorageError, StoreResult};
use serde::{Deserialize, Serialize};

/// Retry settings for transient backend faults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 2000,
        }
    }
}

/// Configuration for [`TableStorage`](crate::TableStorage).
///
/// Values are fixed at construction; changing them means building a new
/// storage instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Table holding every entity.
    pub table_name: String,
    /// Public-read container for package content.
    pub package_container: String,
    /// Private container for package-history blobs.
    pub history_container: String,
    /// Packages kept per deployment history.
    pub max_package_history: usize,
    /// Upper bound for every backend call and for waiting on readiness.
    pub operation_timeout_ms: u64,
    /// Concurrent lookups while resolving pointers.
    pub fetch_concurrency: usize,
    pub max_pointer_hops: u32,
    /// Base URL blob URLs are built from.
    pub blob_base_url: String,
    pub retry: RetryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_name: "storagev2".into(),
            package_container: "storagev2".into(),
            history_container: "packagehistoryv1".into(),
            max_package_history: 50,
            operation_timeout_ms: 30_000,
            fetch_concurrency: 16,
            max_pointer_hops: 4,
            blob_base_url: "memory://blobs".into(),
            retry: RetryConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| StorageError::invalid(format!("invalid storage config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StorageError::invalid(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StorageError::invalid(format!("cannot encode storage config: {e}")))
    }

    pub fn validate(&self) -> StoreResult<()> {
        let names = [
            ("table_name", &self.table_name),
            ("package_container", &self.package_container),
            ("history_container", &self.history_container),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(StorageError::invalid(format!("{field} must not be empty")));
            }
        }
        if self.package_container == self.history_container {
            return Err(StorageError::invalid(
                "package_container and history_container must differ",
            ));
        }
        if self.max_package_history == 0 {
            return Err(StorageError::invalid("max_package_history must be at least 1"));
        }
        if self.operation_timeout_ms == 0 {
            return Err(StorageError::invalid("operation_timeout_ms must be at least 1"));
        }
        if self.fetch_concurrency == 0 {
            return Err(StorageError::invalid("fetch_concurrency must be at least 1"));
        }
        if self.max_pointer_hops == 0 {
            return Err(StorageError::invalid("max_pointer_hops must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(StorageError::invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(StorageError::invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            concurrency: self.fetch_concurrency,
            max_pointer_hops: self.max_pointer_hops,
        }
    }
}
