//! Connection options and native library location
//!
//! Storage options cross the boundary as JSON; every knob is optional and
//! omitted from the payload when unset, so the engine applies its own
//! defaults.

use std::path::PathBuf;

use directories::ProjectDirs;
use lancedb_native_fetch::Platform;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Full path to the engine's shared library.
pub const NATIVE_LIB_ENV: &str = "LANCEDB_NATIVE_LIB";
/// Directory containing the engine's shared library.
pub const LIB_DIR_ENV: &str = "LANCEDB_LIB_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Default S3 region, used when `storage_options.s3_config` names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_options: Option<StorageOptions>,
}

impl ConnectionOptions {
    /// Storage options as sent to the engine, with `region` folded in.
    pub fn effective_storage_options(&self) -> Option<StorageOptions> {
        let mut storage = self.storage_options.clone()?;
        if let (Some(region), Some(s3)) = (&self.region, storage.s3_config.as_mut()) {
            s3.region.get_or_insert_with(|| region.clone());
        }
        Some(storage)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_config: Option<S3Config>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_config: Option<AzureConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_config: Option<GcsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_config: Option<LocalConfig>,

    /// Block size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Retry delay in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<u64>,
    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_http: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_idle_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_max_idle_per_host: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Custom endpoint (e.g. MinIO)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_path_style: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ssl: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_side_encrypt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sse_kms_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_https: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_managed_id: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<String>,
    /// Service account JSON as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_credentials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ssl: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_dir_if_not_exists: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_memory_map: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_writes: Option<bool>,
}

/// Where to find the engine's shared library
#[derive(Debug, Clone, Default)]
pub struct NativeConfig {
    pub library: Option<PathBuf>,
    pub lib_dir: Option<PathBuf>,
}

impl NativeConfig {
    /// `LANCEDB_NATIVE_LIB`, then `LANCEDB_LIB_DIR`, then the directory
    /// provisioned at build time, then the per-user cache directory.
    pub fn from_env() -> Self {
        let library = std::env::var_os(NATIVE_LIB_ENV).map(PathBuf::from);
        let lib_dir = std::env::var_os(LIB_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| lancedb_native_sys::BUNDLED_LIB_DIR.map(PathBuf::from))
            .or_else(|| default_root().map(|root| Platform::current().lib_dir(&root)));
        Self { library, lib_dir }
    }

    pub fn library_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.library {
            return Ok(path.clone());
        }
        let platform = Platform::current();
        let file_name = platform.library_file_name().ok_or_else(|| {
            Error::InvalidArgument(format!("no native library is published for {platform}"))
        })?;
        let dir = self.lib_dir.as_ref().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "native library location unknown; set {NATIVE_LIB_ENV} or {LIB_DIR_ENV}"
            ))
        })?;
        Ok(dir.join(file_name))
    }
}

/// Per-user cache root that `fetch-binaries` provisions into by default.
pub fn default_root() -> Option<PathBuf> {
    ProjectDirs::from("com", "lancedb", "lancedb-native").map(|dirs| dirs.cache_dir().to_path_buf())
}
