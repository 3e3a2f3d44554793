use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Fs,
    Memory,
    S3,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fs" => Ok(StorageBackend::Fs),
            "memory" => Ok(StorageBackend::Memory),
            "s3" => Ok(StorageBackend::S3),
            other => bail!("STORAGE_BACKEND must be one of fs, memory, s3 (got {other})"),
        }
    }
}

#[cfg(feature = "s3")]
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub force_path_style: bool,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Absent means in-memory repositories.
    pub database_url: Option<String>,

    pub storage_backend: StorageBackend,
    pub data_dir: PathBuf,
    pub dataset_bucket: String,
    #[cfg(feature = "s3")]
    pub s3: Option<S3Settings>,

    pub temp_upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub upload_chunk_bytes: usize,

    pub module_delay_ms: u64,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 1024 * 1024;

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = opt("READINESS_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let database_url = opt("DATABASE_URL");

        let storage_backend: StorageBackend =
            opt("STORAGE_BACKEND").unwrap_or_else(|| "fs".to_string()).parse()?;
        let data_dir = PathBuf::from(opt("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let dataset_bucket = opt("DATASET_BUCKET").unwrap_or_else(|| "datasets".to_string());

        ensure_backend_compiled(storage_backend)?;
        #[cfg(feature = "s3")]
        let s3 = s3_settings(storage_backend)?;

        let temp_upload_dir = opt("TEMP_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("readiness-uploads"));
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let upload_chunk_bytes = parse_or("UPLOAD_CHUNK_BYTES", DEFAULT_UPLOAD_CHUNK_BYTES)?;
        let module_delay_ms = parse_or("ASSESSMENT_MODULE_DELAY_MS", 0u64)?;

        // Tiny sanity checks (fail fast, fail loud)
        if let Some(url) = &database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                bail!("DATABASE_URL must be a postgres:// URL");
            }
        }
        if max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }
        if upload_chunk_bytes == 0 {
            bail!("UPLOAD_CHUNK_BYTES must be greater than zero");
        }
        if dataset_bucket.is_empty() || dataset_bucket.contains('/') {
            bail!("DATASET_BUCKET must be a plain name");
        }

        Ok(Self {
            bind_addr,
            database_url,
            storage_backend,
            data_dir,
            dataset_bucket,
            #[cfg(feature = "s3")]
            s3,
            temp_upload_dir,
            max_upload_bytes,
            upload_chunk_bytes,
            module_delay_ms,
        })
    }

    /// In-memory everything.
    #[cfg(test)]
    pub fn for_tests(temp_upload_dir: PathBuf) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: None,
            storage_backend: StorageBackend::Memory,
            data_dir: PathBuf::from("data"),
            dataset_bucket: "datasets".to_string(),
            #[cfg(feature = "s3")]
            s3: None,
            temp_upload_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_chunk_bytes: DEFAULT_UPLOAD_CHUNK_BYTES,
            module_delay_ms: 0,
        }
    }
}

fn ensure_backend_compiled(backend: StorageBackend) -> Result<()> {
    if backend == StorageBackend::S3 && !cfg!(feature = "s3") {
        bail!("STORAGE_BACKEND=s3 requires building with the `s3` feature");
    }
    Ok(())
}

#[cfg(feature = "s3")]
fn s3_settings(backend: StorageBackend) -> Result<Option<S3Settings>> {
    if backend != StorageBackend::S3 {
        return Ok(None);
    }
    let endpoint = get("S3_ENDPOINT")?;
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        bail!("S3_ENDPOINT must start with http:// or https://");
    }
    Ok(Some(S3Settings {
        endpoint,
        region: opt("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        access_key: get("S3_ACCESS_KEY")?,
        secret_key: get("S3_SECRET_KEY")?,
        force_path_style: opt("S3_FORCE_PATH_STYLE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(true),
    }))
}

fn get(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Missing required env var: {key}"))
}

fn opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match opt(key) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {v}")),
        None => Ok(default),
    }
}
