//! Service configuration.
//!
//! Resolved once in `main` and handed to the router state, so request handlers
//! never read process environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    data_dir: PathBuf,
    bind_addr: SocketAddr,
    body_limit_bytes: usize,
    chunk_size: usize,
}

impl ServiceConfig {
    pub fn new(
        data_dir: PathBuf,
        bind_addr: SocketAddr,
        body_limit_bytes: usize,
        chunk_size: usize,
    ) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Zero("chunk_size"));
        }
        if body_limit_bytes == 0 {
            return Err(ConfigError::Zero("body_limit_bytes"));
        }

        Ok(Self {
            data_dir,
            bind_addr,
            body_limit_bytes,
            chunk_size,
        })
    }

    /// Read `HL7_DATA_DIR`, `HL7_BIND_ADDR`, `HL7_BODY_LIMIT_BYTES` and
    /// `HL7_CHUNK_SIZE`, defaulting any that are unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("HL7_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let bind_addr = parse_var(&lookup, "HL7_BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
        let body_limit_bytes =
            parse_var(&lookup, "HL7_BODY_LIMIT_BYTES")?.unwrap_or(DEFAULT_BODY_LIMIT_BYTES);
        let chunk_size = parse_var(&lookup, "HL7_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);

        Self::new(data_dir, bind_addr, body_limit_bytes, chunk_size)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(None),
    }
}
