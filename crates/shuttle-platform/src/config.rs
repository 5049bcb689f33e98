use anyhow::{Context, Result};

pub const DEFAULT_RESTOCK_PASSWORD: &str = "1111";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("SHUTTLE_STORE must be postgres or memory, got {other:?}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: Option<String>,
    pub http_addr: String,
    pub store_backend: StoreBackend,
    /// Used for groups that never set their own restock password.
    pub restock_default_password: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        default_http_addr: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let store_backend = match lookup("SHUTTLE_STORE") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::Postgres,
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => {
                Some(lookup("DATABASE_URL").context("DATABASE_URL is required")?)
            }
            StoreBackend::Memory => lookup("DATABASE_URL"),
        };
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());
        let restock_default_password = lookup("RESTOCK_DEFAULT_PASSWORD")
            .unwrap_or_else(|| DEFAULT_RESTOCK_PASSWORD.to_string());

        Ok(Self {
            database_url,
            http_addr,
            store_backend,
            restock_default_password,
        })
    }

    pub fn in_memory(http_addr: &str) -> Self {
        Self {
            database_url: None,
            http_addr: http_addr.to_string(),
            store_backend: StoreBackend::Memory,
            restock_default_password: DEFAULT_RESTOCK_PASSWORD.to_string(),
        }
    }
}
