use anyhow::{bail, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub max_connections: u32,
    pub busy_timeout: Duration,

    // Translations
    pub default_locale: String,

    // Listing
    pub page_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            // Database
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/translations.db".to_string()),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            busy_timeout: Duration::from_millis(parse_var("DATABASE_BUSY_TIMEOUT_MS", 5000)?),

            // Translations
            default_locale: std::env::var("DEFAULT_LOCALE").unwrap_or_else(|_| "en".to_string()),

            // Listing
            page_size: parse_var("PAGE_SIZE", 50)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Config for a given database URL with every other field defaulted
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            default_locale: "en".to_string(),
            page_size: 50,
        }
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.default_locale.trim().is_empty() {
            bail!("DEFAULT_LOCALE must not be empty");
        }
        if self.max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        Ok(())
    }
}

/// Read a numeric variable, falling back to `default` when unset
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} is not a valid number: '{}'", name, value)),
        Err(_) => Ok(default),
    }
}
