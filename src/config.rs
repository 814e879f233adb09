use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid value for {key}: {reason}")]
pub(crate) struct ConfigError {
    key: &'static str,
    reason: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub pool_size: u32,
    pub seed_ingredients: bool,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            database_url: load(&lookup, "DATABASE_URL", "app.db".to_string())?,
            host: load(&lookup, "HOST", "127.0.0.1".to_string())?,
            port: load(&lookup, "PORT", 8080)?,
            pool_size: load(&lookup, "DB_POOL_SIZE", 8)?,
            seed_ingredients: load(&lookup, "SEED_INGREDIENTS", true)?,
        };
        if config.pool_size == 0 {
            return Err(ConfigError {
                key: "DB_POOL_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(config)
    }
}

fn load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            reason: e.to_string(),
        }),
        None => {
            log::debug!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, "app.db");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.pool_size, 8);
        assert!(config.seed_ingredients);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "/tmp/recipes.db"),
            ("PORT", "9000"),
            ("SEED_INGREDIENTS", "false"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "/tmp/recipes.db");
        assert_eq!(config.port, 9000);
        assert!(!config.seed_ingredients);
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert!(Config::from_lookup(lookup_from(&[("DB_POOL_SIZE", "0")])).is_err());
    }
}
