use std::path::PathBuf;

use anyhow::Context;

/// Signing secret used when `CAPSULE_JWT_SECRET` is unset. Fine for local
/// runs; the server warns loudly when it is in effect.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// One week.
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 3600 * 24 * 7;

/// One year. Longer expirations fall back to the default.
pub const MAX_JWT_EXPIRATION_SECS: i64 = 3600 * 24 * 365;

/// Runtime configuration, built once at startup and handed to the app state.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base URL clients use to reach this server; object URLs hang off it.
    pub public_url: String,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_expiration_secs: i64,
    /// Enables account deletion, which orphans the user's capsules.
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            public_url: "http://localhost:8080".into(),
            db_path: "capsule.db".into(),
            storage_dir: "./object-storage".into(),
            jwt_secret: DEFAULT_JWT_SECRET.into(),
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            dev_mode: false,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for
    /// missing keys.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("CAPSULE_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("CAPSULE_PORT is not a valid port: {raw}"))?,
            None => defaults.port,
        };

        // Unparsable or out-of-range expirations fall back to the default.
        let jwt_expiration_secs = lookup("CAPSULE_JWT_EXP")
            .and_then(|raw| raw.parse().ok())
            .filter(|secs: &i64| (1..=MAX_JWT_EXPIRATION_SECS).contains(secs))
            .unwrap_or(defaults.jwt_expiration_secs);

        let dev_mode = lookup("CAPSULE_DEV_MODE")
            .map(|raw| matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.dev_mode);

        Ok(Self {
            host: lookup("CAPSULE_HOST").unwrap_or(defaults.host),
            port,
            public_url: lookup("CAPSULE_PUBLIC_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_url),
            db_path: lookup("CAPSULE_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            storage_dir: lookup("CAPSULE_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            jwt_secret: lookup("CAPSULE_JWT_SECRET")
                .filter(|secret| !secret.is_empty())
                .unwrap_or(defaults.jwt_secret),
            jwt_expiration_secs,
            dev_mode,
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    /// Public URL an uploaded object is served from.
    pub fn object_url(&self, object_name: &str) -> String {
        format!("{}/objects/{}", self.public_url, object_name)
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
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_expiration_secs, DEFAULT_JWT_EXPIRATION_SECS);
        assert!(config.uses_default_secret());
        assert!(!config.dev_mode);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("CAPSULE_PORT", "9000"),
            ("CAPSULE_PUBLIC_URL", "https://capsules.example.com/"),
            ("CAPSULE_JWT_SECRET", "s3cret"),
            ("CAPSULE_JWT_EXP", "60"),
            ("CAPSULE_DEV_MODE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.jwt_expiration_secs, 60);
        assert!(config.dev_mode);
        assert!(!config.uses_default_secret());
        assert_eq!(
            config.object_url("user-1/a.png"),
            "https://capsules.example.com/objects/user-1/a.png"
        );
    }

    #[test]
    fn bad_expiration_falls_back() {
        let config = Config::from_lookup(lookup_from(&[("CAPSULE_JWT_EXP", "soon")])).unwrap();
        assert_eq!(config.jwt_expiration_secs, DEFAULT_JWT_EXPIRATION_SECS);
    }

    #[test]
    fn huge_expiration_falls_back() {
        for raw in ["100000000000000000", "-5", "0"] {
            let config = Config::from_lookup(lookup_from(&[("CAPSULE_JWT_EXP", raw)])).unwrap();
            assert_eq!(config.jwt_expiration_secs, DEFAULT_JWT_EXPIRATION_SECS, "{raw}");
        }
        let max = MAX_JWT_EXPIRATION_SECS.to_string();
        let config = Config::from_lookup(lookup_from(&[("CAPSULE_JWT_EXP", max.as_str())])).unwrap();
        assert_eq!(config.jwt_expiration_secs, MAX_JWT_EXPIRATION_SECS);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(Config::from_lookup(lookup_from(&[("CAPSULE_PORT", "eighty")])).is_err());
    }
}
