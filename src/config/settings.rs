//! Process-wide settings, read once at start and shared read-only behind `Arc`.

use crate::error::ConfigError;
use axum::http::StatusCode;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Settings {
    pub service_name: String,
    pub bind_addr: String,
    /// Status for successful responses when neither the resource nor its variant sets one.
    pub default_status: StatusCode,
    /// Page size for collections that do not set their own.
    pub default_limit: u32,
    /// Upper bound accepted for the `limit` query parameter.
    pub max_limit: u32,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            bind_addr: "0.0.0.0:3000".into(),
            default_status: StatusCode::OK,
            default_limit: 200,
            max_limit: 1000,
            body_limit: 1024 * 1024,
            log_filter: "resource_sdk=info".into(),
        }
    }
}

impl Settings {
    /// Load `.env` if present, then read `RESOURCE_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        if let Some(v) = lookup("RESOURCE_SERVICE_NAME") {
            settings.service_name = v;
        }
        if let Some(v) = lookup("RESOURCE_BIND_ADDR") {
            settings.bind_addr = v;
        }
        if let Some(v) = lookup("RESOURCE_DEFAULT_STATUS") {
            let code: u16 = parse("RESOURCE_DEFAULT_STATUS", &v)?;
            settings.default_status = StatusCode::from_u16(code)
                .map_err(|_| ConfigError::Load(format!("RESOURCE_DEFAULT_STATUS: invalid status code {}", code)))?;
        }
        if let Some(v) = lookup("RESOURCE_DEFAULT_LIMIT") {
            settings.default_limit = parse("RESOURCE_DEFAULT_LIMIT", &v)?;
        }
        if let Some(v) = lookup("RESOURCE_MAX_LIMIT") {
            settings.max_limit = parse("RESOURCE_MAX_LIMIT", &v)?;
        }
        if let Some(v) = lookup("RESOURCE_BODY_LIMIT") {
            settings.body_limit = parse("RESOURCE_BODY_LIMIT", &v)?;
        }
        if let Some(v) = lookup("RUST_LOG") {
            settings.log_filter = v;
        }
        if settings.default_limit == 0 || settings.default_limit > settings.max_limit {
            return Err(ConfigError::Load(format!(
                "default limit {} must be between 1 and max limit {}",
                settings.default_limit, settings.max_limit
            )));
        }
        Ok(settings)
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Load(format!("{}: cannot parse '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let s = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.default_status, StatusCode::OK);
        assert_eq!(s.default_limit, 200);
        assert_eq!(s.max_limit, 1000);
    }

    #[test]
    fn variables_override_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("RESOURCE_DEFAULT_LIMIT", "20"),
            ("RESOURCE_DEFAULT_STATUS", "201"),
            ("RESOURCE_BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(s.default_limit, 20);
        assert_eq!(s.default_status, StatusCode::CREATED);
        assert_eq!(s.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn unparseable_values_fail() {
        assert!(Settings::from_lookup(lookup(&[("RESOURCE_DEFAULT_LIMIT", "many")])).is_err());
        assert!(Settings::from_lookup(lookup(&[("RESOURCE_DEFAULT_LIMIT", "5000")])).is_err());
    }
}
