// aegis-push/src/config.rs

use crate::package::website::{WebsitePushConfiguration, placeholder_count};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 10000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Everything the server needs, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub website: WebsitePushConfiguration,
    pub certificate_path: PathBuf,
    pub certificate_passphrase: Option<String>,
    pub iconset_dir: PathBuf,
    pub work_dir: Option<PathBuf>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let url_format_string = required("PUSH_URL_FORMAT_STRING")?;
        let count_of_expected_arguments = match optional("PUSH_URL_ARGUMENTS") {
            Some(count) => count
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("PUSH_URL_ARGUMENTS", "must be a number"))?,
            None => placeholder_count(&url_format_string),
        };

        let website = WebsitePushConfiguration {
            website_name: required("PUSH_WEBSITE_NAME")?,
            organization_name: required("PUSH_ORGANIZATION_NAME")?,
            website_push_id: required("PUSH_WEBSITE_PUSH_ID")?,
            allowed_domains: required("PUSH_ALLOWED_DOMAINS")?
                .split(',')
                .map(str::trim)
                .filter(|domain| !domain.is_empty())
                .map(String::from)
                .collect(),
            url_format_string,
            count_of_expected_arguments,
            web_service_url: required("PUSH_WEB_SERVICE_URL")?,
        };
        website.validate()?;

        let port = match optional("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("PORT", "must be a port number"))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            website,
            certificate_path: required("PUSH_CERTIFICATE_PATH")?.into(),
            certificate_passphrase: lookup("PUSH_CERTIFICATE_PASSPHRASE"),
            iconset_dir: required("PUSH_ICONSET_DIR")?.into(),
            work_dir: optional("PUSH_WORK_DIR").map(PathBuf::from),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PUSH_WEBSITE_NAME", "Example"),
            ("PUSH_ORGANIZATION_NAME", "Example Inc."),
            ("PUSH_WEBSITE_PUSH_ID", "web.com.example.test"),
            ("PUSH_ALLOWED_DOMAINS", "https://example.com, https://www.example.com"),
            ("PUSH_URL_FORMAT_STRING", "https://example.com/%@/%@"),
            ("PUSH_WEB_SERVICE_URL", "https://example.com/push"),
            ("PUSH_CERTIFICATE_PATH", "/etc/aegis/push.pem"),
            ("PUSH_ICONSET_DIR", "/etc/aegis/icon.iconset"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_are_derived() {
        let config = load(&env()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.website.count_of_expected_arguments, 2);
        assert_eq!(
            config.website.allowed_domains,
            vec!["https://example.com", "https://www.example.com"]
        );
        assert!(config.certificate_passphrase.is_none());
        assert!(config.work_dir.is_none());
    }

    #[test]
    fn missing_variable_is_named() {
        let mut vars = env();
        vars.remove("PUSH_CERTIFICATE_PATH");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PUSH_CERTIFICATE_PATH")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut vars = env();
        vars.insert("PORT", "not-a-port");
        assert!(load(&vars).is_err());

        let mut vars = env();
        vars.insert("PUSH_URL_ARGUMENTS", "3");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }
}
