// aegis-push/src/package/website.rs

use crate::config::ConfigError;
use crate::package::error::PushPackageError;
use serde::Serialize;

/// Placeholder Safari substitutes with notification `url-args`.
pub const URL_ARGUMENT_PLACEHOLDER: &str = "%@";

/// Static website metadata the push packages are issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsitePushConfiguration {
    pub website_name: String,
    pub organization_name: String,
    pub website_push_id: String,
    pub allowed_domains: Vec<String>,
    pub url_format_string: String,
    pub count_of_expected_arguments: usize,
    pub web_service_url: String,
}

impl WebsitePushConfiguration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("websiteName", &self.website_name),
            ("organizationName", &self.organization_name),
            ("urlFormatString", &self.url_format_string),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "must not be empty"));
            }
        }
        if !self.website_push_id.starts_with("web.") || self.website_push_id.len() <= 4 {
            return Err(ConfigError::invalid(
                "websitePushID",
                "must be a reverse-domain identifier starting with `web.`",
            ));
        }
        if self.allowed_domains.is_empty() {
            return Err(ConfigError::invalid("allowedDomains", "at least one origin is required"));
        }
        if !self.web_service_url.starts_with("https://") {
            return Err(ConfigError::invalid("webServiceURL", "must be an https:// URL"));
        }
        let placeholders = placeholder_count(&self.url_format_string);
        if placeholders > 0 && placeholders != self.count_of_expected_arguments {
            return Err(ConfigError::invalid(
                "urlFormatString",
                format!(
                    "has {placeholders} placeholders but {} arguments are expected",
                    self.count_of_expected_arguments
                ),
            ));
        }
        Ok(())
    }
}

pub fn placeholder_count(url_format_string: &str) -> usize {
    url_format_string.matches(URL_ARGUMENT_PLACEHOLDER).count()
}

/// The `website.json` document. Field order here is the byte order on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebsiteDescriptor {
    #[serde(rename = "websiteName")]
    pub website_name: String,
    #[serde(rename = "websitePushID")]
    pub website_push_id: String,
    #[serde(rename = "allowedDomains")]
    pub allowed_domains: Vec<String>,
    #[serde(rename = "urlFormatString")]
    pub url_format_string: String,
    #[serde(rename = "authenticationToken")]
    pub authentication_token: String,
    #[serde(rename = "webServiceURL")]
    pub web_service_url: String,
}

impl WebsiteDescriptor {
    /// The authentication token is opaque and embedded verbatim.
    pub fn build(config: &WebsitePushConfiguration, authentication_token: &str) -> Self {
        Self {
            website_name: config.website_name.clone(),
            website_push_id: config.website_push_id.clone(),
            allowed_domains: config.allowed_domains.clone(),
            url_format_string: config.url_format_string.clone(),
            authentication_token: authentication_token.to_string(),
            web_service_url: config.web_service_url.clone(),
        }
    }

    /// Canonical bytes; these are what gets hashed into the manifest.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, PushPackageError> {
        serde_json::to_vec(self).map_err(PushPackageError::DescriptorEncoding)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn example_config() -> WebsitePushConfiguration {
        WebsitePushConfiguration {
            website_name: "Example".into(),
            organization_name: "Example Inc.".into(),
            website_push_id: "web.com.example.test".into(),
            allowed_domains: vec!["https://example.com".into()],
            url_format_string: "https://example.com/%@".into(),
            count_of_expected_arguments: 1,
            web_service_url: "https://example.com/push".into(),
        }
    }

    #[test]
    fn descriptor_uses_safari_field_names() {
        let descriptor = WebsiteDescriptor::build(&example_config(), "abc123");
        let value: serde_json::Value =
            serde_json::from_slice(&descriptor.to_canonical_bytes().unwrap()).unwrap();

        assert_eq!(value["websitePushID"], "web.com.example.test");
        assert_eq!(value["allowedDomains"][0], "https://example.com");
        assert_eq!(value["urlFormatString"], "https://example.com/%@");
        assert_eq!(value["authenticationToken"], "abc123");
        assert_eq!(value["webServiceURL"], "https://example.com/push");
        assert!(value.get("organizationName").is_none());
    }

    #[test]
    fn canonical_bytes_are_stable() {
        let config = example_config();
        let first = WebsiteDescriptor::build(&config, "abc123").to_canonical_bytes().unwrap();
        let second = WebsiteDescriptor::build(&config, "abc123").to_canonical_bytes().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(br#"{"websiteName":"Example","websitePushID""#));
    }

    #[test]
    fn validate_rejects_bad_push_id_and_plain_http() {
        assert!(example_config().validate().is_ok());

        let mut config = example_config();
        config.website_push_id = "com.example".into();
        assert!(config.validate().is_err());

        let mut config = example_config();
        config.web_service_url = "http://example.com".into();
        assert!(config.validate().is_err());

        let mut config = example_config();
        config.count_of_expected_arguments = 2;
        assert!(config.validate().is_err());
    }
}
