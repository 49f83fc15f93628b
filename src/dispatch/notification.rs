// aegis-push/src/dispatch/notification.rs

use crate::dispatch::DispatchError;
use serde::Serialize;
use std::collections::HashMap;

/// Safari drops website push payloads above this size.
pub const MAX_PAYLOAD_BYTES: usize = 256;

#[derive(Serialize)]
struct Payload<'a> {
    aps: Aps<'a>,
    #[serde(rename = "url-args")]
    url_args: &'a [String],
}

#[derive(Serialize)]
struct Aps<'a> {
    alert: Alert<'a>,
}

#[derive(Serialize)]
struct Alert<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    action: &'a str,
}

fn is_blank(value: &&str) -> bool {
    value.is_empty()
}

/// A notification request from the application side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub user_id: String,
    pub arguments: Vec<String>,
    /// Empty lets macOS use its default button label.
    pub button_text: String,
}

impl Notification {
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, DispatchError> {
        let field = |name: &str| {
            params
                .get(name)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        let required = |name: &'static str| {
            let value = field(name);
            if value.is_empty() {
                Err(DispatchError::BadRequest(format!("Missing \"{name}\"")))
            } else {
                Ok(value)
            }
        };

        let title = required("title")?;
        let body = required("body")?;
        let user_id = required("user-id")?;
        let arguments = match params.get("arguments").map(String::as_str) {
            None | Some("") => Vec::new(),
            Some(raw) => raw.split(',').map(String::from).collect(),
        };

        Ok(Self {
            title,
            body,
            user_id,
            arguments,
            button_text: field("button-text"),
        })
    }

    /// JSON payload, checked against the URL argument count and size limit.
    pub fn payload(&self, expected_arguments: usize) -> Result<String, DispatchError> {
        if self.arguments.len() != expected_arguments {
            return Err(DispatchError::InvalidArguments {
                expected: expected_arguments,
                got: self.arguments.len(),
            });
        }
        let payload = Payload {
            aps: Aps {
                alert: Alert {
                    title: &self.title,
                    body: &self.body,
                    action: &self.button_text,
                },
            },
            url_args: &self.arguments,
        };
        let json = serde_json::to_string(&payload)
            .map_err(|e| DispatchError::Internal(format!("Can not encode push payload: {e}")))?;
        if json.len() > MAX_PAYLOAD_BYTES {
            return Err(DispatchError::PayloadTooLong(json.len()));
        }
        Ok(json)
    }
}
