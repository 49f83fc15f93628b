// aegis-push/src/dispatch/mod.rs

//! Safari web-service endpoints over plain request/response values.
//!
//! Nothing here reads ambient request state: the HTTP adapter builds a
//! [`Request`], the [`Dispatcher`] returns a [`Response`].

pub mod notification;
pub mod registry;
pub mod routes;

use crate::package::token::{MAX_USER_ID_BYTES, encode_user_id};
use crate::package::{PushPackageError, PushPackageService};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use notification::Notification;
use registry::{DeviceRegistry, RegistryError};
use routes::Route;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden Invalid Parameter websitePushId")]
    PushIdMismatch,

    #[error("Not Found: {0}")]
    UnknownAction(String),

    #[error("Not Found: no device registered for the given user")]
    DeviceNotFound,

    #[error("Bad Request: invalid number of arguments, expected {expected}, got {got}")]
    InvalidArguments { expected: usize, got: usize },

    #[error("Bad Request: push notification payload of {0} bytes exceeds 256 bytes")]
    PayloadTooLong(usize),

    #[error(transparent)]
    Package(#[from] PushPackageError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidArguments { .. } | Self::PayloadTooLong(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PushIdMismatch => StatusCode::FORBIDDEN,
            Self::UnknownAction(_) | Self::DeviceNotFound => StatusCode::NOT_FOUND,
            Self::Package(_) | Self::Registry(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed.");
            // Pipeline and storage details stay in the log.
            return Response::text(status, "Internal Server Error");
        }
        warn!(error = %self, %status, "Request rejected.");
        Response::text(status, self.to_string())
    }
}

/// An inbound request, detached from any HTTP framework.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            content_type: None,
            authorization: None,
            body: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_json(mut self, body: &serde_json::Value) -> Self {
        self.content_type = Some("application/json".into());
        self.body = body.to_string().into_bytes();
        self
    }

    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.content_type = Some("application/x-www-form-urlencoded".into());
        self.body = form.into().into_bytes();
        self
    }

    /// Query parameters overlaid with url-encoded form fields.
    fn params(&self) -> HashMap<String, String> {
        let mut params: HashMap<String, String> = self
            .query
            .as_deref()
            .map(|query| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let is_form = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        if is_form {
            params.extend(url::form_urlencoded::parse(&self.body).into_owned());
        }
        params
    }

    fn json_body(&self) -> Option<serde_json::Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::empty(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response.body = body.into().into_bytes();
        response
    }

    pub fn zip(bytes: Vec<u8>) -> Self {
        let mut response = Self::empty(StatusCode::OK);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        response.body = bytes;
        response.expired()
    }

    /// Marks the response as never cacheable.
    fn expired(mut self) -> Self {
        self.headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, must-revalidate"),
        );
        self.headers
            .insert(EXPIRES, HeaderValue::from_static("Thu, 01 Jan 1970 00:00:01 GMT"));
        self
    }
}

/// Routes Safari's web-service calls and the application's push endpoint.
pub struct Dispatcher {
    service: Arc<PushPackageService>,
    registry: Arc<dyn DeviceRegistry>,
}

impl Dispatcher {
    pub fn new(service: Arc<PushPackageService>, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { service, registry }
    }

    pub fn is_apple_action(&self, path: &str) -> bool {
        routes::is_apple_action(path)
    }

    #[instrument(skip_all, fields(method = %request.method, path = %request.path))]
    pub fn handle(&self, request: &Request) -> Response {
        self.route(request)
            .unwrap_or_else(DispatchError::into_response)
    }

    fn route(&self, request: &Request) -> Result<Response, DispatchError> {
        match Route::parse(&request.path) {
            Some(Route::PushPackages {
                website_push_id, ..
            }) => self.push_packages(request, &website_push_id),
            Some(Route::Registration {
                device_token,
                website_push_id,
                ..
            }) => self.registration(request, &device_token, &website_push_id),
            Some(Route::Log { .. }) => self.log(request),
            None if is_push_endpoint(&request.path) => self.push_notification(request),
            None => Err(DispatchError::UnknownAction(request.path.clone())),
        }
    }

    fn check_push_id(&self, website_push_id: &str) -> Result<(), DispatchError> {
        if website_push_id == self.service.website_push_id() {
            Ok(())
        } else {
            Err(DispatchError::PushIdMismatch)
        }
    }

    fn push_packages(
        &self,
        request: &Request,
        website_push_id: &str,
    ) -> Result<Response, DispatchError> {
        if request.method != Method::POST {
            return Err(DispatchError::BadRequest("push packages must be POSTed".into()));
        }
        self.check_push_id(website_push_id)?;
        let body = request
            .json_body()
            .ok_or_else(|| DispatchError::BadRequest("Missing Parameters".into()))?;
        let user_id = match body.get("userId") {
            Some(serde_json::Value::String(user_id)) => user_id.trim().to_string(),
            Some(serde_json::Value::Number(user_id)) => user_id.to_string(),
            _ => String::new(),
        };
        if user_id.is_empty() {
            return Err(DispatchError::BadRequest("Missing Parameter userId".into()));
        }

        let token = encode_user_id(&user_id).ok_or_else(|| {
            DispatchError::BadRequest(format!("userId is longer than {MAX_USER_ID_BYTES} bytes"))
        })?;

        let archive = self.service.create_push_package(&token)?;
        let bytes = archive
            .read()
            .map_err(|e| DispatchError::Internal(format!("Can not read zip package: {e}")))?;
        // Dropping the archive deletes it from disk.
        drop(archive);
        info!(bytes = bytes.len(), "Serving push package.");
        Ok(Response::zip(bytes))
    }

    fn registration(
        &self,
        request: &Request,
        device_token: &str,
        website_push_id: &str,
    ) -> Result<Response, DispatchError> {
        let user_id = self
            .service
            .parse_user_id(request.authorization.as_deref().unwrap_or_default());
        if user_id.is_empty() {
            return Err(DispatchError::Unauthorized);
        }
        self.check_push_id(website_push_id)?;
        match request.method {
            Method::POST => self.registry.add_device(&user_id, device_token)?,
            Method::DELETE => self.registry.delete_device(&user_id, device_token)?,
            _ => {
                return Err(DispatchError::BadRequest(
                    "registrations accept POST or DELETE".into(),
                ));
            }
        }
        Ok(Response::empty(StatusCode::OK))
    }

    fn log(&self, request: &Request) -> Result<Response, DispatchError> {
        let body = request
            .json_body()
            .ok_or_else(|| DispatchError::BadRequest("Missing Content".into()))?;
        let entries = match body.get("logs").or_else(|| body.get("log")) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>(),
            Some(serde_json::Value::String(text)) => vec![text.clone()],
            _ => return Err(DispatchError::BadRequest("Missing log".into())),
        };
        self.registry.process_error_log(&entries)?;
        Ok(Response::empty(StatusCode::OK).expired())
    }

    fn push_notification(&self, request: &Request) -> Result<Response, DispatchError> {
        let notification = Notification::from_params(&request.params())?;
        let payload = notification.payload(self.service.count_of_expected_arguments())?;
        let device_token = self
            .registry
            .device_token(&notification.user_id)?
            .filter(|token| !token.is_empty())
            .ok_or(DispatchError::DeviceNotFound)?;
        self.registry
            .send_push_notification(&payload, &device_token.replace(' ', ""))?;
        Ok(Response::empty(StatusCode::OK).expired())
    }
}

fn is_push_endpoint(path: &str) -> bool {
    path.trim_end_matches('/').rsplit('/').next() == Some("push")
}
