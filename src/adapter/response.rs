//! The uniform result envelope every adapter operation resolves or rejects
//! with.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

// ============================================================================
// Status
// ============================================================================

/// HTTP-flavored status codes shared by local and remote adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    Created,
    Accepted,
    NoContent,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::Accepted => 202,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(Status::Ok),
            201 => Some(Status::Created),
            202 => Some(Status::Accepted),
            204 => Some(Status::NoContent),
            400 => Some(Status::BadRequest),
            401 => Some(Status::Unauthorized),
            404 => Some(Status::NotFound),
            409 => Some(Status::Conflict),
            500 => Some(Status::InternalServerError),
            501 => Some(Status::NotImplemented),
            _ => None,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::Accepted => "Accepted",
            Status::NoContent => "No Content",
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::NotFound => "Not Found",
            Status::Conflict => "Conflict",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

// ============================================================================
// AdapterResponse
// ============================================================================

/// Operation outcome: payload, optional record count, status, and optional
/// transport headers for HTTP-backed adapters. The same shape travels on the
/// success and the failure side of [`AdapterResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    pub data: Value,
    pub count: Option<usize>,
    pub status: Status,
    pub headers: BTreeMap<String, String>,
}

/// Every adapter operation resolves or rejects with the same envelope.
pub type AdapterResult = Result<AdapterResponse, AdapterResponse>;

impl AdapterResponse {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            count: None,
            status: Status::Ok,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// A 201 envelope around a freshly created record.
    pub fn created(data: Value) -> Self {
        Self::new(data).with_count(1).with_status(Status::Created)
    }

    /// A payload-free 204 envelope.
    pub fn no_content() -> Self {
        Self::new(Value::Null).with_status(Status::NoContent)
    }

    /// A payload-free 404 envelope.
    pub fn not_found() -> Self {
        Self::new(Value::Null).with_status(Status::NotFound)
    }

    /// A failure envelope carrying the error text as its payload.
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        Self::new(Value::String(message.into())).with_status(status)
    }

    pub fn is_success(&self) -> bool {
        self.status.code() < 400
    }
}

impl Default for AdapterResponse {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl fmt::Display for AdapterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.as_str() {
            Some(text) if !text.is_empty() => write!(f, "{}: {}", self.status, text),
            _ => write!(f, "{}", self.status),
        }
    }
}

impl std::error::Error for AdapterResponse {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_round_trip() {
        for status in [
            Status::Ok,
            Status::Created,
            Status::Accepted,
            Status::NoContent,
            Status::BadRequest,
            Status::Unauthorized,
            Status::NotFound,
            Status::Conflict,
            Status::InternalServerError,
            Status::NotImplemented,
        ] {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(418), None);
    }

    #[test]
    fn defaults_are_ok_with_no_count() {
        let response = AdapterResponse::new(json!({"id": "a"}));
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.count, None);
        assert!(response.is_success());
    }

    #[test]
    fn failure_display_carries_message() {
        let response = AdapterResponse::failure(Status::InternalServerError, "db exploded");
        assert!(!response.is_success());
        let msg = response.to_string();
        assert!(msg.contains("500"), "code missing: {msg}");
        assert!(msg.contains("db exploded"), "message missing: {msg}");
    }
}
