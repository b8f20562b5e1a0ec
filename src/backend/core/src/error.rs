//! Error handling for the access engine.
//!
//! This module provides:
//! - A single [`AccessError`] type carrying a stable [`ErrorCode`]
//! - HTTP-equivalent status mapping so API layers can relay denials as 4xx
//! - User-facing vs internal messages
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! Point checks return `Ok(false)` for an ordinary denial. An `Err` is only
//! produced when the caller must relay a reason to the end user (license
//! state, secret prompts, cross-inventory moves) or when the request itself
//! is malformed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use access_core::error::{AccessError, Result};
//!
//! fn lookup(store: &dyn ResourceStore, id: ResourceId) -> Result<Resource> {
//!     store
//!         .get(ResourceType::Inventory, id)
//!         .ok_or_else(|| AccessError::bad_reference("inventory", id))
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for access decisions.
pub type Result<T> = std::result::Result<T, AccessError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by API layers for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Request Errors (1000-1099)
    ValidationError,
    MissingRequiredField,
    RecordNotFound,
    UnsupportedOperation,

    // Authorization Errors (1100-1199)
    AccessDenied,
    StateConflict,

    // License Errors (1200-1299)
    LicenseMissing,
    LicenseExpired,
    LicenseCountExceeded,
    HostLimitReached,

    // Role Graph Errors (1300-1399)
    RoleCycleDetected,
    RoleNotFound,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    UnregisteredType,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ValidationError => 1000,
            Self::MissingRequiredField => 1001,
            Self::RecordNotFound => 1002,
            Self::UnsupportedOperation => 1003,

            Self::AccessDenied => 1100,
            Self::StateConflict => 1101,

            Self::LicenseMissing => 1200,
            Self::LicenseExpired => 1201,
            Self::LicenseCountExceeded => 1202,
            Self::HostLimitReached => 1203,

            Self::RoleCycleDetected => 1300,
            Self::RoleNotFound => 1301,

            Self::ConfigurationError => 5000,
            Self::UnregisteredType => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP-equivalent status code for this error.
    pub const fn http_status(&self) -> u16 {
        match self {
            // Bad Request (400)
            Self::ValidationError
            | Self::MissingRequiredField
            | Self::RecordNotFound
            | Self::UnsupportedOperation
            | Self::RoleCycleDetected => 400,

            // Forbidden (403)
            Self::AccessDenied
            | Self::LicenseMissing
            | Self::LicenseExpired
            | Self::LicenseCountExceeded
            | Self::HostLimitReached => 403,

            // Not Found (404)
            Self::RoleNotFound => 404,

            // Conflict (409)
            Self::StateConflict => 409,

            // Internal Server Error (500)
            Self::ConfigurationError | Self::UnregisteredType | Self::InternalError => 500,
        }
    }

    /// Whether the capability aggregator may fold this error into `false`.
    ///
    /// Programmer and deployment errors are never tolerated.
    pub const fn is_capability_tolerant(&self) -> bool {
        !matches!(
            self,
            Self::UnregisteredType | Self::ConfigurationError | Self::InternalError
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "request",
            1100..=1199 => "authorization",
            1200..=1299 => "license",
            1300..=1399 => "role_graph",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad payload, ordinary denials)
    Low,
    /// Operational issues (license state, quota)
    Medium,
    /// Deployment errors (missing policy, bad configuration)
    High,
    /// Invariant violations inside the engine
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ValidationError
            | ErrorCode::MissingRequiredField
            | ErrorCode::RecordNotFound
            | ErrorCode::UnsupportedOperation
            | ErrorCode::AccessDenied
            | ErrorCode::StateConflict
            | ErrorCode::RoleNotFound => Self::Low,

            ErrorCode::LicenseMissing
            | ErrorCode::LicenseExpired
            | ErrorCode::LicenseCountExceeded
            | ErrorCode::HostLimitReached
            | ErrorCode::RoleCycleDetected => Self::Medium,

            ErrorCode::ConfigurationError | ErrorCode::UnregisteredType => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Related payload field, for validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none() && self.field.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type for the access engine.
///
/// This error type supports:
/// - Structured error codes
/// - Error chaining with a source
/// - User-facing vs internal messages
/// - Metrics integration
#[derive(Error, Debug)]
pub struct AccessError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-facing message (safe to relay to the end user)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl AccessError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a validation error (malformed payload).
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// An explicit denial whose reason must reach the end user.
    pub fn permission_denied(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::AccessDenied, message)
    }

    /// A denial that deliberately carries no reason.
    pub fn permission_denied_quietly() -> Self {
        Self::new(
            ErrorCode::AccessDenied,
            "You do not have permission to perform this action.",
        )
    }

    /// An attach/unattach relationship the resource type does not know.
    pub fn unsupported(kind: impl fmt::Display, relationship: impl Into<String>) -> Self {
        let relationship = relationship.into();
        Self::new(
            ErrorCode::UnsupportedOperation,
            format!("Relationship '{}' is not supported on {}", relationship, kind),
        )
        .with_details(ErrorDetails::new().with_field(relationship))
    }

    /// No policy is registered for a resource type.
    pub fn unregistered(kind: impl fmt::Display) -> Self {
        Self::with_internal(
            ErrorCode::UnregisteredType,
            "No access policy is available for this resource",
            format!("no policy registered for resource type {}", kind),
        )
    }

    /// A related field in the payload references something that does not exist.
    pub fn bad_reference(field: impl Into<String>, id: impl fmt::Display) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("Related object for field {} not found: {}", field, id),
        )
        .with_details(ErrorDetails::new().with_field(field))
    }

    /// A related field in the payload holds a value of the wrong shape.
    pub fn bad_related_data(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            ErrorCode::ValidationError,
            format!("Bad data found in related field {}.", field),
        )
        .with_details(ErrorDetails::new().with_field(field))
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Access engine configuration error",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    /// Whether this is an explicit denial (including license denials).
    pub fn is_denial(&self) -> bool {
        self.http_status() == 403
    }

    pub fn is_capability_tolerant(&self) -> bool {
        self.code.is_capability_tolerant()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status();

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    "Access engine error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Access request refused"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Access request rejected"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "access_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Serializable error body for API layers that relay denials.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&AccessError> for ErrorResponse {
    fn from(error: &AccessError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for AccessError {
    fn from(error: serde_json::Error) -> Self {
        AccessError::with_internal(
            ErrorCode::ValidationError,
            "Malformed document",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<std::io::Error> for AccessError {
    fn from(error: std::io::Error) -> Self {
        AccessError::configuration(error.to_string()).with_source(error)
    }
}

impl From<config::ConfigError> for AccessError {
    fn from(error: config::ConfigError) -> Self {
        AccessError::configuration(error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 400);
        assert_eq!(ErrorCode::AccessDenied.http_status(), 403);
        assert_eq!(ErrorCode::LicenseExpired.http_status(), 403);
        assert_eq!(ErrorCode::UnregisteredType.http_status(), 500);
    }

    #[test]
    fn test_capability_tolerance() {
        assert!(ErrorCode::ValidationError.is_capability_tolerant());
        assert!(ErrorCode::AccessDenied.is_capability_tolerant());
        assert!(ErrorCode::RecordNotFound.is_capability_tolerant());
        assert!(ErrorCode::UnsupportedOperation.is_capability_tolerant());
        assert!(!ErrorCode::UnregisteredType.is_capability_tolerant());
        assert!(!ErrorCode::InternalError.is_capability_tolerant());
    }

    #[test]
    fn test_error_creation() {
        let error = AccessError::permission_denied("Unable to change inventory on a host.");
        assert_eq!(error.code(), ErrorCode::AccessDenied);
        assert!(error.is_denial());
        assert_eq!(error.user_message(), "Unable to change inventory on a host.");
    }

    #[test]
    fn test_bad_related_data_names_field() {
        let error = AccessError::bad_related_data("inventory");
        assert_eq!(error.code(), ErrorCode::ValidationError);
        assert_eq!(error.details().field.as_deref(), Some("inventory"));
        assert!(error.user_message().contains("inventory"));
    }

    #[test]
    fn test_error_context() {
        let error = AccessError::validation("Invalid payload")
            .with_context("field", "organization")
            .with_context("reason", "not an integer");

        assert!(error.details().context.contains_key("field"));
        assert!(error.details().context.contains_key("reason"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AccessError::unsupported("job_template", "labels_of_labels");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("UNSUPPORTED_OPERATION"));
        assert!(json.contains("labels_of_labels"));
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::AccessDenied), ErrorSeverity::Low);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::LicenseExpired), ErrorSeverity::Medium);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::UnregisteredType), ErrorSeverity::High);
        assert_eq!(ErrorSeverity::from_code(&ErrorCode::InternalError), ErrorSeverity::Critical);
    }

    #[test]
    fn test_error_display() {
        let error = AccessError::unregistered("widget");
        let display = format!("{}", error);
        assert!(display.contains("UnregisteredType"));
        assert!(display.contains("widget"));
    }
}
