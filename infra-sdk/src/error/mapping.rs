//! Error mapping for backend-native failures
//!
//! Client handles are the translation boundary: drivers report whatever their
//! backend library produces and these functions turn it into an [`SdkError`]
//! of the right kind, keeping the original error as the source.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use reqwest::StatusCode;

use super::{BoxError, ErrorKind, SdkError};
use crate::clients::ServiceKind;
use crate::drivers::http::HttpStatusError;
use crate::util::{sanitize_for_logging, truncate_string};

/// Translate a failed service operation into the service's own error kind.
///
/// Errors that already belong to the taxonomy are passed through untouched.
pub fn translate(service: ServiceKind, operation: &str, err: BoxError) -> SdkError {
    match err.downcast::<SdkError>() {
        Ok(typed) => *typed,
        Err(err) => SdkError::for_service(service, format!("{} failed: {}", operation, describe(err.as_ref())))
            .with_source(err),
    }
}

/// Translate a failed connection attempt into a `Connection` error
pub fn connect_failure(service: ServiceKind, endpoint: &str, err: BoxError) -> SdkError {
    match err.downcast::<SdkError>() {
        Ok(typed) if typed.kind() == ErrorKind::Connection => *typed,
        Ok(typed) => SdkError::connection(format!(
            "{} could not connect to {}: {}",
            service,
            sanitize_for_logging(endpoint),
            typed.message()
        ))
        .with_source(*typed),
        Err(err) => SdkError::connection(format!(
            "{} could not connect to {}: {}",
            service,
            sanitize_for_logging(endpoint),
            describe(err.as_ref())
        ))
        .with_source(err),
    }
}

/// Connection attempt that did not finish within the configured timeout
pub fn connect_timeout(service: ServiceKind, endpoint: &str, timeout: Duration) -> SdkError {
    SdkError::connection(format!(
        "{} could not connect to {}: timed out after {:.1}s",
        service,
        sanitize_for_logging(endpoint),
        timeout.as_secs_f64()
    ))
}

/// Describe a backend error in one line, classifying well-known error types
pub fn describe(err: &(dyn StdError + Send + Sync + 'static)) -> String {
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return format!("{} ({})", io_err, classify_io_error(io_err.kind()));
    }

    if let Some(http_err) = err.downcast_ref::<reqwest::Error>() {
        let class = if http_err.is_timeout() {
            "timeout"
        } else if http_err.is_connect() {
            "unreachable"
        } else if http_err.is_decode() {
            "invalid response"
        } else if let Some(status) = http_err.status() {
            classify_http_status(status)
        } else {
            "transport"
        };
        return format!("{} ({})", http_err, class);
    }

    if let Some(status_err) = err.downcast_ref::<HttpStatusError>() {
        return format!(
            "HTTP {}: {} ({})",
            status_err.status.as_u16(),
            truncate_string(&status_err.body, 100),
            classify_http_status(status_err.status)
        );
    }

    err.to_string()
}

/// Helper function to classify I/O errors by category
pub fn classify_io_error(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::ConnectionRefused => "connection refused",
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => "connection dropped",
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => "not connected",
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => "timeout",
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::AddrInUse => "address unavailable",
        io::ErrorKind::NotFound => "not found",
        io::ErrorKind::PermissionDenied => "permission denied",
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => "invalid data",
        _ => "io",
    }
}

/// Helper function to classify HTTP errors by category
pub fn classify_http_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "validation",
        401 => "authentication",
        403 => "authorization",
        404 => "not_found",
        408 => "timeout",
        409 => "conflict",
        429 => "rate_limit",
        500..=599 => "server",
        _ => "unknown",
    }
}
