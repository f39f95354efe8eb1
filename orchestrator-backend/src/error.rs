//! Error taxonomy shared by the store, the transports and the module adapters.
//!
//! Only `Configuration` is allowed to escape past startup. Everything else is
//! caught at the module adapter boundary and written to the telemetry log.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A hard-required dependency is missing. Fatal, raised before the loop starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection refused / timed out. Retried with backoff before surfacing.
    #[error("Transport unavailable ({service}): {message}")]
    TransientTransport { service: String, message: String },

    /// Non-2xx status, malformed payload or an API-reported partial failure.
    #[error("{service} API error{}: {message}", http_suffix(.status))]
    PermanentApi {
        service: String,
        status: Option<u16>,
        message: String,
    },

    /// The installed external program does not support an optional flag.
    #[error("{program} does not support {flag}")]
    CapabilityMismatch { program: String, flag: String },

    /// Persisted opaque data could not be decoded.
    #[error("Corrupt stored data in {location}: {message}")]
    StorageDecode { location: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A decision module failed for a reason of its own.
    #[error("{module} failed: {message}")]
    Module { module: String, message: String },
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        OrchestratorError::Configuration(message.into())
    }

    pub fn transient(service: &str, message: impl Into<String>) -> Self {
        OrchestratorError::TransientTransport {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn api(service: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        OrchestratorError::PermanentApi {
            service: service.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn module(module: &str, message: impl Into<String>) -> Self {
        OrchestratorError::Module {
            module: module.to_string(),
            message: message.into(),
        }
    }

    /// Whether the bounded retry policy applies to this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrchestratorError::TransientTransport { .. })
    }

    /// Short label used as the `kind` field of telemetry records.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Configuration(_) => "configuration",
            OrchestratorError::TransientTransport { .. } => "transient_transport",
            OrchestratorError::PermanentApi { .. } => "permanent_api",
            OrchestratorError::CapabilityMismatch { .. } => "capability_mismatch",
            OrchestratorError::StorageDecode { .. } => "storage_decode",
            OrchestratorError::Storage(_) => "storage",
            OrchestratorError::Io(_) => "io",
            OrchestratorError::Module { .. } => "module",
        }
    }

    /// Classify a reqwest failure: connect/timeout are transient, the rest permanent.
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            OrchestratorError::transient(service, err.to_string())
        } else {
            OrchestratorError::api(service, err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_transient() {
        assert!(OrchestratorError::transient("lnd", "refused").is_transient());
        assert!(!OrchestratorError::api("lnd", Some(500), "boom").is_transient());
        assert!(!OrchestratorError::config("missing").is_transient());
    }

    #[test]
    fn test_api_error_display_includes_status() {
        let err = OrchestratorError::api("lndg", Some(404), "not found");
        assert_eq!(err.to_string(), "lndg API error (HTTP 404): not found");
        let err = OrchestratorError::api("lndg", None, "bad json");
        assert_eq!(err.to_string(), "lndg API error: bad json");
    }
}
