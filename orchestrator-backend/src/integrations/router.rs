//! Fee transport selection.
//!
//! Decided once at startup: REST when `use_lnd_rest` is set and the client can
//! be constructed, otherwise the CLI tools.

use log::{info, warn};
use serde_json::json;
use std::sync::Arc;

use super::cli_fees::CliFeeTransport;
use super::command::{CommandRunner, ProcessRunner};
use super::lnd_rest::LndRestClient;
use super::transport::FeeTransport;
use crate::db::Database;
use crate::models::{Level, Secrets};

pub struct ServiceRouter {
    transport: Box<dyn FeeTransport>,
    fallback_reason: Option<String>,
}

impl ServiceRouter {
    pub fn build(db: &Database, secrets: &Secrets) -> Self {
        Self::build_with_runner(db, secrets, Arc::new(ProcessRunner))
    }

    /// Same as [`ServiceRouter::build`] with an explicit process runner for the CLI transport
    pub fn build_with_runner(db: &Database, secrets: &Secrets, runner: Arc<dyn CommandRunner>) -> Self {
        let cli = || -> Box<dyn FeeTransport> {
            Box::new(CliFeeTransport::with_runner(
                secrets.bos_path(),
                secrets.lncli_path(),
                runner.clone(),
            ))
        };

        if !secrets.use_lnd_rest {
            info!("[router] Using CLI fee transport ({})", secrets.bos_path());
            return Self {
                transport: cli(),
                fallback_reason: None,
            };
        }

        match LndRestClient::new(
            secrets.lnd_rest_host.as_deref(),
            secrets.macaroon_path.as_deref(),
            secrets.tls_cert_path.as_deref(),
        ) {
            Ok(client) => Self {
                transport: Box::new(client),
                fallback_reason: None,
            },
            Err(e) => {
                let reason = e.to_string();
                warn!("[router] LND REST unavailable, falling back to CLI: {}", reason);
                if let Err(log_err) = db.log_telemetry(
                    Level::Warning,
                    "router",
                    "LND REST unavailable, using CLI fee transport",
                    Some(&json!({"error": reason, "kind": e.kind()})),
                ) {
                    warn!("[router] Failed to record fallback: {}", log_err);
                }
                Self {
                    transport: cli(),
                    fallback_reason: Some(reason),
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_transport(transport: Box<dyn FeeTransport>) -> Self {
        Self {
            transport,
            fallback_reason: None,
        }
    }

    pub fn transport(&self) -> &dyn FeeTransport {
        self.transport.as_ref()
    }

    /// Why the REST transport was not used, if it was requested and failed
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Release the transport; failures are only logged
    pub async fn close(self) {
        self.transport.close().await;
        info!("[router] {} transport closed", self.transport.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::command::CommandError;
    use async_trait::async_trait;

    struct NoopRunner;

    #[async_trait]
    impl CommandRunner for NoopRunner {
        async fn run(&self, _argv: &[String]) -> Result<String, CommandError> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_cli_when_rest_not_requested() {
        let db = Database::open(":memory:").unwrap();
        let router = ServiceRouter::build_with_runner(&db, &Secrets::default(), Arc::new(NoopRunner));
        assert_eq!(router.transport().name(), "bos");
        assert!(router.fallback_reason().is_none());
        assert!(db.recent_telemetry(10, Some("router")).unwrap().is_empty());
    }

    #[test]
    fn test_rest_failure_falls_back_with_warning() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open(":memory:").unwrap();
        let secrets = Secrets {
            use_lnd_rest: true,
            macaroon_path: Some(dir.path().join("missing.macaroon").to_string_lossy().to_string()),
            tls_cert_path: Some(dir.path().join("missing.cert").to_string_lossy().to_string()),
            ..Secrets::default()
        };

        let router = ServiceRouter::build_with_runner(&db, &secrets, Arc::new(NoopRunner));
        assert_eq!(router.transport().name(), "bos");
        assert!(router.fallback_reason().unwrap().contains("macaroon"));

        let records = db.recent_telemetry(10, Some("router")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Warning);
    }

    #[tokio::test]
    async fn test_fallback_transport_is_usable() {
        let db = Database::open(":memory:").unwrap();
        let secrets = Secrets {
            use_lnd_rest: true,
            macaroon_path: Some("/nonexistent/admin.macaroon".to_string()),
            ..Secrets::default()
        };
        let router = ServiceRouter::build_with_runner(&db, &secrets, Arc::new(NoopRunner));
        let preview = router.transport().set_fee("02ab", 10, None, true).await.unwrap();
        assert!(preview.unwrap().starts_with("[dry-run] bos fees"));
        router.close().await;
    }
}
