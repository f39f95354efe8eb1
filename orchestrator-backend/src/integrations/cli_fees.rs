//! Command-line fee transport: `bos` for writes, `lncli` for channel listing.

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::command::{split_command, CommandError, CommandRunner};
use super::transport::{ChannelInfo, FeeTransport};
use crate::config::defaults;
use crate::error::{OrchestratorError, Result};

const INBOUND_FLAG: &str = "--set-inbound-rate-discount";

pub struct CliFeeTransport {
    bos: Vec<String>,
    lncli: Vec<String>,
    runner: Arc<dyn CommandRunner>,
    /// Cleared once `bos` rejects the inbound-discount flag
    inbound_supported: AtomicBool,
}

impl CliFeeTransport {
    pub fn with_runner(bos_path: &str, lncli_path: &str, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            bos: split_command(bos_path, defaults::BOS_PATH),
            lncli: split_command(lncli_path, defaults::LNCLI_PATH),
            runner,
            inbound_supported: AtomicBool::new(true),
        }
    }

    fn bos_args(&self, pubkey: &str, ppm: i64, inbound_discount_ppm: Option<i64>) -> Vec<String> {
        let mut args = self.bos.clone();
        args.extend([
            "fees".to_string(),
            "--to".to_string(),
            pubkey.to_string(),
            "--set-fee-rate".to_string(),
            ppm.max(0).to_string(),
        ]);
        if let Some(discount) = inbound_discount_ppm {
            args.push(INBOUND_FLAG.to_string());
            args.push(discount.to_string());
        }
        args
    }

    fn lncli_args(&self, with_format: bool) -> Vec<String> {
        let mut args = self.lncli.clone();
        args.push("listchannels".to_string());
        if with_format && !args.iter().any(|a| a == "--format") {
            args.push("--format".to_string());
            args.push("json".to_string());
        }
        args
    }
}

#[async_trait]
impl FeeTransport for CliFeeTransport {
    fn name(&self) -> &'static str {
        "bos"
    }

    async fn set_fee(
        &self,
        pubkey: &str,
        ppm: i64,
        inbound_discount_ppm: Option<i64>,
        dry_run: bool,
    ) -> Result<Option<String>> {
        let discount = inbound_discount_ppm.filter(|_| self.inbound_supported.load(Ordering::Relaxed));
        let args = self.bos_args(pubkey, ppm, discount);

        if dry_run {
            return Ok(Some(format!("[dry-run] {}", args.join(" "))));
        }

        let output = match self.runner.run(&args).await {
            Err(CommandError::UnsupportedFlag { detail, .. }) if discount.is_some() => {
                warn!("[bos] inbound discount not supported ({}), retrying without it", detail);
                self.inbound_supported.store(false, Ordering::Relaxed);
                self.runner.run(&self.bos_args(pubkey, ppm, None)).await?
            }
            other => other?,
        };
        Ok(Some(output).filter(|o| !o.is_empty()))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let output = match self.runner.run(&self.lncli_args(true)).await {
            Err(CommandError::UnsupportedFlag { .. }) => self.runner.run(&self.lncli_args(false)).await?,
            other => other?,
        };
        if output.is_empty() {
            return Err(OrchestratorError::api("lncli", None, "empty output for listchannels"));
        }
        let value: Value = serde_json::from_str(&output)
            .map_err(|e| OrchestratorError::api("lncli", None, format!("invalid JSON: {}", e)))?;
        Ok(ChannelInfo::list_from_lnd_json(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every argv; rejects any argv containing `reject` as an unknown flag.
    struct StubRunner {
        calls: Mutex<Vec<Vec<String>>>,
        reject: Option<&'static str>,
        stdout: String,
    }

    impl StubRunner {
        fn new(reject: Option<&'static str>, stdout: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reject,
                stdout: stdout.to_string(),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, argv: &[String]) -> std::result::Result<String, CommandError> {
            self.calls.lock().push(argv.to_vec());
            if let Some(flag) = self.reject {
                if argv.iter().any(|a| a == flag) {
                    return Err(CommandError::UnsupportedFlag {
                        program: argv[0].clone(),
                        detail: format!("flag provided but not defined: {}", flag),
                    });
                }
            }
            Ok(self.stdout.clone())
        }
    }

    #[tokio::test]
    async fn test_dry_run_runs_nothing() {
        let runner = StubRunner::new(None, "");
        let transport = CliFeeTransport::with_runner("bos", "lncli", runner.clone());
        let preview = transport.set_fee("02ab", 250, Some(30), true).await.unwrap().unwrap();
        assert_eq!(preview, "[dry-run] bos fees --to 02ab --set-fee-rate 250 --set-inbound-rate-discount 30");
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_inbound_flag_retries_once_without_it() {
        let runner = StubRunner::new(Some(INBOUND_FLAG), "ok");
        let transport = CliFeeTransport::with_runner("bos", "lncli", runner.clone());

        let out = transport.set_fee("02ab", 100, Some(10), false).await.unwrap();
        assert_eq!(out.as_deref(), Some("ok"));
        {
            let calls = runner.calls.lock();
            assert_eq!(calls.len(), 2);
            assert!(calls[0].iter().any(|a| a == INBOUND_FLAG));
            assert!(!calls[1].iter().any(|a| a == INBOUND_FLAG));
        }

        // remembered for the next update
        transport.set_fee("02ab", 101, Some(10), false).await.unwrap();
        assert_eq!(runner.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        struct Failing;
        #[async_trait]
        impl CommandRunner for Failing {
            async fn run(&self, argv: &[String]) -> std::result::Result<String, CommandError> {
                Err(CommandError::Failed {
                    program: argv[0].clone(),
                    code: Some(1),
                    stderr: "boom".to_string(),
                })
            }
        }
        let transport = CliFeeTransport::with_runner("bos", "lncli", Arc::new(Failing));
        let err = transport.set_fee("02ab", 100, Some(5), false).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_listchannels_falls_back_without_format() {
        let listing = r#"{"channels": [{"chan_id": "5", "channel_point": "ff:0", "remote_pubkey": "02cd", "capacity": "100", "local_balance": "40", "remote_balance": "60", "active": true}]}"#;
        let runner = StubRunner::new(Some("--format"), listing);
        let transport = CliFeeTransport::with_runner("docker exec lnd lncli", "docker exec lnd lncli", runner.clone());

        let channels = transport.list_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].remote_pubkey, "02cd");

        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec!["docker", "exec", "lnd", "lncli", "listchannels"]);
    }
}
