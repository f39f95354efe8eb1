//! Auto-rebalance trigger driven through the LNDg dashboard.
//!
//! Depleted channels are marked as rebalance targets, full or forced ones as
//! sources. LNDg's own rebalancer does the actual moving.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};

use super::{DecisionModule, ParamSpec, Report, RunContext, Wants};
use crate::error::{OrchestratorError, Result};
use crate::identifiers::IdentifierKind;
use crate::integrations::lndg::{LndgChannel, LndgClient};

const PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "out_target_low", default: 0.15 },
    ParamSpec { name: "source_ratio", default: 0.65 },
    ParamSpec { name: "target_out_pct", default: 20.0 },
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Target,
    Source,
}

fn role_for(channel: &LndgChannel, forced: bool, out_target_low: f64, source_ratio: f64) -> Option<Role> {
    let ratio = channel.outbound_ratio();
    if forced || ratio > source_ratio {
        Some(Role::Source)
    } else if ratio < out_target_low {
        Some(Role::Target)
    } else {
        None
    }
}

/// Fields to send, or `None` when the dashboard already agrees
fn pending_update(channel: &LndgChannel, role: Role, target_out_pct: i64) -> Option<Value> {
    match role {
        Role::Target if !channel.auto_rebalance || channel.ar_out_target != target_out_pct => {
            Some(json!({"auto_rebalance": true, "ar_out_target": target_out_pct}))
        }
        Role::Source if channel.auto_rebalance => Some(json!({"auto_rebalance": false})),
        _ => None,
    }
}

fn label(channel: &LndgChannel) -> String {
    match channel.alias.as_deref().filter(|a| !a.is_empty()) {
        Some(alias) => format!("{} ({})", channel.chan_id, alias),
        None => channel.chan_id.clone(),
    }
}

pub struct AutoRebalance;

#[async_trait]
impl DecisionModule for AutoRebalance {
    fn name(&self) -> &'static str {
        "ar"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn wants(&self) -> Wants {
        Wants {
            exclusions: Some(IdentifierKind::ChannelId),
            forced_sources: Some(IdentifierKind::ChannelId),
        }
    }

    async fn run(&self, ctx: &RunContext<'_>) -> Result<Report> {
        let secrets = ctx.store.get_secrets()?;
        let mut report = Report::default();

        let Some(url) = secrets.lndg_url() else {
            if ctx.dry_run {
                warn!("[ar] lndg_url not configured, skipping");
                report.line("ar: lndg_url not configured, nothing to simulate");
                return Ok(report);
            }
            return Err(OrchestratorError::config("lndg_url is required by the ar module"));
        };
        let client = LndgClient::new(url, secrets.lndg_user.as_deref(), secrets.lndg_pass.as_deref());

        let out_target_low = ctx.param("out_target_low");
        let source_ratio = ctx.param("source_ratio");
        let target_out_pct = ctx.param("target_out_pct").round() as i64;

        let channels = client.list_channels().await?;
        let (mut targets, mut sources, mut skipped) = (0, 0, 0);
        let mut last_error = None;

        for channel in channels.iter().filter(|c| c.is_open && c.is_active) {
            if ctx.is_excluded(&channel.chan_id) {
                skipped += 1;
                continue;
            }
            let forced = ctx.is_forced_source(&channel.chan_id);
            let Some(role) = role_for(channel, forced, out_target_low, source_ratio) else {
                continue;
            };
            match role {
                Role::Target => targets += 1,
                Role::Source => sources += 1,
            }
            let Some(fields) = pending_update(channel, role, target_out_pct) else {
                continue;
            };

            let describe = match role {
                Role::Target => format!("target, out {:.0}% -> ar_out_target {}", channel.outbound_ratio() * 100.0, target_out_pct),
                Role::Source if forced => "source (forced)".to_string(),
                Role::Source => format!("source, out {:.0}%", channel.outbound_ratio() * 100.0),
            };

            if ctx.dry_run {
                report.actions += 1;
                report.line(format!("[dry-run] {} {}", label(channel), describe));
                continue;
            }
            match client.update_channel(&channel.chan_id, &fields).await {
                Ok(()) => {
                    report.actions += 1;
                    report.line(format!("{} {}", label(channel), describe));
                }
                Err(e) => {
                    report.line(format!("{} update failed: {}", label(channel), e));
                    last_error = Some(e);
                }
            }
        }

        if let Some(err) = last_error {
            if report.actions == 0 {
                return Err(err);
            }
        }

        let summary = format!(
            "ar: {} channels, {} targets, {} sources, {} excluded, {} {}",
            channels.len(),
            targets,
            sources,
            skipped,
            report.actions,
            if ctx.dry_run { "pending updates (dry-run)" } else { "updated" }
        );
        debug!("[ar] {}", summary);
        if ctx.didactic.explain {
            report.line(format!(
                "ar: targets below {:.0}% outbound, sources above {:.0}%",
                out_target_low * 100.0,
                source_ratio * 100.0
            ));
        }
        report.line(summary);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::integrations::stub_server;
    use crate::integrations::telegram::TelegramNotifier;
    use crate::integrations::{ChannelInfo, FeeTransport};
    use crate::models::{Mode, SecretsPatch};
    use crate::modules::{Didactic, Goals};
    use std::sync::Arc;

    struct NoTransport;

    #[async_trait]
    impl FeeTransport for NoTransport {
        fn name(&self) -> &'static str {
            "none"
        }
        async fn set_fee(&self, _: &str, _: i64, _: Option<i64>, _: bool) -> Result<Option<String>> {
            Ok(None)
        }
        async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
            Ok(Vec::new())
        }
    }

    fn channel(chan_id: &str, local: i64, auto_rebalance: bool) -> LndgChannel {
        LndgChannel {
            chan_id: chan_id.to_string(),
            capacity: 1_000_000,
            local_balance: local,
            remote_balance: 1_000_000 - local,
            auto_rebalance,
            is_active: true,
            is_open: true,
            ..LndgChannel::default()
        }
    }

    fn store_with_lndg(url: Option<&str>) -> Arc<Database> {
        let store = Arc::new(Database::open(":memory:").unwrap());
        if let Some(url) = url {
            let patch = SecretsPatch {
                lndg_url: Some(url.to_string()),
                ..SecretsPatch::default()
            };
            store.update_secrets(&patch).unwrap();
        }
        store
    }

    fn context<'a>(
        store: Arc<Database>,
        transport: &'a dyn FeeTransport,
        notifier: &'a TelegramNotifier,
        dry_run: bool,
        exclusions: Vec<(String, String)>,
        forced_sources: Vec<(String, String)>,
    ) -> RunContext<'a> {
        RunContext {
            dry_run,
            mode: Mode::Conservative,
            params: [("out_target_low", 0.15), ("source_ratio", 0.65), ("target_out_pct", 20.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            exclusions,
            forced_sources,
            goals: Goals::default(),
            didactic: Didactic::default(),
            store,
            transport,
            notifier,
            version: "test".to_string(),
            now: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_roles_and_pending_updates() {
        let depleted = channel("1", 50_000, false);
        let full = channel("2", 900_000, true);
        let balanced = channel("3", 400_000, true);

        assert_eq!(role_for(&depleted, false, 0.15, 0.65), Some(Role::Target));
        assert_eq!(role_for(&full, false, 0.15, 0.65), Some(Role::Source));
        assert_eq!(role_for(&balanced, false, 0.15, 0.65), None);
        assert_eq!(role_for(&balanced, true, 0.15, 0.65), Some(Role::Source));

        assert_eq!(pending_update(&depleted, Role::Target, 20), Some(json!({"auto_rebalance": true, "ar_out_target": 20})));
        assert_eq!(pending_update(&channel("4", 900_000, false), Role::Source, 20), None);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_writing() {
        let body = serde_json::to_string(&json!({
            "results": [channel("1", 50_000, false), channel("2", 900_000, true), channel("3", 50_000, false)],
            "next": null
        }))
        .unwrap();
        let server = stub_server::spawn(vec![(200, body)]).await;
        let store = store_with_lndg(Some(&server.base_url));
        let notifier = TelegramNotifier::disabled();
        let ctx = context(store, &NoTransport, &notifier, true, vec![("3".to_string(), String::new())], Vec::new());

        let report = AutoRebalance.run(&ctx).await.unwrap();
        assert_eq!(report.actions, 2);
        assert!(report.text().contains("[dry-run] 1 target"));
        assert!(report.text().contains("1 excluded"));
        // only the listing request reached the dashboard
        assert_eq!(server.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_forced_source_is_updated() {
        let body = serde_json::to_string(&vec![channel("7", 400_000, true)]).unwrap();
        let server = stub_server::spawn(vec![(200, body), (200, "{}".to_string())]).await;
        let store = store_with_lndg(Some(&server.base_url));
        let notifier = TelegramNotifier::disabled();
        let ctx = context(store, &NoTransport, &notifier, false, Vec::new(), vec![("7".to_string(), String::new())]);

        let report = AutoRebalance.run(&ctx).await.unwrap();
        assert_eq!(report.actions, 1);
        let requests = server.recorded();
        assert_eq!(requests[1].method, "PATCH");
        assert_eq!(requests[1].path, "/api/channels/7/");
        let sent: Value = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(sent, json!({"auto_rebalance": false}));
    }

    #[tokio::test]
    async fn test_missing_dashboard() {
        let notifier = TelegramNotifier::disabled();

        let dry = context(store_with_lndg(None), &NoTransport, &notifier, true, Vec::new(), Vec::new());
        assert!(AutoRebalance.run(&dry).await.unwrap().text().contains("not configured"));

        let live = context(store_with_lndg(None), &NoTransport, &notifier, false, Vec::new(), Vec::new());
        assert!(matches!(AutoRebalance.run(&live).await, Err(OrchestratorError::Configuration(_))));
    }
}
