//! Liquidity-driven fee tuning.
//!
//! Each peer gets a target fee derived from its outbound liquidity share:
//! depleted peers are pushed towards `max_ppm`, overfull ones towards
//! `min_ppm`, and everything in between sits at the base fee (the Amboss
//! incoming-fee seed when available). Moves are capped per run.

use async_trait::async_trait;
use chrono::Duration;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::{DecisionModule, ParamSpec, Params, Report, RunContext, Symptoms, Wants};
use crate::db::tables::namespaces::{NS_AUTOFEE_CACHE, NS_AUTOFEE_OVERRIDES, NS_CHANNEL_STATE};
use crate::error::{OrchestratorError, Result};
use crate::identifiers::IdentifierKind;
use crate::integrations::amboss::AmbossClient;
use crate::integrations::ChannelInfo;

pub const SYMPTOM_KEYS: [&str; 5] = ["floor_lock", "no_down_low", "hold_small", "cb_trigger", "discovery"];

const AMBOSS_METRIC: &str = "incoming_fee_rate_metrics";
const AMBOSS_SUBMETRIC: &str = "weighted_corrected_mean";
const AMBOSS_TTL_HOURS: i64 = 3;

const PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "base_ppm", default: 500.0 },
    ParamSpec { name: "min_ppm", default: 50.0 },
    ParamSpec { name: "max_ppm", default: 2500.0 },
    ParamSpec { name: "step_cap_pct", default: 5.0 },
    ParamSpec { name: "hold_min_delta_ppm", default: 5.0 },
    ParamSpec { name: "inbound_discount_pct", default: 0.0 },
    ParamSpec { name: "low_outbound", default: 0.20 },
    ParamSpec { name: "high_outbound", default: 0.80 },
];

/// Last fee we set for a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeerState {
    fee_ppm: i64,
    updated_at: i64,
}

/// Aggregated liquidity of all channels with one peer
#[derive(Debug, Default)]
struct Peer {
    capacity: i64,
    local: i64,
    channels: usize,
}

impl Peer {
    fn outbound_ratio(&self) -> f64 {
        if self.capacity <= 0 {
            return 0.0;
        }
        (self.local as f64 / self.capacity as f64).clamp(0.0, 1.0)
    }
}

/// What to do with one peer this run
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    Set(i64),
    Hold(&'static str),
}

/// Apply `overrides:autofee`: `<param>` replaces, `<param>_mult` scales.
fn apply_overrides(params: &mut Params, overrides: &Value) {
    let Some(map) = overrides.as_object() else {
        return;
    };
    for (name, value) in params.iter_mut() {
        if let Some(v) = map.get(name.as_str()).and_then(Value::as_f64) {
            *value = v;
        }
        if let Some(mult) = map.get(&format!("{}_mult", name)).and_then(Value::as_f64) {
            if mult > 0.0 {
                *value *= mult;
            }
        }
    }
}

/// Target fee for an outbound share, clamped to `[min_ppm, max_ppm]`
fn target_fee(params: &Params, base_ppm: f64, ratio: f64) -> i64 {
    let min = params["min_ppm"];
    let max = params["max_ppm"].max(min);
    let low = params["low_outbound"].clamp(0.0, 1.0);
    let high = params["high_outbound"].clamp(low, 1.0);
    let base = base_ppm.clamp(min, max);

    let target = if ratio < low && low > 0.0 {
        base + (max - base) * (low - ratio) / low
    } else if ratio > high && high < 1.0 {
        base - (base - min) * (ratio - high) / (1.0 - high)
    } else {
        base
    };
    target.clamp(min, max).round() as i64
}

fn decide(params: &Params, current: Option<i64>, target: i64, ratio: f64) -> Decision {
    let Some(current) = current else {
        return Decision::Set(target);
    };
    let min = params["min_ppm"].round() as i64;
    let delta = target - current;

    if current <= min && target <= min {
        return Decision::Hold("floor_lock");
    }
    if (delta.abs() as f64) < params["hold_min_delta_ppm"] {
        return Decision::Hold("hold_small");
    }
    if delta < 0 && ratio < params["low_outbound"] {
        return Decision::Hold("no_down_low");
    }

    let cap = ((current as f64 * params["step_cap_pct"] / 100.0).round() as i64).max(1);
    if delta.abs() > cap {
        Decision::Set(current + cap * delta.signum())
    } else {
        Decision::Set(target)
    }
}

fn short(pubkey: &str) -> &str {
    pubkey.get(..12).unwrap_or(pubkey)
}

pub struct AutoFee;

impl AutoFee {
    async fn seed_for(&self, ctx: &RunContext<'_>, amboss: Option<&AmbossClient>, cache: &mut Map<String, Value>, pubkey: &str) -> Option<f64> {
        let amboss = amboss?;
        let from_date = (ctx.now - Duration::days(self.lookback_days() as i64)).format("%Y-%m-%d").to_string();
        match amboss.series(pubkey, AMBOSS_METRIC, AMBOSS_SUBMETRIC, &from_date).await {
            Ok(values) if !values.is_empty() => {
                let seed = values.iter().sum::<f64>() / values.len() as f64;
                cache.insert(pubkey.to_string(), json!({"seed": seed, "ts": ctx.now.timestamp()}));
                Some(seed)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("[autofee] Amboss seed unavailable for {}: {}", short(pubkey), e);
                cache.get(pubkey).and_then(|c| c.get("seed")).and_then(Value::as_f64)
            }
        }
    }
}

#[async_trait]
impl DecisionModule for AutoFee {
    fn name(&self) -> &'static str {
        "autofee"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn wants(&self) -> Wants {
        Wants {
            exclusions: Some(IdentifierKind::Pubkey),
            forced_sources: None,
        }
    }

    async fn run(&self, ctx: &RunContext<'_>) -> Result<Report> {
        let mut params = ctx.params.clone();
        apply_overrides(&mut params, &ctx.store.load_namespace(NS_AUTOFEE_OVERRIDES, json!({}))?);

        ctx.transport.refresh().await;
        let channels: Vec<ChannelInfo> = ctx.transport.list_channels().await?;
        let mut peers: BTreeMap<String, Peer> = BTreeMap::new();
        let mut skipped = 0;
        for channel in channels.iter().filter(|c| c.active) {
            if ctx.is_excluded(&channel.remote_pubkey) {
                skipped += 1;
                continue;
            }
            let peer = peers.entry(channel.remote_pubkey.clone()).or_default();
            peer.capacity += channel.capacity;
            peer.local += channel.local_balance;
            peer.channels += 1;
        }

        let secrets = ctx.store.get_secrets()?;
        let amboss = secrets
            .amboss_token()
            .map(|token| AmbossClient::new(ctx.store.clone(), token, Duration::hours(AMBOSS_TTL_HOURS)));

        let mut state = match ctx.store.load_namespace(NS_CHANNEL_STATE, json!({}))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut cache = match ctx.store.load_namespace(NS_AUTOFEE_CACHE, json!({}))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut report = Report::default();
        let mut symptoms: Symptoms = SYMPTOM_KEYS.iter().map(|k| (k.to_string(), 0)).collect();
        let mut last_error = None;

        for (pubkey, peer) in &peers {
            let ratio = peer.outbound_ratio();
            let seed = self.seed_for(ctx, amboss.as_ref(), &mut cache, pubkey).await;
            let base = seed.unwrap_or(params["base_ppm"]);
            let target = target_fee(&params, base, ratio);
            let current = match state.get(pubkey).map(|v| serde_json::from_value::<PeerState>(v.clone())) {
                None => None,
                Some(Ok(entry)) => Some(entry.fee_ppm),
                Some(Err(e)) => {
                    let err = OrchestratorError::StorageDecode {
                        location: format!("{}/{}", NS_CHANNEL_STATE, short(pubkey)),
                        message: e.to_string(),
                    };
                    warn!("[autofee] {}, rediscovering", err);
                    None
                }
            };

            if current.is_none() {
                *symptoms.entry("discovery".into()).or_default() += 1;
            }
            let new_fee = match decide(&params, current, target, ratio) {
                Decision::Hold(symptom) => {
                    *symptoms.entry(symptom.into()).or_default() += 1;
                    if ctx.didactic.detailed {
                        report.line(format!("{} hold at {:?} ppm ({}, out {:.0}%)", short(pubkey), current, symptom, ratio * 100.0));
                    }
                    continue;
                }
                Decision::Set(fee) => fee,
            };
            if let Some(cur) = current {
                if (new_fee - cur).abs() < (target - cur).abs() {
                    *symptoms.entry("cb_trigger".into()).or_default() += 1;
                }
            }

            let pct = params["inbound_discount_pct"];
            let discount = (pct > 0.0 && ratio > params["high_outbound"])
                .then(|| (new_fee as f64 * pct / 100.0).round() as i64)
                .filter(|d| *d > 0);

            match ctx.transport.set_fee(pubkey, new_fee, discount, ctx.dry_run).await {
                Ok(preview) => {
                    report.actions += 1;
                    let from = current.map(|c| c.to_string()).unwrap_or_else(|| "new".to_string());
                    let mut line = format!("{} {} -> {} ppm (out {:.0}%, target {})", short(pubkey), from, new_fee, ratio * 100.0, target);
                    if ctx.didactic.explain {
                        line.push_str(&format!(" [base {:.0}{}]", base, if seed.is_some() { " from amboss" } else { "" }));
                    }
                    report.line(line);
                    if let Some(preview) = preview.filter(|_| ctx.dry_run) {
                        report.line(preview);
                    }
                    if !ctx.dry_run {
                        let entry = PeerState {
                            fee_ppm: new_fee,
                            updated_at: ctx.now.timestamp(),
                        };
                        state.insert(pubkey.clone(), serde_json::to_value(entry).unwrap_or(Value::Null));
                    }
                }
                Err(e) => {
                    report.line(format!("{} update failed: {}", short(pubkey), e));
                    last_error = Some(e);
                }
            }
        }

        if let Some(err) = last_error {
            if report.actions == 0 {
                return Err(err);
            }
        }

        if !ctx.dry_run {
            ctx.store.save_namespace(NS_CHANNEL_STATE, &Value::Object(state))?;
        }
        ctx.store.save_namespace(NS_AUTOFEE_CACHE, &Value::Object(cache))?;

        let summary = format!(
            "autofee: {} peers, {} updates{}, {} excluded | {}",
            peers.len(),
            report.actions,
            if ctx.dry_run { " (dry-run)" } else { "" },
            skipped,
            symptoms.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(" ")
        );
        debug!("[autofee] {} (mode {})", summary, ctx.mode);
        report.line(summary.clone());
        report.symptoms = Some(symptoms);

        if !ctx.dry_run && report.actions > 0 {
            if let Err(e) = ctx.notifier.send(&summary).await {
                warn!("[autofee] Notification failed: {}", e);
            }
        }
        Ok(report)
    }
}
