//! Parameter tuner
//!
//! Reads the last week of forwarding and rebalance totals from LNDg's
//! database, compares the realised margin with the profit goals and nudges
//! the autofee multipliers in `overrides:autofee`.

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{DecisionModule, Goals, ParamSpec, Params, Report, RunContext, Symptoms};
use crate::db::tables::namespaces::{NS_AUTOFEE_OVERRIDES, NS_AUTOFEE_SYMPTOMS};
use crate::error::{OrchestratorError, Result};
use crate::integrations::lndg_db::{Kpis, LndgDatabase};

pub const NS_TUNER_META: &str = "tuner_meta";

const BASE_MULT: &str = "base_ppm_mult";
const STEP_MULT: &str = "step_cap_pct_mult";

const PARAMS: &[ParamSpec] = &[
    ParamSpec { name: "step_mult", default: 0.03 },
    ParamSpec { name: "min_mult", default: 0.7 },
    ParamSpec { name: "max_mult", default: 1.5 },
    ParamSpec { name: "margin_floor_ppm", default: 150.0 },
];

/// What the tuner remembers between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TunerMeta {
    last_run: i64,
    kpis: Kpis,
    base_ppm_mult: f64,
    step_cap_pct_mult: f64,
    reason: String,
}

/// Direction for the base fee multiplier, with the reason
fn base_direction(kpis: &Kpis, goals: &Goals, margin_floor_ppm: f64) -> (i8, String) {
    if kpis.out_amt_sat == 0 {
        return (-1, "no forwarding volume".to_string());
    }
    if kpis.profit_ppm_est < margin_floor_ppm {
        return (1, format!("margin {:.0} ppm below floor {:.0}", kpis.profit_ppm_est, margin_floor_ppm));
    }
    if let Some(goal) = goals.ppm {
        if kpis.profit_ppm_est < goal {
            return (1, format!("margin {:.0} ppm below goal {:.0}", kpis.profit_ppm_est, goal));
        }
    }
    if let Some(goal) = goals.sat_window {
        if (kpis.profit_sat as f64) < goal {
            return (1, format!("profit {} sat below window goal {:.0}", kpis.profit_sat, goal));
        }
    }
    (0, "on target".to_string())
}

/// Widen steps when moves keep hitting the cap, narrow them when they mostly hold
fn step_direction(symptoms: &Symptoms) -> i8 {
    let count = |key: &str| symptoms.get(key).copied().unwrap_or(0);
    let capped = count("cb_trigger");
    let held = count("hold_small") + count("floor_lock");
    if capped > held {
        1
    } else if held > 0 && capped == 0 {
        -1
    } else {
        0
    }
}

fn nudge(current: f64, direction: i8, params: &Params) -> f64 {
    let next = current + direction as f64 * params["step_mult"];
    let bounded = next.clamp(params["min_mult"], params["max_mult"].max(params["min_mult"]));
    (bounded * 10_000.0).round() / 10_000.0
}

pub struct ParamTuner;

#[async_trait]
impl DecisionModule for ParamTuner {
    fn name(&self) -> &'static str {
        "tuner"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    async fn run(&self, ctx: &RunContext<'_>) -> Result<Report> {
        let secrets = ctx.store.get_secrets()?;
        let path = secrets
            .lndg_db_path()
            .ok_or_else(|| OrchestratorError::config("lndg_db_path is required by the tuner module"))?;
        let kpis = LndgDatabase::new(path).kpis(self.lookback_days(), ctx.now)?;

        let symptoms: Symptoms = ctx.store.load_namespace_as(NS_AUTOFEE_SYMPTOMS)?.unwrap_or_default();
        let mut overrides = match ctx.store.load_namespace(NS_AUTOFEE_OVERRIDES, json!({}))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let current = |key: &str| overrides.get(key).and_then(Value::as_f64).unwrap_or(1.0);
        let (base_before, step_before) = (current(BASE_MULT), current(STEP_MULT));

        let (direction, reason) = base_direction(&kpis, &ctx.goals, ctx.param("margin_floor_ppm"));
        let base_after = nudge(base_before, direction, &ctx.params);
        let step_after = nudge(step_before, step_direction(&symptoms), &ctx.params);

        let mut report = Report::default();
        report.line(format!(
            "tuner: {}d out {} sat @ {:.0} ppm, rebal {} sat @ {:.0} ppm, profit {} sat ({:.0} ppm)",
            self.lookback_days(),
            kpis.out_amt_sat,
            kpis.out_ppm,
            kpis.rebal_amt_sat,
            kpis.rebal_cost_ppm,
            kpis.profit_sat,
            kpis.profit_ppm_est
        ));
        if ctx.didactic.explain {
            report.line(format!("tuner: {}", reason));
        }

        let prefix = if ctx.dry_run { "[dry-run] " } else { "" };
        for (key, before, after) in [(BASE_MULT, base_before, base_after), (STEP_MULT, step_before, step_after)] {
            if (after - before).abs() > f64::EPSILON {
                report.actions += 1;
                report.line(format!("{}{} {:.4} -> {:.4}", prefix, key, before, after));
                overrides.insert(key.to_string(), json!(after));
            }
        }
        if report.actions == 0 {
            report.line("tuner: multipliers unchanged");
        }

        if ctx.dry_run {
            return Ok(report);
        }

        if report.actions > 0 {
            ctx.store.save_namespace(NS_AUTOFEE_OVERRIDES, &Value::Object(overrides))?;
        }
        let meta = TunerMeta {
            last_run: ctx.now.timestamp(),
            kpis,
            base_ppm_mult: base_after,
            step_cap_pct_mult: step_after,
            reason,
        };
        ctx.store.save_namespace_as(NS_TUNER_META, &meta)?;
        info!("[tuner] {} multiplier change(s), version {}", report.actions, ctx.version);

        if report.actions > 0 {
            if let Err(e) = ctx.notifier.send(&report.text()).await {
                warn!("[tuner] Notification failed: {}", e);
            }
        }
        Ok(report)
    }
}
