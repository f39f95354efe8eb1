//! Decision modules and the contract the adapter drives them through.

pub mod adapter;
pub mod autofee;
pub mod presets;
pub mod rebalance;
pub mod tuner;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

use crate::db::Database;
use crate::error::Result;
use crate::identifiers::IdentifierKind;
use crate::integrations::telegram::TelegramNotifier;
use crate::integrations::FeeTransport;
use crate::models::{Mode, Settings};

pub use adapter::{ModuleAdapter, Outcome};

/// The built-in modules, in scheduling order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ModuleKind {
    Autofee,
    Ar,
    Tuner,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 3] = [ModuleKind::Autofee, ModuleKind::Ar, ModuleKind::Tuner];

    pub fn interval_secs(self, settings: &Settings) -> u64 {
        match self {
            ModuleKind::Autofee => settings.loop_interval_autofee,
            ModuleKind::Ar => settings.loop_interval_ar,
            ModuleKind::Tuner => settings.loop_interval_tuner,
        }
    }

    pub fn dry_run(self, settings: &Settings) -> bool {
        match self {
            ModuleKind::Autofee => settings.dry_run_autofee,
            ModuleKind::Ar => settings.dry_run_ar,
            ModuleKind::Tuner => settings.dry_run_tuner,
        }
    }

    pub fn build(self) -> Box<dyn DecisionModule> {
        match self {
            ModuleKind::Autofee => Box::new(autofee::AutoFee),
            ModuleKind::Ar => Box::new(rebalance::AutoRebalance),
            ModuleKind::Tuner => Box::new(tuner::ParamTuner),
        }
    }
}

/// A numeric tunable with its default
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f64,
}

/// Resolved parameter values, one per declared [`ParamSpec`]
pub type Params = BTreeMap<String, f64>;

/// Which identifier lists a module needs, and of which class
#[derive(Debug, Clone, Copy, Default)]
pub struct Wants {
    pub exclusions: Option<IdentifierKind>,
    pub forced_sources: Option<IdentifierKind>,
}

/// Profit goals; non-positive values are dropped
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Goals {
    pub ppm: Option<f64>,
    pub sat: Option<f64>,
    /// `sat` scaled to the module's lookback window
    pub sat_window: Option<f64>,
}

impl Goals {
    pub fn resolve(settings: &Settings, lookback_days: u32) -> Self {
        let positive = |v: Option<i64>| v.filter(|v| *v > 0).map(|v| v as f64);
        let ppm = positive(settings.monthly_profit_goal_ppm);
        let sat = positive(settings.monthly_profit_goal_sat);
        Goals {
            ppm,
            sat,
            sat_window: sat.map(|s| s * lookback_days as f64 / 30.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Didactic {
    pub explain: bool,
    pub detailed: bool,
}

/// Symptom counters keyed by symptom name
pub type Symptoms = BTreeMap<String, u64>;

/// What a module hands back after a run
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub lines: Vec<String>,
    /// Updates performed (or, in dry-run, that would have been performed)
    pub actions: usize,
    pub symptoms: Option<Symptoms>,
}

impl Report {
    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Everything a module may use during one run
pub struct RunContext<'a> {
    pub dry_run: bool,
    pub mode: Mode,
    pub params: Params,
    /// Normalized `(identifier, note)` pairs of the requested class
    pub exclusions: Vec<(String, String)>,
    pub forced_sources: Vec<(String, String)>,
    pub goals: Goals,
    pub didactic: Didactic,
    pub store: Arc<Database>,
    pub transport: &'a dyn FeeTransport,
    pub notifier: &'a TelegramNotifier,
    pub version: String,
    pub now: DateTime<Utc>,
}

impl RunContext<'_> {
    /// Resolved parameter value; 0.0 for an undeclared name
    pub fn param(&self, name: &str) -> f64 {
        self.params.get(name).copied().unwrap_or(0.0)
    }

    pub fn is_excluded(&self, identifier: &str) -> bool {
        self.exclusions.iter().any(|(id, _)| id == identifier)
    }

    pub fn is_forced_source(&self, identifier: &str) -> bool {
        self.forced_sources.iter().any(|(id, _)| id == identifier)
    }
}

#[async_trait]
pub trait DecisionModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declared numeric tunables
    fn parameters(&self) -> &'static [ParamSpec];

    fn lookback_days(&self) -> u32 {
        7
    }

    fn wants(&self) -> Wants {
        Wants::default()
    }

    async fn run(&self, ctx: &RunContext<'_>) -> Result<Report>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goals_scale_to_lookback() {
        let settings = Settings {
            monthly_profit_goal_sat: Some(30_000),
            monthly_profit_goal_ppm: Some(0),
            ..Settings::default()
        };
        let goals = Goals::resolve(&settings, 7);
        assert_eq!(goals.sat, Some(30_000.0));
        assert_eq!(goals.sat_window, Some(7_000.0));
        assert_eq!(goals.ppm, None);
    }

    #[test]
    fn test_negative_goals_are_ignored() {
        let settings = Settings {
            monthly_profit_goal_sat: Some(-5),
            ..Settings::default()
        };
        assert_eq!(Goals::resolve(&settings, 7), Goals::default());
    }

    #[test]
    fn test_module_kind_names() {
        assert_eq!(ModuleKind::Autofee.to_string(), "autofee");
        assert_eq!(ModuleKind::Ar.as_ref(), "ar");
        for kind in ModuleKind::ALL {
            assert_eq!(kind.build().name(), kind.as_ref());
        }
    }
}
