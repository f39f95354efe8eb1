use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

pub const DEFAULT_LOOP_INTERVAL_AUTOFEE: u64 = 600;
pub const DEFAULT_LOOP_INTERVAL_AR: u64 = 300;
pub const DEFAULT_LOOP_INTERVAL_TUNER: u64 = 1800;

/// Operating mode; selects the preset bundle handed to every module.
/// The Portuguese names used by the legacy scripts are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[strum(to_string = "conservative", serialize = "conservador")]
    #[serde(alias = "conservador")]
    Conservative,
    #[strum(to_string = "moderate", serialize = "moderado")]
    #[serde(alias = "moderado")]
    Moderate,
    #[strum(to_string = "aggressive", serialize = "agressivo")]
    #[serde(alias = "agressivo")]
    Aggressive,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Conservative
    }
}

/// Run configuration persisted as JSON under the `settings` meta key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    pub monthly_profit_goal_ppm: Option<i64>,
    pub monthly_profit_goal_sat: Option<i64>,
    pub loop_interval_autofee: u64,
    pub loop_interval_ar: u64,
    pub loop_interval_tuner: u64,
    pub dry_run_autofee: bool,
    pub dry_run_ar: bool,
    pub dry_run_tuner: bool,
    pub didactic_explain: bool,
    pub didactic_detailed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Conservative,
            monthly_profit_goal_ppm: None,
            monthly_profit_goal_sat: None,
            loop_interval_autofee: DEFAULT_LOOP_INTERVAL_AUTOFEE,
            loop_interval_ar: DEFAULT_LOOP_INTERVAL_AR,
            loop_interval_tuner: DEFAULT_LOOP_INTERVAL_TUNER,
            dry_run_autofee: false,
            dry_run_ar: false,
            dry_run_tuner: false,
            didactic_explain: false,
            didactic_detailed: false,
        }
    }
}

/// Run-time overrides from the `run` command line. `None` means "keep stored".
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub mode: Option<Mode>,
    pub monthly_profit_goal_ppm: Option<i64>,
    pub monthly_profit_goal_sat: Option<i64>,
    pub loop_interval_autofee: Option<u64>,
    pub loop_interval_ar: Option<u64>,
    pub loop_interval_tuner: Option<u64>,
    pub dry_run_autofee: Option<bool>,
    pub dry_run_ar: Option<bool>,
    pub dry_run_tuner: Option<bool>,
    pub didactic_explain: bool,
    pub didactic_detailed: bool,
}

impl Settings {
    /// Overlay a stored JSON object onto the defaults, key by key.
    /// Unknown keys are ignored; a value of the wrong type keeps that key's default.
    pub fn merge_over_defaults(stored: &Value) -> Self {
        let defaults = Settings::default();
        let mut base = match serde_json::to_value(&defaults) {
            Ok(Value::Object(base)) => base,
            _ => return defaults,
        };
        let Some(overlay) = stored.as_object() else {
            return defaults;
        };

        for (key, value) in overlay {
            let Some(previous) = base.insert(key.clone(), value.clone()) else {
                base.remove(key);
                continue;
            };
            if let Err(e) = Self::decode(&base) {
                warn!("[settings] Ignoring stored {} ({}), keeping default", key, e);
                base.insert(key.clone(), previous);
            }
        }
        Self::decode(&base).unwrap_or(defaults)
    }

    fn decode(object: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(object.clone()))
    }

    /// Explicit run-time value > stored value > default (already in `self`).
    /// Zero intervals are treated as "not given".
    pub fn apply_overrides(&self, overrides: &RunOverrides) -> Settings {
        let pick_interval = |o: Option<u64>, stored: u64| o.filter(|v| *v > 0).unwrap_or(stored);
        Settings {
            mode: overrides.mode.unwrap_or(self.mode),
            monthly_profit_goal_ppm: overrides.monthly_profit_goal_ppm.or(self.monthly_profit_goal_ppm),
            monthly_profit_goal_sat: overrides.monthly_profit_goal_sat.or(self.monthly_profit_goal_sat),
            loop_interval_autofee: pick_interval(overrides.loop_interval_autofee, self.loop_interval_autofee),
            loop_interval_ar: pick_interval(overrides.loop_interval_ar, self.loop_interval_ar),
            loop_interval_tuner: pick_interval(overrides.loop_interval_tuner, self.loop_interval_tuner),
            dry_run_autofee: overrides.dry_run_autofee.unwrap_or(self.dry_run_autofee),
            dry_run_ar: overrides.dry_run_ar.unwrap_or(self.dry_run_ar),
            dry_run_tuner: overrides.dry_run_tuner.unwrap_or(self.dry_run_tuner),
            didactic_explain: overrides.didactic_explain || self.didactic_explain,
            didactic_detailed: overrides.didactic_detailed || self.didactic_detailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_mode_accepts_legacy_names() {
        assert_eq!(Mode::from_str("agressivo").unwrap(), Mode::Aggressive);
        assert_eq!(Mode::from_str("Moderate").unwrap(), Mode::Moderate);
        assert_eq!(Mode::Conservative.to_string(), "conservative");
        let mode: Mode = serde_json::from_value(json!("conservador")).unwrap();
        assert_eq!(mode, Mode::Conservative);
    }

    #[test]
    fn test_merge_fills_missing_keys() {
        let merged = Settings::merge_over_defaults(&json!({"loop_interval_ar": 60, "bogus": 1}));
        assert_eq!(merged.loop_interval_ar, 60);
        assert_eq!(merged.loop_interval_autofee, DEFAULT_LOOP_INTERVAL_AUTOFEE);
        assert_eq!(merged.mode, Mode::Conservative);
    }

    #[test]
    fn test_wrong_type_keeps_only_that_default() {
        let merged = Settings::merge_over_defaults(&json!({
            "mode": "aggressive",
            "loop_interval_ar": 42,
            "monthly_profit_goal_sat": 1500.5,
            "dry_run_tuner": "yes"
        }));
        assert_eq!(merged.mode, Mode::Aggressive);
        assert_eq!(merged.loop_interval_ar, 42);
        assert_eq!(merged.monthly_profit_goal_sat, None);
        assert!(!merged.dry_run_tuner);
    }

    #[test]
    fn test_non_object_yields_defaults() {
        assert_eq!(Settings::merge_over_defaults(&json!([1, 2])), Settings::default());
    }

    #[test]
    fn test_override_beats_stored_beats_default() {
        let stored = Settings {
            loop_interval_autofee: 120,
            dry_run_ar: true,
            ..Settings::default()
        };

        // nothing given: stored wins over default
        let resolved = stored.apply_overrides(&RunOverrides::default());
        assert_eq!(resolved.loop_interval_autofee, 120);
        assert_eq!(resolved.loop_interval_tuner, DEFAULT_LOOP_INTERVAL_TUNER);
        assert!(resolved.dry_run_ar);

        // explicit values win over stored
        let overrides = RunOverrides {
            loop_interval_autofee: Some(30),
            dry_run_ar: Some(false),
            dry_run_tuner: Some(true),
            ..RunOverrides::default()
        };
        let resolved = stored.apply_overrides(&overrides);
        assert_eq!(resolved.loop_interval_autofee, 30);
        assert!(!resolved.dry_run_ar);
        assert!(resolved.dry_run_tuner);
        assert!(!resolved.dry_run_autofee);
    }

    #[test]
    fn test_didactic_flags_are_sticky() {
        let stored = Settings {
            didactic_explain: true,
            ..Settings::default()
        };
        let resolved = stored.apply_overrides(&RunOverrides::default());
        assert!(resolved.didactic_explain);
        assert!(!resolved.didactic_detailed);
    }
}
