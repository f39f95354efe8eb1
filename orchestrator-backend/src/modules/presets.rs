//! Mode presets
//!
//! Loads preset bundles from config/presets.ron, falling back to the copy
//! compiled into the binary.

use log::{error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use super::{ParamSpec, Params};
use crate::models::Mode;

/// module name -> parameter -> raw value
pub type ModulePresets = HashMap<String, HashMap<String, Value>>;

const BUILTIN_PRESETS: &str = include_str!("../../config/presets.ron");

static PRESETS: OnceLock<HashMap<Mode, ModulePresets>> = OnceLock::new();

/// Parse a presets document. Mode keys may use the legacy names.
pub fn parse_presets(content: &str) -> Result<HashMap<Mode, ModulePresets>, String> {
    let raw: HashMap<String, ModulePresets> = ron::from_str(content).map_err(|e| e.to_string())?;
    let mut presets = HashMap::new();
    for (key, bundle) in raw {
        match Mode::from_str(&key) {
            Ok(mode) => {
                presets.insert(mode, bundle);
            }
            Err(_) => warn!("[presets] Ignoring unknown mode '{}'", key),
        }
    }
    Ok(presets)
}

fn builtin_presets() -> HashMap<Mode, ModulePresets> {
    parse_presets(BUILTIN_PRESETS).unwrap_or_else(|e| {
        error!("[presets] Built-in presets are invalid: {}", e);
        HashMap::new()
    })
}

/// Load presets from `config_dir`. Call once at startup; later calls are ignored.
pub fn load_presets(config_dir: &Path) {
    let path = config_dir.join("presets.ron");

    let presets = if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match parse_presets(&content) {
                Ok(presets) => {
                    info!("[presets] Loaded {} mode bundles from {}", presets.len(), path.display());
                    presets
                }
                Err(e) => {
                    error!("[presets] Failed to parse {}: {}", path.display(), e);
                    builtin_presets()
                }
            },
            Err(e) => {
                error!("[presets] Failed to read {}: {}", path.display(), e);
                builtin_presets()
            }
        }
    } else {
        info!("[presets] {} not found, using built-in presets", path.display());
        builtin_presets()
    };

    if PRESETS.set(presets).is_err() {
        warn!("[presets] Presets already initialized");
    }
}

fn presets() -> &'static HashMap<Mode, ModulePresets> {
    PRESETS.get_or_init(builtin_presets)
}

/// Bundle for `module` under `mode`; an unknown mode falls back to conservative
pub fn module_presets(mode: Mode, module: &str) -> HashMap<String, Value> {
    bundle_for(presets(), mode, module)
}

fn bundle_for(all: &HashMap<Mode, ModulePresets>, mode: Mode, module: &str) -> HashMap<String, Value> {
    all.get(&mode)
        .or_else(|| all.get(&Mode::Conservative))
        .and_then(|bundle| bundle.get(module))
        .cloned()
        .unwrap_or_default()
}

/// Module defaults overlaid with the numeric preset values for declared parameters.
/// Booleans, strings and unknown keys are ignored.
pub fn resolve_params(specs: &[ParamSpec], preset: &HashMap<String, Value>) -> Params {
    specs
        .iter()
        .map(|spec| {
            let value = match preset.get(spec.name) {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(spec.default),
                _ => spec.default,
            };
            (spec.name.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPECS: &[ParamSpec] = &[
        ParamSpec { name: "step_cap_pct", default: 5.0 },
        ParamSpec { name: "base_ppm", default: 500.0 },
        ParamSpec { name: "seed_from_amboss", default: 1.0 },
    ];

    #[test]
    fn test_builtin_presets_cover_every_mode() {
        let all = builtin_presets();
        for mode in [Mode::Conservative, Mode::Moderate, Mode::Aggressive] {
            assert!(all.get(&mode).unwrap().contains_key("autofee"), "{} missing", mode);
        }
    }

    #[test]
    fn test_only_declared_numeric_values_apply() {
        let mut preset = HashMap::new();
        preset.insert("step_cap_pct".to_string(), json!(12.5));
        preset.insert("seed_from_amboss".to_string(), json!(false));
        preset.insert("unknown".to_string(), json!(99));
        preset.insert("base_ppm".to_string(), json!("lots"));

        let params = resolve_params(SPECS, &preset);
        assert_eq!(params.len(), 3);
        assert_eq!(params["step_cap_pct"], 12.5);
        assert_eq!(params["seed_from_amboss"], 1.0);
        assert_eq!(params["base_ppm"], 500.0);
        assert!(!params.contains_key("unknown"));
    }

    #[test]
    fn test_legacy_mode_keys_and_fallback() {
        let all = parse_presets(r#"{ "conservador": { "ar": { "source_ratio": 0.7 } } }"#).unwrap();
        let bundle = bundle_for(&all, Mode::Aggressive, "ar");
        assert_eq!(bundle.get("source_ratio"), Some(&json!(0.7)));
        assert!(bundle_for(&all, Mode::Conservative, "tuner").is_empty());
    }

    #[test]
    fn test_load_from_dir_parses_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("presets.ron"),
            r#"{ "moderate": { "autofee": { "base_ppm": 321.0 } } }"#,
        )
        .unwrap();
        let content = std::fs::read_to_string(dir.path().join("presets.ron")).unwrap();
        let all = parse_presets(&content).unwrap();
        assert_eq!(bundle_for(&all, Mode::Moderate, "autofee")["base_ppm"], json!(321.0));
    }
}
