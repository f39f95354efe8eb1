//! Binds one decision module to the shared infrastructure.
//!
//! The adapter resolves presets, identifier lists and goals, invokes the
//! module, and turns every outcome (report, error or panic) into telemetry.
//! Nothing a module does can propagate past [`ModuleAdapter::run`].

use chrono::Utc;
use futures_util::FutureExt;
use log::{error, info};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::presets::{module_presets, resolve_params};
use super::{DecisionModule, Didactic, Goals, Report, RunContext};
use crate::config::APP_VERSION;
use crate::db::tables::namespaces::NS_AUTOFEE_SYMPTOMS;
use crate::db::{Database, Registry};
use crate::error::{OrchestratorError, Result};
use crate::identifiers::filter_kind;
use crate::integrations::telegram::TelegramNotifier;
use crate::integrations::FeeTransport;
use crate::models::{Level, Mode, Settings};

/// Result of one adapter run as seen by the scheduler
#[derive(Debug, Clone)]
pub struct Outcome {
    pub module: &'static str,
    pub success: bool,
    /// Report text (with the dry-run prelude) or the error message
    pub text: String,
    pub actions: usize,
}

pub struct ModuleAdapter {
    module: Box<dyn DecisionModule>,
    store: Arc<Database>,
    notifier: Arc<TelegramNotifier>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl ModuleAdapter {
    pub fn new(module: Box<dyn DecisionModule>, store: Arc<Database>, notifier: Arc<TelegramNotifier>) -> Self {
        Self { module, store, notifier }
    }

    pub fn name(&self) -> &'static str {
        self.module.name()
    }

    fn build_context<'a>(
        &self,
        transport: &'a dyn FeeTransport,
        notifier: &'a TelegramNotifier,
        settings: &Settings,
        dry_run: bool,
        mode: Mode,
    ) -> Result<RunContext<'a>> {
        let params = resolve_params(self.module.parameters(), &module_presets(mode, self.module.name()));
        let wants = self.module.wants();

        let exclusions = match wants.exclusions {
            Some(kind) => filter_kind(&self.store.registry_list(Registry::Exclusions)?, kind),
            None => Vec::new(),
        };
        let forced_sources = match wants.forced_sources {
            Some(kind) => filter_kind(&self.store.registry_list(Registry::ForcedSources)?, kind),
            None => Vec::new(),
        };

        Ok(RunContext {
            dry_run,
            mode,
            params,
            exclusions,
            forced_sources,
            goals: Goals::resolve(settings, self.module.lookback_days()),
            didactic: Didactic {
                explain: settings.didactic_explain || settings.didactic_detailed,
                detailed: settings.didactic_detailed,
            },
            store: self.store.clone(),
            transport,
            notifier,
            version: self.store.get_meta("app_version", APP_VERSION)?,
            now: Utc::now(),
        })
    }

    /// One line per ignored or forced identifier
    fn dry_run_prelude(ctx: &RunContext<'_>) -> Vec<String> {
        let describe = |verb: &str, id: &str, note: &str| {
            if note.is_empty() {
                format!("[dry-run] {} {}", verb, id)
            } else {
                format!("[dry-run] {} {} ({})", verb, id, note)
            }
        };
        ctx.exclusions
            .iter()
            .map(|(id, note)| describe("ignoring", id, note))
            .chain(ctx.forced_sources.iter().map(|(id, note)| describe("forcing source", id, note)))
            .collect()
    }

    async fn invoke(&self, transport: &dyn FeeTransport, settings: &Settings, dry_run: bool, mode: Mode) -> Result<(Report, Vec<String>)> {
        let ctx = self.build_context(transport, &self.notifier, settings, dry_run, mode)?;
        let prelude = if dry_run { Self::dry_run_prelude(&ctx) } else { Vec::new() };

        let report = match AssertUnwindSafe(self.module.run(&ctx)).catch_unwind().await {
            Ok(result) => result?,
            Err(payload) => {
                return Err(OrchestratorError::module(
                    self.name(),
                    format!("panicked: {}", panic_message(payload.as_ref())),
                ))
            }
        };

        if let Some(symptoms) = &report.symptoms {
            if self.name() == "autofee" {
                self.store.save_namespace_as(NS_AUTOFEE_SYMPTOMS, symptoms)?;
            }
        }
        Ok((report, prelude))
    }

    /// Run the module once. Never fails: errors and panics become a failed [`Outcome`].
    pub async fn run(&self, transport: &dyn FeeTransport, settings: &Settings, dry_run: bool, mode: Mode) -> Outcome {
        let name = self.name();
        match self.invoke(transport, settings, dry_run, mode).await {
            Ok((report, prelude)) => {
                let mut lines = prelude;
                lines.extend(report.lines.iter().cloned());
                let text = lines.join("\n").trim().to_string();

                if !text.is_empty() {
                    println!("{}", text);
                    let extra = json!({
                        "actions": report.actions,
                        "dry_run": dry_run,
                        "mode": mode.to_string(),
                        "symptoms": report.symptoms,
                    });
                    if let Err(e) = self.store.log_telemetry(Level::Info, name, &text, Some(&extra)) {
                        error!("[{}] Failed to write telemetry: {}", name, e);
                    }
                }
                info!("[{}] finished ({} actions, dry_run={})", name, report.actions, dry_run);
                Outcome {
                    module: name,
                    success: true,
                    text,
                    actions: report.actions,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let extra = json!({
                    "kind": e.kind(),
                    "detail": format!("{:?}", e),
                    "dry_run": dry_run,
                    "mode": mode.to_string(),
                });
                if let Err(log_err) = self.store.log_telemetry(Level::Error, name, &message, Some(&extra)) {
                    error!("[{}] Failed to write telemetry: {}", name, log_err);
                }
                eprintln!("[{}] error: {}", name, message);
                error!("[{}] {}", name, message);
                Outcome {
                    module: name,
                    success: false,
                    text: message,
                    actions: 0,
                }
            }
        }
    }
}
