mod secrets;
mod settings;
mod telemetry;

pub use secrets::{Secrets, SecretsPatch};
pub use settings::{
    Mode, RunOverrides, Settings, DEFAULT_LOOP_INTERVAL_AR, DEFAULT_LOOP_INTERVAL_AUTOFEE,
    DEFAULT_LOOP_INTERVAL_TUNER,
};
pub use telemetry::{Level, TelemetryRecord};
