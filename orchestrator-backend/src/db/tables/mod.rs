//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

pub mod exclusions;   // exclusions, forced_sources
mod meta;             // meta (version markers)
pub mod namespaces;   // namespaces, namespace_entries
mod secrets;          // secrets (singleton row)
mod series_cache;     // amboss_series
mod settings;         // settings JSON stored under meta
mod telemetry;        // telemetry_log
