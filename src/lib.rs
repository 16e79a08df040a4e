// Public API - settings, probers, controller, run state and exports
pub mod config;
pub mod export;
pub mod probe;
pub mod state;
pub mod trace;

pub use config::{FileConfig, ProbeMethod, ScamperOptions, Settings, SettingsError};
pub use probe::{ProbeEvent, ProbeStatus, Prober, ScamperProber, ScriptedProber};
pub use state::{BaselineSummary, HopFinal, HopState, StopReason, TraceSummary};
pub use trace::BudgetController;
