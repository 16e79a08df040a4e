use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on TTLs a run may walk
pub const MAX_SAFE_TTL: u8 = 64;

/// Probe method handed to the underlying probing tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeMethod {
    #[default]
    UdpParis,
    IcmpParis,
    Tcp,
}

impl ProbeMethod {
    /// Name as understood by scamper's `trace -P`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UdpParis => "udp-paris",
            Self::IcmpParis => "icmp-paris",
            Self::Tcp => "tcp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "udp-paris" | "udp" => Some(Self::UdpParis),
            "icmp-paris" | "icmp" => Some(Self::IcmpParis),
            "tcp" => Some(Self::Tcp),
            _ => None,
        }
    }
}

/// Rejected controller settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("max_ttl must be at least 1")]
    ZeroMaxTtl,
    #[error("max_ttl cannot exceed {} (got {})", MAX_SAFE_TTL, .0)]
    MaxTtlTooLarge(u8),
    #[error("per_hop_budget must be at least 1")]
    ZeroPerHopBudget,
    #[error("repeats_needed must be at least 1")]
    ZeroRepeatsNeeded,
    #[error("flow_ids must contain at least one flow identifier")]
    EmptyFlowIds,
    #[error("hard_per_hop_max ({hard}) is below per_hop_budget ({base})")]
    HardMaxBelowBase { hard: u32, base: u32 },
}

/// Budget controller settings, read-only for the duration of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Highest TTL examined
    pub max_ttl: u8,
    /// Static probe ceiling per hop
    pub per_hop_budget: u32,
    /// Sightings of one responder needed to lock a hop
    pub repeats_needed: u32,
    /// Hard cap on probes across the whole run
    pub total_budget: u32,
    /// Flow identifiers cycled round-robin within a hop
    pub flow_ids: Vec<u16>,
    /// Pause between repeated probes of the same hop
    #[serde(rename = "per_probe_delay_s", with = "duration_serde")]
    pub per_probe_delay: Duration,
    /// Most extra credits a single hop may draw from the pool
    pub rollover_cap_per_hop: u32,
    /// Ceiling on a hop's dynamic cap, rollover included
    pub hard_per_hop_max: u32,
    /// Pool balance ceiling
    pub rollover_pool_max: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_ttl: 32,
            per_hop_budget: 6,
            repeats_needed: 2,
            total_budget: 120,
            flow_ids: vec![0, 1],
            per_probe_delay: Duration::from_millis(30),
            rollover_cap_per_hop: 2,
            hard_per_hop_max: 6,
            rollover_pool_max: 10,
        }
    }
}

impl Settings {
    /// Reject settings the controller cannot make progress with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_ttl == 0 {
            return Err(SettingsError::ZeroMaxTtl);
        }
        if self.max_ttl > MAX_SAFE_TTL {
            return Err(SettingsError::MaxTtlTooLarge(self.max_ttl));
        }
        if self.per_hop_budget == 0 {
            return Err(SettingsError::ZeroPerHopBudget);
        }
        if self.repeats_needed == 0 {
            return Err(SettingsError::ZeroRepeatsNeeded);
        }
        if self.flow_ids.is_empty() {
            return Err(SettingsError::EmptyFlowIds);
        }
        if self.hard_per_hop_max < self.per_hop_budget {
            return Err(SettingsError::HardMaxBelowBase {
                hard: self.hard_per_hop_max,
                base: self.per_hop_budget,
            });
        }
        Ok(())
    }
}

/// Options for the scamper-backed prober
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScamperOptions {
    pub method: ProbeMethod,
    /// Retry through `sudo -n` when the plain invocation yields nothing
    pub use_sudo: bool,
    /// Base pacing before each probe (jittered by the prober)
    #[serde(rename = "pace_ms", with = "duration_millis_serde")]
    pub pace: Duration,
    /// Explicit scamper binary; searched on PATH when unset
    pub binary: Option<PathBuf>,
}

impl Default for ScamperOptions {
    fn default() -> Self {
        Self {
            method: ProbeMethod::UdpParis,
            use_sudo: true,
            pace: Duration::from_millis(30),
            binary: None,
        }
    }
}

/// On-disk configuration: `[budget]` and `[scamper]` tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub budget: Settings,
    pub scamper: ScamperOptions,
}

impl FileConfig {
    /// Default config file path: ~/.config/ttl-budget/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ttl-budget").join("config.toml"))
    }

    /// Parse a config file, failing on IO or syntax errors
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Load a config file if present; fall back to defaults otherwise
    pub fn load_optional(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }
}

/// Serde helper for Duration as fractional seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serde helper for Duration as whole milliseconds
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
