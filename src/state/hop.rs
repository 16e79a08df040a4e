use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Marker written in place of an address for hops that never answered
///
/// Responder identities are IP addresses, so no resolved hop can collide
/// with it: a serialized `"*"` always reads back as [`HopFinal::Dark`].
pub const DARK_SENTINEL: &str = "*";

/// Outcome of a decided hop
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HopFinal {
    /// Locked to a responder identity
    Resolved(String),
    /// Judged unresponsive
    Dark,
}

impl HopFinal {
    pub fn is_dark(&self) -> bool {
        matches!(self, Self::Dark)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Resolved(ip) => ip,
            Self::Dark => DARK_SENTINEL,
        }
    }
}

impl fmt::Display for HopFinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HopFinal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HopFinal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == DARK_SENTINEL {
            Ok(Self::Dark)
        } else {
            Ok(Self::Resolved(s))
        }
    }
}

/// Sightings per responder, kept in first-seen order
///
/// The ordering is what makes tie-breaking reproducible: among responders
/// sharing the top count, the one observed first wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponderCounts {
    entries: Vec<(String, u32)>,
}

impl ResponderCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more sighting of `ip`, returning its new total
    pub fn increment(&mut self, ip: &str) -> u32 {
        if let Some((_, count)) = self.entries.iter_mut().find(|(k, _)| k == ip) {
            *count += 1;
            return *count;
        }
        self.entries.push((ip.to_string(), 1));
        1
    }

    pub fn get(&self, ip: &str) -> u32 {
        self.entries
            .iter()
            .find(|(k, _)| k == ip)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    /// Highest count seen for any responder (0 when empty)
    pub fn max_count(&self) -> u32 {
        self.entries.iter().map(|(_, c)| *c).max().unwrap_or(0)
    }

    /// Most frequent responder; ties go to the earliest first-seen
    pub fn top(&self) -> Option<&str> {
        let mut best: Option<&(String, u32)> = None;
        for entry in &self.entries {
            // strict > keeps the earlier entry on ties
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best.map(|(ip, _)| ip.as_str())
    }

    /// Number of distinct responders
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), *c))
    }
}

impl Serialize for ResponderCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (ip, count) in &self.entries {
            map.serialize_entry(ip, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResponderCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountsVisitor;

        impl<'de> Visitor<'de> for CountsVisitor {
            type Value = ResponderCounts;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of responder address to sighting count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((ip, count)) = access.next_entry::<String, u32>()? {
                    entries.push((ip, count));
                }
                Ok(ResponderCounts { entries })
            }
        }

        deserializer.deserialize_map(CountsVisitor)
    }
}

/// Probing progress and outcome for one TTL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopState {
    pub ttl: u8,
    /// None while undecided
    #[serde(rename = "final")]
    pub final_hop: Option<HopFinal>,
    pub counts: ResponderCounts,
    pub timeouts: u32,
    pub attempts: u32,
    /// Set when a responder was locked by confidence or destination match
    #[serde(default)]
    pub confident: bool,
    pub base_cap: u32,
    pub dyn_cap: u32,
    /// Credits deposited into the pool when this hop concluded
    pub pool_in: u32,
    /// Credits withdrawn from the pool when this hop concluded
    pub pool_out: u32,
}

impl HopState {
    pub fn new(ttl: u8) -> Self {
        Self {
            ttl,
            final_hop: None,
            counts: ResponderCounts::new(),
            timeouts: 0,
            attempts: 0,
            confident: false,
            base_cap: 0,
            dyn_cap: 0,
            pool_in: 0,
            pool_out: 0,
        }
    }

    pub fn is_decided(&self) -> bool {
        self.final_hop.is_some() || self.confident
    }

    /// Record a reply from `ip`
    pub fn record_reply(&mut self, ip: &str) {
        self.counts.increment(ip);
    }

    /// Record a probe that produced no usable reply
    pub fn record_timeout(&mut self) {
        self.timeouts += 1;
    }

    /// Lock the hop to a responder
    pub fn resolve(&mut self, ip: &str) {
        debug_assert!(self.final_hop.is_none(), "hop {} decided twice", self.ttl);
        self.final_hop = Some(HopFinal::Resolved(ip.to_string()));
        self.confident = true;
    }

    /// Lock the hop as unresponsive
    pub fn mark_dark(&mut self) {
        debug_assert!(self.final_hop.is_none(), "hop {} decided twice", self.ttl);
        self.final_hop = Some(HopFinal::Dark);
    }

    /// Whether this hop counts as noisy for the hop after it
    pub fn is_noisy(&self) -> bool {
        self.final_hop.as_ref().is_some_and(HopFinal::is_dark) || self.timeouts >= 2
    }
}
