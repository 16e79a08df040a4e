use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// Intermediate router answered with ICMP Time Exceeded
    TtlExceeded,
    /// Destination-style reply (port unreachable, echo reply, SYN-ACK)
    DestReached,
    /// Some other unreachable message
    Unreach,
    /// Nothing usable came back
    Timeout,
}

/// What a prober reports for one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeEvent {
    pub target: String,
    pub ttl: u8,
    pub flow_id: u16,
    pub protocol: String,
    pub status: ProbeStatus,
    pub hop_ip: Option<String>,
    pub rtt_ms: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque tool output kept for debugging only
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ProbeEvent {
    /// A silent probe
    pub fn timeout(target: &str, ttl: u8, flow_id: u16, protocol: &str) -> Self {
        Self {
            target: target.to_string(),
            ttl,
            flow_id,
            protocol: protocol.to_string(),
            status: ProbeStatus::Timeout,
            hop_ip: None,
            rtt_ms: None,
            timestamp: Some(Utc::now()),
            raw: serde_json::Value::Null,
        }
    }

    /// A reply from `hop_ip` with the given status
    pub fn reply(target: &str, ttl: u8, flow_id: u16, status: ProbeStatus, hop_ip: &str) -> Self {
        Self {
            target: target.to_string(),
            ttl,
            flow_id,
            protocol: String::new(),
            status,
            hop_ip: Some(hop_ip.to_string()),
            rtt_ms: None,
            timestamp: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_rtt(mut self, rtt_ms: f64) -> Self {
        self.rtt_ms = Some(rtt_ms);
        self
    }

    /// Responder identity if this event counts as a reply
    ///
    /// Only Time Exceeded and destination replies carrying an address count;
    /// everything else is silence to the controller.
    pub fn usable_hop(&self) -> Option<&str> {
        match self.status {
            ProbeStatus::TtlExceeded | ProbeStatus::DestReached => {
                self.hop_ip.as_deref().filter(|ip| !ip.is_empty())
            }
            ProbeStatus::Unreach | ProbeStatus::Timeout => None,
        }
    }
}
