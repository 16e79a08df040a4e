//! Scripted prober for tests and offline demos.
//!
//! Replies are queued per `(ttl, flow_id)`; once a queue is drained (or a key
//! was never scripted) every further probe times out.

use std::collections::{HashMap, VecDeque};

use super::{ProbeEvent, ProbeStatus, Prober};

const SCRIPTED_PROTOCOL: &str = "scripted";

/// Key for a scripted reply queue: (ttl, flow_id)
pub type ScriptKey = (u8, u16);

/// A probe the scripted prober was asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCall {
    pub dest: String,
    pub ttl: u8,
    pub flow_id: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProber {
    script: HashMap<ScriptKey, VecDeque<ProbeEvent>>,
    calls: Vec<ProbeCall>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `(ttl, flow_id)`
    pub fn push(&mut self, ttl: u8, flow_id: u16, event: ProbeEvent) -> &mut Self {
        self.script.entry((ttl, flow_id)).or_default().push_back(event);
        self
    }

    /// Queue a Time Exceeded reply from `ip`
    pub fn push_reply(&mut self, ttl: u8, flow_id: u16, ip: &str) -> &mut Self {
        let event = ProbeEvent::reply("", ttl, flow_id, ProbeStatus::TtlExceeded, ip);
        self.push(ttl, flow_id, event)
    }

    /// Queue an explicit timeout (useful ahead of later replies)
    pub fn push_timeout(&mut self, ttl: u8, flow_id: u16) -> &mut Self {
        let mut event = ProbeEvent::timeout("", ttl, flow_id, SCRIPTED_PROTOCOL);
        event.timestamp = None;
        self.push(ttl, flow_id, event)
    }

    /// Queue a destination reply from `ip`
    pub fn push_dest(&mut self, ttl: u8, flow_id: u16, ip: &str) -> &mut Self {
        let event = ProbeEvent::reply("", ttl, flow_id, ProbeStatus::DestReached, ip);
        self.push(ttl, flow_id, event)
    }

    /// Demo path: `hops` routers 10.0.0.1.. then the destination, on flow 0
    pub fn linear_path(dest: &str, hops: u8) -> Self {
        let mut prober = Self::new();
        for ttl in 1..=hops {
            let ip = format!("10.0.0.{}", ttl);
            let event = ProbeEvent::reply(dest, ttl, 0, ProbeStatus::TtlExceeded, &ip)
                .with_rtt(10.0 + ttl as f64);
            prober.push(ttl, 0, event);
        }
        let last = hops.saturating_add(1);
        let event = ProbeEvent::reply(dest, last, 0, ProbeStatus::DestReached, dest)
            .with_rtt(10.0 + last as f64);
        prober.push(last, 0, event);
        prober
    }

    /// Every probe sent so far, in order
    pub fn calls(&self) -> &[ProbeCall] {
        &self.calls
    }
}

impl Prober for ScriptedProber {
    async fn probe_once(&mut self, dest: &str, ttl: u8, flow_id: u16) -> ProbeEvent {
        self.calls.push(ProbeCall {
            dest: dest.to_string(),
            ttl,
            flow_id,
        });

        let mut event = self
            .script
            .get_mut(&(ttl, flow_id))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                let mut ev = ProbeEvent::timeout(dest, ttl, flow_id, SCRIPTED_PROTOCOL);
                // keep summaries reproducible
                ev.timestamp = None;
                ev
            });

        event.target = dest.to_string();
        event.ttl = ttl;
        event.flow_id = flow_id;
        if event.protocol.is_empty() {
            event.protocol = SCRIPTED_PROTOCOL.to_string();
        }
        event
    }
}
