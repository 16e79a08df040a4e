pub mod event;
pub mod scamper;
pub mod scripted;

pub use event::*;
pub use scamper::*;
pub use scripted::*;

use std::future::Future;

/// Single-probe capability consumed by the budget controller
///
/// Implementations must always produce an event: transport and tool failures
/// are reported as [`ProbeStatus::Timeout`] with detail in `raw`.
pub trait Prober {
    fn probe_once(
        &mut self,
        dest: &str,
        ttl: u8,
        flow_id: u16,
    ) -> impl Future<Output = ProbeEvent> + Send;
}
