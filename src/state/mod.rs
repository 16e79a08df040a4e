pub mod baseline;
pub mod hop;
pub mod run;

pub use baseline::*;
pub use hop::*;
pub use run::*;
