pub mod credit;
pub mod engine;
pub mod rules;

pub use engine::*;
