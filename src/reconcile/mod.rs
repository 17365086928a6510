//! Payment reconciliation: turns redirect and webhook notifications into one
//! deduplicated payment record per provider payment id.

mod engine;
mod notification;

pub use engine::*;
pub use notification::*;
