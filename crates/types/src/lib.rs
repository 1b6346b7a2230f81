pub mod auction;
pub mod error;
pub mod settlement;
pub mod transaction;

pub use auction::*;
pub use error::*;
pub use settlement::*;
pub use transaction::*;

pub const PROTOCOL_VERSION: &str = "1.0";

/// Wall-clock milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
