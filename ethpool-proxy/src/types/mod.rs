//! Small value types shared across the proxy.

mod difficulty;
mod submit_rate;

pub use difficulty::Difficulty;
pub use submit_rate::SubmitRate;
