//! Data models for llmgate

mod alert;
mod cost;
mod metrics;
mod request;

pub use alert::*;
pub use cost::*;
pub use metrics::*;
pub use request::*;
