//! Vocabulary shared by the capture stores, the action registry and the tools.

pub mod domain;
pub mod error;
pub mod events;

pub use domain::{ActionId, ScopeId, Severity, SortOrder};
pub use error::ParseError;
pub use events::{now_millis, AnalyticsEvent, LogEvent, NetworkEvent, Timestamped};
