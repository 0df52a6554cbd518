pub mod config;
pub mod controller;
pub mod error;
pub mod extract;
pub mod frontier;
pub mod result;
pub mod rules;
pub mod urls;
mod worker;

pub use config::{FollowPolicy, ScanConfiguration, ScanProfile};
pub use controller::{CounterSnapshot, ScanController, ScanEvent, ScanState};
pub use error::{Result, ScanError};
pub use result::{LinkRecord, LinkStatus, Origin, SkipReason};
pub use rules::{Rule, RuleCondition, RuleScope};
