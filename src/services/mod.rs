pub mod accounts;
pub mod activity;
pub mod assets;
pub mod membership;
pub mod organizations;
pub mod plan_gate;
pub mod projects;
pub mod sync;

pub use activity::{ActivityDispatcher, ActivityEvent};
pub use plan_gate::{LimitExceeded, QuotaDimension};
