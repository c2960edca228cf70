//! Behavioral supervisor: pattern table, anomaly predicates, and
//! intervention mapping (§4.D Supervisor).

pub mod manager;
pub mod types;

pub use manager::{Supervisor, SupervisorSnapshot};
pub use types::{
    recommended_actions, AnomalyKind, AnomalyRecord, BehaviorPattern, InterventionAction, Sample, Trend,
};
