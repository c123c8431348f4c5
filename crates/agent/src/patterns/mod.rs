//! Ready-made strategies beyond the default single run.

pub mod planner;

pub use planner::{Plan, PlanDecision, PlanStep, PlannerConfig, PlannerState, planner_strategy};

#[cfg(any(test, feature = "testing"))]
pub mod test_helpers;
