//! Scenario-based tests for packline

mod helpers;

mod failure_handling;
mod orchestration;
mod plugin_ordering;
mod watch_mode;
