//! Disruption engine (§4.4-§4.7): candidate selection, pluggable disruption
//! methods, and the command queue that executes the method's choice.

pub mod candidate;
pub mod command;
pub mod eviction;
pub mod methods;
pub mod orchestrator;

pub use candidate::{Candidate, Class};
pub use command::{Command, CommandQueue, CommandState};
pub use orchestrator::run_once;

use karpenter_api::DisruptionReason;

/// Interface every disruption strategy implements (§4.5). Registered in a
/// fixed priority-ordered list by the orchestrator; never dynamically
/// dispatched by name.
pub trait DisruptionMethod: Send + Sync {
    fn should_disrupt(&self, candidate: &Candidate) -> bool;
    fn reason(&self) -> DisruptionReason;
    fn class(&self) -> Class;
    fn consolidation_type(&self) -> &'static str;
}
