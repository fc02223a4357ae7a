pub mod chain;
pub mod engine;
pub mod states;

pub use chain::RoutingChain;
pub use engine::ApprovalEngine;
pub use states::{RequestStatus, Stage, TransitionOutcome, WorkflowAction};
