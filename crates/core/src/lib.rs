pub mod approvals;
pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod effects;
pub mod errors;
pub mod flows;
pub mod service;
pub mod store;

pub use approvals::{AuthorizedActors, DelegationResolver};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::allotment::{Allotment, AllotmentId};
pub use domain::principal::{LeaveBalance, Principal, PrincipalId, Role, UnitId};
pub use domain::request::{
    AssignmentPayload, LeavePayload, RequestId, RequestKind, RequestPayload, Requester,
    WorkflowRequest,
};
pub use effects::{SideEffectApplier, TerminalEffect};
pub use errors::{InterfaceError, WorkflowError};
pub use flows::{
    ApprovalEngine, RequestStatus, RoutingChain, Stage, TransitionOutcome, WorkflowAction,
};
pub use service::{StageReport, WorkflowService, WorkflowSettings};
pub use store::{
    AllotmentStore, InMemoryWorkflowStore, LeaveBalanceStore, PrincipalDirectory, RequestStore,
    StoreError, TransitionCommit, TransitionRecord, WorkflowStore,
};
