//! Routing chains: which stages a request visits before it is approved.
//!
//! The chain is a pure lookup on `(kind, requester role)`. It is computed once
//! at submission and stored on the request, so later role changes never alter
//! an in-flight request.

use serde::{Deserialize, Serialize};

use crate::domain::principal::Role;
use crate::domain::request::RequestKind;
use crate::errors::WorkflowError;
use crate::flows::states::{RequestStatus, Stage};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingChain {
    stages: Vec<Stage>,
}

impl RoutingChain {
    pub fn for_origin(kind: RequestKind, role: Role) -> Result<Self, WorkflowError> {
        use Stage::{PendingAdministrator, PendingFaculty, PendingTargetUnitHead, PendingUnitHead};

        let stages = match (kind, role) {
            (RequestKind::Leave, Role::Student) => vec![PendingFaculty, PendingUnitHead],
            (RequestKind::Leave, Role::Faculty) => vec![PendingUnitHead, PendingAdministrator],
            (RequestKind::Leave, Role::UnitHead) | (RequestKind::Leave, Role::DeputyUnitHead) => {
                vec![PendingAdministrator]
            }
            (RequestKind::Leave, Role::Administrator) => Vec::new(),
            (RequestKind::CrossUnitAssignment, Role::UnitHead) => vec![PendingTargetUnitHead],
            (kind, role) => return Err(WorkflowError::InvalidRequestOrigin { kind, role }),
        };

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Status a freshly submitted request starts in.
    pub fn initial_status(&self) -> RequestStatus {
        self.stages.first().map_or(RequestStatus::Approved, |stage| RequestStatus::Pending(*stage))
    }

    /// Status reached by approving `stage`; `None` when the stage is not part of
    /// this chain.
    pub fn next_after(&self, stage: Stage) -> Option<RequestStatus> {
        let position = self.stages.iter().position(|candidate| *candidate == stage)?;
        Some(
            self.stages
                .get(position + 1)
                .map_or(RequestStatus::Approved, |next| RequestStatus::Pending(*next)),
        )
    }

    /// Whether `status` may legally appear on a request carrying this chain.
    pub fn admits(&self, status: RequestStatus) -> bool {
        match status {
            RequestStatus::Pending(stage) => self.contains(stage),
            RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Revoked => true,
        }
    }

    /// Comma-separated stage names, the storage form of a chain.
    pub fn encode(&self) -> String {
        self.stages.iter().map(Stage::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn decode(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return Some(Self { stages: Vec::new() });
        }
        raw.split(',').map(Stage::parse).collect::<Option<Vec<_>>>().map(|stages| Self { stages })
    }
}
