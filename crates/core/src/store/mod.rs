//! Persistence ports consumed by the workflow service.
//!
//! Every implementation must commit a transition and its terminal effect as
//! one unit and refuse a transition whose `expected_version` is stale.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::allotment::Allotment;
use crate::domain::principal::{LeaveBalance, Principal, PrincipalId, Role, UnitId};
use crate::domain::request::{RequestId, WorkflowRequest};
use crate::effects::TerminalEffect;
use crate::errors::WorkflowError;
use crate::flows::states::{RequestStatus, WorkflowAction};

pub use memory::InMemoryWorkflowStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("request {request_id} no longer at version {expected_version}")]
    Conflict { request_id: RequestId, expected_version: u32 },
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
    #[error("unit `{unit}` has {count} active administrators, expected exactly one")]
    AmbiguousAdministrator { unit: UnitId, count: usize },
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { request_id, expected_version } => {
                Self::PersistenceConflict { request_id, expected_version }
            }
            StoreError::AmbiguousAdministrator { .. } => Self::Directory(error.to_string()),
            StoreError::Duplicate(_) | StoreError::Backend(_) | StoreError::Decode(_) => {
                Self::Persistence(error.to_string())
            }
        }
    }
}

/// One row of a request's append-only transition history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub action: WorkflowAction,
    pub actor_id: PrincipalId,
    /// Request version after this transition.
    pub version: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionCommit {
    pub request: WorkflowRequest,
    pub expected_version: u32,
    pub record: TransitionRecord,
    pub effect: Option<TerminalEffect>,
}

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_principal(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError>;

    /// Active principals holding `role`, optionally restricted to one unit.
    async fn list_principals(
        &self,
        role: Role,
        unit: Option<&UnitId>,
    ) -> Result<Vec<Principal>, StoreError>;

    /// The single active Administrator of the administrative unit. An
    /// Administrator recorded without a unit counts as belonging to it.
    ///
    /// More than one is a directory misconfiguration and yields
    /// [`StoreError::AmbiguousAdministrator`].
    async fn administrator(&self, unit: &UnitId) -> Result<Option<Principal>, StoreError>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persists a new request. A request born `Approved` carries its effect.
    async fn insert_request(
        &self,
        request: &WorkflowRequest,
        effect: Option<&TerminalEffect>,
    ) -> Result<(), StoreError>;

    async fn find_request(&self, id: &RequestId) -> Result<Option<WorkflowRequest>, StoreError>;

    async fn has_approved_leave_covering(
        &self,
        principal_id: &PrincipalId,
        day: NaiveDate,
    ) -> Result<bool, StoreError>;

    async fn list_pending(&self) -> Result<Vec<WorkflowRequest>, StoreError>;

    async fn commit_transition(&self, commit: TransitionCommit)
        -> Result<WorkflowRequest, StoreError>;

    async fn transitions(&self, id: &RequestId) -> Result<Vec<TransitionRecord>, StoreError>;
}

#[async_trait]
pub trait LeaveBalanceStore: Send + Sync {
    async fn balance(&self, principal_id: &PrincipalId) -> Result<Option<LeaveBalance>, StoreError>;
}

#[async_trait]
pub trait AllotmentStore: Send + Sync {
    async fn allotments_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Allotment>, StoreError>;

    async fn allotments_for_faculty(
        &self,
        faculty_id: &PrincipalId,
    ) -> Result<Vec<Allotment>, StoreError>;
}

/// Everything the workflow service needs from persistence.
pub trait WorkflowStore:
    PrincipalDirectory + RequestStore + LeaveBalanceStore + AllotmentStore
{
}

impl<T> WorkflowStore for T where
    T: PrincipalDirectory + RequestStore + LeaveBalanceStore + AllotmentStore
{
}
