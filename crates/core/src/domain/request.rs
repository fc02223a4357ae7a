use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::principal::{Principal, PrincipalId, Role, UnitId};
use crate::errors::WorkflowError;
use crate::flows::chain::RoutingChain;
use crate::flows::states::{RequestStatus, Stage, TransitionOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(format!("REQ-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Leave,
    CrossUnitAssignment,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::CrossUnitAssignment => "cross_unit_assignment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Some(Self::Leave),
            "cross_unit_assignment" => Some(Self::CrossUnitAssignment),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePayload {
    pub leave_type: String,
    pub reason: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl LeavePayload {
    /// Inclusive number of calendar days in the range.
    pub fn day_count(&self) -> u32 {
        let span = (self.end_date - self.start_date).num_days() + 1;
        u32::try_from(span).unwrap_or(0)
    }

    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        require_text("leave_type", &self.leave_type)?;
        require_text("reason", &self.reason)?;
        if self.end_date < self.start_date {
            return Err(WorkflowError::MalformedPayload(format!(
                "leave ends on {} before it starts on {}",
                self.end_date, self.start_date
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub faculty_id: PrincipalId,
    pub subject: String,
    pub class_name: String,
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

impl AssignmentPayload {
    fn validate(&self) -> Result<(), WorkflowError> {
        require_text("faculty_id", &self.faculty_id.0)?;
        require_text("subject", &self.subject)?;
        require_text("class_name", &self.class_name)?;
        require_text("section", &self.section)?;
        if self.semester == Some(0) {
            return Err(WorkflowError::MalformedPayload("semester must be positive".to_owned()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    Leave(LeavePayload),
    CrossUnitAssignment(AssignmentPayload),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Leave(_) => RequestKind::Leave,
            Self::CrossUnitAssignment(_) => RequestKind::CrossUnitAssignment,
        }
    }

    /// Field-level completeness; cross-record checks live in the service.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self {
            Self::Leave(leave) => leave.validate(),
            Self::CrossUnitAssignment(assignment) => assignment.validate(),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        return Err(WorkflowError::MalformedPayload(format!("{field} is required")));
    }
    Ok(())
}

/// Requester identity as it was when the request was submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: PrincipalId,
    pub role: Role,
    pub unit: Option<UnitId>,
}

impl From<&Principal> for Requester {
    fn from(principal: &Principal) -> Self {
        Self { id: principal.id.clone(), role: principal.role, unit: principal.unit.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub id: RequestId,
    pub requester: Requester,
    pub payload: RequestPayload,
    pub chain: RoutingChain,
    /// Unit whose principals staff the unit-local stages: the requester's unit
    /// for leave, the borrowed faculty member's unit for assignments.
    pub scope_unit: Option<UnitId>,
    pub status: RequestStatus,
    /// Bumped on every committed transition; the compare-and-swap token.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<PrincipalId>,
}

impl WorkflowRequest {
    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.status.stage()
    }

    pub fn leave(&self) -> Option<&LeavePayload> {
        match &self.payload {
            RequestPayload::Leave(leave) => Some(leave),
            RequestPayload::CrossUnitAssignment(_) => None,
        }
    }

    pub fn assignment(&self) -> Option<&AssignmentPayload> {
        match &self.payload {
            RequestPayload::CrossUnitAssignment(assignment) => Some(assignment),
            RequestPayload::Leave(_) => None,
        }
    }

    /// The request as it looks once `outcome` has been committed.
    pub fn advanced(
        &self,
        outcome: &TransitionOutcome,
        actor: &PrincipalId,
        now: DateTime<Utc>,
    ) -> WorkflowRequest {
        let mut next = self.clone();
        next.status = outcome.to;
        next.version = self.version + 1;
        if outcome.to.is_terminal() {
            next.resolved_at = Some(now);
            next.resolved_by = Some(actor.clone());
        }
        next
    }
}
