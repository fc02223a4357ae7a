use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::principal::Role;
use crate::effects::TerminalEffect;

/// A pending step in a routing chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Faculty of the requester's unit.
    PendingFaculty,
    /// UnitHead of the requester's unit.
    PendingUnitHead,
    /// The Administrator, or a DeputyUnitHead while the Administrator is absent.
    PendingAdministrator,
    /// UnitHead of the unit that owns the borrowed faculty member.
    PendingTargetUnitHead,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingFaculty => "pending_faculty",
            Self::PendingUnitHead => "pending_unit_head",
            Self::PendingAdministrator => "pending_administrator",
            Self::PendingTargetUnitHead => "pending_target_unit_head",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending_faculty" => Some(Self::PendingFaculty),
            "pending_unit_head" => Some(Self::PendingUnitHead),
            "pending_administrator" => Some(Self::PendingAdministrator),
            "pending_target_unit_head" => Some(Self::PendingTargetUnitHead),
            _ => None,
        }
    }

    pub fn acting_role(&self) -> Role {
        match self {
            Self::PendingFaculty => Role::Faculty,
            Self::PendingUnitHead | Self::PendingTargetUnitHead => Role::UnitHead,
            Self::PendingAdministrator => Role::Administrator,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequestStatus {
    Pending(Stage),
    Approved,
    Rejected,
    Revoked,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending(stage) => stage.as_str(),
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "revoked" => Some(Self::Revoked),
            other => Stage::parse(other).map(Self::Pending),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pending(stage) => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RequestStatus> for String {
    fn from(value: RequestStatus) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown request status `{value}`"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Approve,
    Reject,
    Revoke,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Revoke => "revoke",
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "revoke" => Ok(Self::Revoke),
            other => Err(format!("unsupported action `{other}` (expected approve|reject|revoke)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub action: WorkflowAction,
    pub effect: Option<TerminalEffect>,
}

#[cfg(test)]
mod tests {
    use super::{RequestStatus, Stage, WorkflowAction};

    #[test]
    fn status_strings_parse_back() {
        for status in [
            RequestStatus::Pending(Stage::PendingFaculty),
            RequestStatus::Pending(Stage::PendingTargetUnitHead),
            RequestStatus::Approved,
            RequestStatus::Revoked,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("pending"), None);
    }

    #[test]
    fn status_serializes_as_flat_string() {
        let json = serde_json::to_string(&RequestStatus::Pending(Stage::PendingUnitHead))
            .expect("serialize status");
        assert_eq!(json, "\"pending_unit_head\"");

        let error = serde_json::from_str::<RequestStatus>("\"escalated\"")
            .expect_err("unknown status should fail");
        assert!(error.to_string().contains("escalated"));
    }

    #[test]
    fn only_pending_states_carry_a_stage() {
        assert!(!RequestStatus::Pending(Stage::PendingAdministrator).is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert_eq!(RequestStatus::Approved.stage(), None);
    }

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!("Approve".parse::<WorkflowAction>(), Ok(WorkflowAction::Approve));
        assert!("escalate".parse::<WorkflowAction>().is_err());
    }
}
