use thiserror::Error;

use crate::domain::principal::{PrincipalId, Role};
use crate::domain::request::{RequestId, RequestKind};
use crate::flows::states::{RequestStatus, WorkflowAction};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no routing chain for {kind} requests submitted by {role}")]
    InvalidRequestOrigin { kind: RequestKind, role: Role },
    #[error("request {request_id} is already {status}")]
    AlreadyTerminal { request_id: RequestId, status: RequestStatus },
    #[error("principal {actor} may not {action} request {request_id} at {status}")]
    Unauthorized {
        request_id: RequestId,
        actor: PrincipalId,
        action: WorkflowAction,
        status: RequestStatus,
    },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("request {request_id} was modified concurrently (expected version {expected_version})")]
    PersistenceConflict { request_id: RequestId, expected_version: u32 },
    #[error("request {0} not found")]
    RequestNotFound(RequestId),
    #[error("principal {0} is unknown or inactive")]
    UnknownPrincipal(PrincipalId),
    #[error("principal directory failure: {0}")]
    Directory(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("workflow invariant violation: {0}")]
    InvariantViolation(String),
}

impl WorkflowError {
    /// Stable snake_case class used in audit metadata and CLI output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidRequestOrigin { .. } => "invalid_request_origin",
            Self::AlreadyTerminal { .. } => "already_terminal",
            Self::Unauthorized { .. } => "unauthorized",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::PersistenceConflict { .. } => "persistence_conflict",
            Self::RequestNotFound(_) => "request_not_found",
            Self::UnknownPrincipal(_) => "unknown_principal",
            Self::Directory(_) => "directory",
            Self::Persistence(_) => "persistence",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to act on this request right now.",
            Self::Conflict { .. } => {
                "The request changed while you were acting on it. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            WorkflowError::InvalidRequestOrigin { .. }
            | WorkflowError::MalformedPayload(_)
            | WorkflowError::RequestNotFound(_)
            | WorkflowError::UnknownPrincipal(_) => Self::BadRequest { message, correlation_id },
            WorkflowError::Unauthorized { .. } => Self::Forbidden { message, correlation_id },
            WorkflowError::AlreadyTerminal { .. } | WorkflowError::PersistenceConflict { .. } => {
                Self::Conflict { message, correlation_id }
            }
            WorkflowError::Persistence(_) => Self::ServiceUnavailable { message, correlation_id },
            WorkflowError::Directory(_) | WorkflowError::InvariantViolation(_) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}
