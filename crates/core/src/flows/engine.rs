use chrono::{DateTime, Utc};

use crate::approvals::AuthorizedActors;
use crate::audit::{
    AuditCategory, AuditContext, AuditOutcome, AuditSink, TRANSITION_APPLIED, TRANSITION_REJECTED,
};
use crate::domain::principal::PrincipalId;
use crate::domain::request::WorkflowRequest;
use crate::effects::SideEffectApplier;
use crate::errors::WorkflowError;
use crate::flows::states::{RequestStatus, Stage, TransitionOutcome, WorkflowAction};

/// The request state machine.
///
/// `apply` is pure: it decides the next status and computes the terminal
/// effect, but persisting both is the caller's job.
#[derive(Clone, Debug, Default)]
pub struct ApprovalEngine {
    effects: SideEffectApplier,
}

impl ApprovalEngine {
    pub fn new(effects: SideEffectApplier) -> Self {
        Self { effects }
    }

    pub fn effects(&self) -> &SideEffectApplier {
        &self.effects
    }

    pub fn apply(
        &self,
        request: &WorkflowRequest,
        actor: &PrincipalId,
        action: WorkflowAction,
        authorized: &AuthorizedActors,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let stage = match request.status {
            RequestStatus::Pending(stage) => stage,
            status => {
                return Err(WorkflowError::AlreadyTerminal {
                    request_id: request.id.clone(),
                    status,
                })
            }
        };
        if !request.chain.admits(request.status) {
            return Err(WorkflowError::InvariantViolation(format!(
                "request {} holds {} outside its chain",
                request.id, request.status
            )));
        }
        if action != WorkflowAction::Revoke && !authorized.stages.contains(&stage) {
            return Err(WorkflowError::InvariantViolation(format!(
                "authorized set for {:?} used to act on {stage}",
                authorized.stages
            )));
        }
        if !authorized.contains(actor) {
            return Err(WorkflowError::Unauthorized {
                request_id: request.id.clone(),
                actor: actor.clone(),
                action,
                status: request.status,
            });
        }

        let (to, effect) = match action {
            WorkflowAction::Reject => (RequestStatus::Rejected, None),
            WorkflowAction::Revoke => (RequestStatus::Revoked, None),
            WorkflowAction::Approve => {
                let to = next_status(request, stage)?;
                let effect = if to == RequestStatus::Approved {
                    Some(self.effects.on_approved(request, now)?)
                } else {
                    None
                };
                (to, effect)
            }
        };

        Ok(TransitionOutcome { from: request.status, to, action, effect })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply_with_audit<S>(
        &self,
        request: &WorkflowRequest,
        actor: &PrincipalId,
        action: WorkflowAction,
        authorized: &AuthorizedActors,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(request, actor, action, authorized, now);
        if let Err(error) = &result {
            sink.emit(
                audit
                    .event(TRANSITION_REJECTED, AuditCategory::Flow, AuditOutcome::Rejected)
                    .with_metadata("action", action.as_str())
                    .with_metadata("status", request.status.as_str())
                    .with_metadata("error_class", error.class())
                    .with_metadata("error", error.to_string()),
            );
        }
        result
    }

    /// Emits the event for a transition the store has accepted.
    pub fn record_applied<S>(
        &self,
        outcome: &TransitionOutcome,
        delegated: bool,
        sink: &S,
        audit: &AuditContext,
    ) where
        S: AuditSink + ?Sized,
    {
        let mut event = audit
            .event(TRANSITION_APPLIED, AuditCategory::Flow, AuditOutcome::Success)
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("action", outcome.action.as_str())
            .with_metadata("delegated", delegated.to_string());
        if let Some(effect) = &outcome.effect {
            event = event.with_metadata("effect", effect.describe());
        }
        sink.emit(event);
    }
}

fn next_status(request: &WorkflowRequest, stage: Stage) -> Result<RequestStatus, WorkflowError> {
    request.chain.next_after(stage).ok_or_else(|| {
        WorkflowError::InvariantViolation(format!(
            "stage {stage} is not part of the chain of request {}",
            request.id
        ))
    })
}
