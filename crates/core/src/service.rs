//! The workflow façade: `submit` and `act`, plus read-side reports.
//!
//! Each call resolves authority against live directory and leave state, runs
//! the pure engine, then hands the result to the store as one versioned
//! commit. Nothing is retried here; a lost race surfaces as
//! [`WorkflowError::PersistenceConflict`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::approvals::{AuthorizedActors, DelegationResolver};
use crate::audit::{
    AuditCategory, AuditContext, AuditOutcome, AuditSink, TracingAuditSink, REQUEST_SUBMITTED,
    STAGE_REPORT_FAILED, STAGE_UNACTIONABLE, TRANSITION_REJECTED,
};
use crate::clock::{Clock, SystemClock};
use crate::config::WorkflowConfig;
use crate::domain::allotment::Allotment;
use crate::domain::principal::{LeaveBalance, Principal, PrincipalId, Role, UnitId};
use crate::domain::request::{RequestId, RequestPayload, Requester, WorkflowRequest};
use crate::errors::WorkflowError;
use crate::flows::chain::RoutingChain;
use crate::flows::engine::ApprovalEngine;
use crate::flows::states::{RequestStatus, Stage, WorkflowAction};
use crate::store::{TransitionCommit, TransitionRecord, WorkflowStore};

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub administrative_unit: UnitId,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { administrative_unit: UnitId("administration".to_owned()) }
    }
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self { administrative_unit: config.administrative_unit_id() }
    }
}

/// Who may act on a request right now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub stage: Option<Stage>,
    pub actors: AuthorizedActors,
    /// Pending with nobody able to act. Such a request waits until the
    /// directory or leave records change; it is never escalated.
    pub unactionable: bool,
}

pub struct WorkflowService<S, A = TracingAuditSink, C = SystemClock> {
    store: Arc<S>,
    audit: A,
    clock: C,
    engine: ApprovalEngine,
    settings: WorkflowSettings,
}

impl<S> WorkflowService<S, TracingAuditSink, SystemClock>
where
    S: WorkflowStore,
{
    pub fn new(store: Arc<S>, settings: WorkflowSettings) -> Self {
        Self::with_parts(store, TracingAuditSink, SystemClock, settings)
    }
}

impl<S, A, C> WorkflowService<S, A, C>
where
    S: WorkflowStore,
    A: AuditSink,
    C: Clock,
{
    pub fn with_parts(store: Arc<S>, audit: A, clock: C, settings: WorkflowSettings) -> Self {
        Self { store, audit, clock, engine: ApprovalEngine::default(), settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn resolver(&self) -> DelegationResolver<'_, S, S> {
        DelegationResolver::new(
            self.store.as_ref(),
            self.store.as_ref(),
            &self.settings.administrative_unit,
        )
    }

    pub async fn submit(
        &self,
        requester_id: &PrincipalId,
        payload: RequestPayload,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let correlation_id = new_correlation_id();
        let span = tracing::info_span!(
            "workflow.submit",
            correlation_id = %correlation_id,
            requester = %requester_id,
            kind = %payload.kind()
        );
        self.submit_inner(requester_id, payload, &correlation_id).instrument(span).await
    }

    async fn submit_inner(
        &self,
        requester_id: &PrincipalId,
        payload: RequestPayload,
        correlation_id: &str,
    ) -> Result<WorkflowRequest, WorkflowError> {
        payload.validate()?;
        let requester = self.active_principal(requester_id).await?;
        let kind = payload.kind();
        let chain = RoutingChain::for_origin(kind, requester.role)?;
        if requester.role.is_unit_scoped() && requester.unit.is_none() {
            return Err(WorkflowError::Directory(format!(
                "principal {} has role {} but no unit affiliation",
                requester.id, requester.role
            )));
        }
        let scope_unit = self.scope_for(&requester, &payload).await?;

        let now = self.clock.now();
        let status = chain.initial_status();
        let mut request = WorkflowRequest {
            id: RequestId::generate(),
            requester: Requester::from(&requester),
            payload,
            chain,
            scope_unit,
            status,
            version: 1,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
        };

        let effect = if status == RequestStatus::Approved {
            request.resolved_at = Some(now);
            request.resolved_by = Some(requester.id.clone());
            Some(self.engine.effects().on_approved(&request, now)?)
        } else {
            None
        };

        self.store.insert_request(&request, effect.as_ref()).await?;

        let audit =
            AuditContext::new(Some(request.id.clone()), correlation_id, requester.id.0.clone());
        let mut event = audit
            .event(REQUEST_SUBMITTED, AuditCategory::Submission, AuditOutcome::Success)
            .with_metadata("kind", kind.as_str())
            .with_metadata("status", request.status.as_str())
            .with_metadata("chain", request.chain.encode());
        if let Some(effect) = &effect {
            event = event.with_metadata("effect", effect.describe());
        }
        self.audit.emit(event);
        info!(
            event_name = REQUEST_SUBMITTED,
            request_id = %request.id,
            status = %request.status,
            "request submitted"
        );

        self.report_if_unactionable(&request, &audit).await;
        Ok(request)
    }

    pub async fn act(
        &self,
        request_id: &RequestId,
        actor_id: &PrincipalId,
        action: WorkflowAction,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let correlation_id = new_correlation_id();
        let span = tracing::info_span!(
            "workflow.act",
            correlation_id = %correlation_id,
            request_id = %request_id,
            actor = %actor_id,
            action = %action
        );
        self.act_inner(request_id, actor_id, action, &correlation_id).instrument(span).await
    }

    async fn act_inner(
        &self,
        request_id: &RequestId,
        actor_id: &PrincipalId,
        action: WorkflowAction,
        correlation_id: &str,
    ) -> Result<WorkflowRequest, WorkflowError> {
        let audit =
            AuditContext::new(Some(request_id.clone()), correlation_id, actor_id.0.clone());
        let request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(|| WorkflowError::RequestNotFound(request_id.clone()))?;

        let known_actor = self
            .store
            .find_principal(actor_id)
            .await?
            .is_some_and(|principal| principal.active);
        if !known_actor && !request.is_terminal() {
            let error = WorkflowError::Unauthorized {
                request_id: request.id.clone(),
                actor: actor_id.clone(),
                action,
                status: request.status,
            };
            return Err(self.rejected(&audit, action, request.status, error));
        }

        let today = self.clock.today();
        let authorized = match (request.current_stage(), action) {
            (None, _) => AuthorizedActors::default(),
            (Some(_), WorkflowAction::Revoke) => {
                self.resolver().resolve_chain(&request, today).await?
            }
            (Some(stage), _) => {
                self.resolver()
                    .resolve(stage, request.scope_unit.as_ref(), &request.requester.id, today)
                    .await?
            }
        };

        let now = self.clock.now();
        let outcome = self.engine.apply_with_audit(
            &request,
            actor_id,
            action,
            &authorized,
            now,
            &self.audit,
            &audit,
        )?;

        let next = request.advanced(&outcome, actor_id, now);
        let commit = TransitionCommit {
            record: TransitionRecord {
                request_id: request.id.clone(),
                from: outcome.from,
                to: outcome.to,
                action,
                actor_id: actor_id.clone(),
                version: next.version,
                occurred_at: now,
            },
            request: next,
            expected_version: request.version,
            effect: outcome.effect.clone(),
        };
        let committed = match self.store.commit_transition(commit).await {
            Ok(committed) => committed,
            Err(error) => {
                let error = WorkflowError::from(error);
                return Err(self.rejected(&audit, action, request.status, error));
            }
        };

        let delegated = authorized.is_delegated(actor_id);
        self.engine.record_applied(&outcome, delegated, &self.audit, &audit);
        info!(
            event_name = "workflow.transition_applied",
            request_id = %committed.id,
            from = %outcome.from,
            to = %outcome.to,
            delegated,
            "transition applied"
        );

        self.report_if_unactionable(&committed, &audit).await;
        Ok(committed)
    }

    pub async fn find(&self, request_id: &RequestId) -> Result<WorkflowRequest, WorkflowError> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or_else(|| WorkflowError::RequestNotFound(request_id.clone()))
    }

    pub async fn history(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<TransitionRecord>, WorkflowError> {
        Ok(self.store.transitions(request_id).await?)
    }

    pub async fn allotments(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Allotment>, WorkflowError> {
        Ok(self.store.allotments_for_request(request_id).await?)
    }

    /// Allotments recorded for `faculty_id` across all approved assignments.
    pub async fn faculty_allotments(
        &self,
        faculty_id: &PrincipalId,
    ) -> Result<Vec<Allotment>, WorkflowError> {
        Ok(self.store.allotments_for_faculty(faculty_id).await?)
    }

    pub async fn actionable_by(
        &self,
        request_id: &RequestId,
    ) -> Result<StageReport, WorkflowError> {
        let request = self.find(request_id).await?;
        self.stage_report(&request).await
    }

    /// Pending requests `principal_id` could approve or reject right now.
    pub async fn pending_for(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<WorkflowRequest>, WorkflowError> {
        self.active_principal(principal_id).await?;
        let mut actionable = Vec::new();
        for request in self.store.list_pending().await? {
            let report = self.stage_report(&request).await?;
            if report.actors.contains(principal_id) {
                actionable.push(request);
            }
        }
        Ok(actionable)
    }

    pub async fn balance(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<LeaveBalance, WorkflowError> {
        self.store
            .balance(principal_id)
            .await?
            .ok_or_else(|| WorkflowError::UnknownPrincipal(principal_id.clone()))
    }

    async fn stage_report(&self, request: &WorkflowRequest) -> Result<StageReport, WorkflowError> {
        let stage = request.current_stage();
        let actors = match stage {
            Some(stage) => {
                self.resolver()
                    .resolve(
                        stage,
                        request.scope_unit.as_ref(),
                        &request.requester.id,
                        self.clock.today(),
                    )
                    .await?
            }
            None => AuthorizedActors::default(),
        };
        Ok(StageReport {
            request_id: request.id.clone(),
            status: request.status,
            stage,
            unactionable: stage.is_some() && actors.is_empty(),
            actors,
        })
    }

    /// Runs after the commit, so a failure here is logged and never returned.
    async fn report_if_unactionable(&self, request: &WorkflowRequest, audit: &AuditContext) {
        let report = match self.stage_report(request).await {
            Ok(report) => report,
            Err(error) => {
                warn!(
                    event_name = STAGE_REPORT_FAILED,
                    request_id = %request.id,
                    status = %request.status,
                    error_class = error.class(),
                    error = %error,
                    "could not resolve actors for the committed stage"
                );
                self.audit.emit(
                    audit
                        .event(STAGE_REPORT_FAILED, AuditCategory::Delegation, AuditOutcome::Failed)
                        .with_metadata("status", request.status.as_str())
                        .with_metadata("error_class", error.class())
                        .with_metadata("error", error.to_string()),
                );
                return;
            }
        };
        if report.unactionable {
            warn!(
                event_name = STAGE_UNACTIONABLE,
                request_id = %request.id,
                status = %request.status,
                "no principal can act on the current stage"
            );
            self.audit.emit(
                audit
                    .event(STAGE_UNACTIONABLE, AuditCategory::Delegation, AuditOutcome::Failed)
                    .with_metadata("status", request.status.as_str()),
            );
        }
    }

    async fn active_principal(&self, id: &PrincipalId) -> Result<Principal, WorkflowError> {
        match self.store.find_principal(id).await? {
            Some(principal) if principal.active => Ok(principal),
            _ => Err(WorkflowError::UnknownPrincipal(id.clone())),
        }
    }

    /// Unit whose principals staff the chain's unit-local stages.
    async fn scope_for(
        &self,
        requester: &Principal,
        payload: &RequestPayload,
    ) -> Result<Option<UnitId>, WorkflowError> {
        let assignment = match payload {
            RequestPayload::Leave(_) => return Ok(requester.unit.clone()),
            RequestPayload::CrossUnitAssignment(assignment) => assignment,
        };

        let faculty = match self.store.find_principal(&assignment.faculty_id).await? {
            Some(faculty) if faculty.active => faculty,
            _ => {
                return Err(WorkflowError::MalformedPayload(format!(
                    "faculty {} is unknown or inactive",
                    assignment.faculty_id
                )))
            }
        };
        if faculty.role != Role::Faculty {
            return Err(WorkflowError::MalformedPayload(format!(
                "{} holds role {}, only faculty can be assigned",
                faculty.id, faculty.role
            )));
        }
        let Some(faculty_unit) = faculty.unit else {
            return Err(WorkflowError::MalformedPayload(format!(
                "faculty {} has no owning unit",
                faculty.id
            )));
        };
        if requester.unit.as_ref() == Some(&faculty_unit) {
            return Err(WorkflowError::MalformedPayload(format!(
                "faculty {} already belongs to unit {faculty_unit}",
                faculty.id
            )));
        }
        Ok(Some(faculty_unit))
    }

    fn rejected(
        &self,
        audit: &AuditContext,
        action: WorkflowAction,
        status: RequestStatus,
        error: WorkflowError,
    ) -> WorkflowError {
        self.audit.emit(
            audit
                .event(TRANSITION_REJECTED, AuditCategory::Flow, AuditOutcome::Rejected)
                .with_metadata("action", action.as_str())
                .with_metadata("status", status.as_str())
                .with_metadata("error_class", error.class())
                .with_metadata("error", error.to_string()),
        );
        warn!(
            event_name = TRANSITION_REJECTED,
            error_class = error.class(),
            error = %error,
            "action rejected"
        );
        error
    }
}

fn new_correlation_id() -> String {
    format!("corr-{}", Uuid::new_v4())
}
