//! Effects committed together with a request's transition into `Approved`.
//!
//! The applier only *computes* the effect. Stores apply it inside the same
//! unit of work as the status change, and only when that change wins the
//! version check, so an effect can never land twice for one request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::allotment::{Allotment, AllotmentId};
use crate::domain::principal::PrincipalId;
use crate::domain::request::{RequestPayload, WorkflowRequest};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum TerminalEffect {
    LeaveDebit { principal_id: PrincipalId, days: u32 },
    Allotment(Allotment),
}

impl TerminalEffect {
    pub fn describe(&self) -> String {
        match self {
            Self::LeaveDebit { principal_id, days } => {
                format!("leave_debit principal={principal_id} days={days}")
            }
            Self::Allotment(allotment) => format!(
                "allotment faculty={} unit={} subject={}",
                allotment.faculty_id, allotment.teaching_unit, allotment.subject
            ),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SideEffectApplier;

impl SideEffectApplier {
    pub fn on_approved(
        &self,
        request: &WorkflowRequest,
        now: DateTime<Utc>,
    ) -> Result<TerminalEffect, WorkflowError> {
        match &request.payload {
            RequestPayload::Leave(leave) => {
                let days = leave.day_count();
                if days == 0 {
                    return Err(WorkflowError::InvariantViolation(format!(
                        "request {} approved with an empty leave range",
                        request.id
                    )));
                }
                Ok(TerminalEffect::LeaveDebit { principal_id: request.requester.id.clone(), days })
            }
            RequestPayload::CrossUnitAssignment(assignment) => {
                let teaching_unit = request.requester.unit.clone().ok_or_else(|| {
                    WorkflowError::InvariantViolation(format!(
                        "assignment {} has no requesting unit",
                        request.id
                    ))
                })?;
                let faculty_unit = request.scope_unit.clone().ok_or_else(|| {
                    WorkflowError::InvariantViolation(format!(
                        "assignment {} has no owning unit",
                        request.id
                    ))
                })?;

                Ok(TerminalEffect::Allotment(Allotment {
                    id: AllotmentId(format!("ALT-{}", Uuid::new_v4())),
                    request_id: request.id.clone(),
                    faculty_id: assignment.faculty_id.clone(),
                    teaching_unit,
                    faculty_unit,
                    subject: assignment.subject.clone(),
                    class_name: assignment.class_name.clone(),
                    section: assignment.section.clone(),
                    course: assignment.course.clone(),
                    semester: assignment.semester,
                    slot: assignment.slot.clone(),
                    created_at: now,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{SideEffectApplier, TerminalEffect};
    use crate::domain::principal::{PrincipalId, Role, UnitId};
    use crate::domain::request::{
        AssignmentPayload, LeavePayload, RequestId, RequestKind, RequestPayload, Requester,
        WorkflowRequest,
    };
    use crate::flows::chain::RoutingChain;
    use crate::flows::states::{RequestStatus, Stage};

    fn request(role: Role, payload: RequestPayload, scope: &str) -> WorkflowRequest {
        let kind = payload.kind();
        WorkflowRequest {
            id: RequestId("REQ-1".to_owned()),
            requester: Requester {
                id: PrincipalId("req-1".to_owned()),
                role,
                unit: Some(UnitId("cse".to_owned())),
            },
            chain: RoutingChain::for_origin(kind, role).expect("chain"),
            payload,
            scope_unit: Some(UnitId(scope.to_owned())),
            status: RequestStatus::Pending(Stage::PendingUnitHead),
            version: 1,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn leave_approval_debits_inclusive_days() {
        let payload = RequestPayload::Leave(LeavePayload {
            leave_type: "medical".to_owned(),
            reason: "surgery".to_owned(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
        });
        let effect = SideEffectApplier
            .on_approved(&request(Role::Student, payload, "cse"), Utc::now())
            .expect("effect");

        assert_eq!(
            effect,
            TerminalEffect::LeaveDebit { principal_id: PrincipalId("req-1".to_owned()), days: 5 }
        );
    }

    #[test]
    fn assignment_approval_binds_faculty_to_requesting_unit() {
        let payload = RequestPayload::CrossUnitAssignment(AssignmentPayload {
            faculty_id: PrincipalId("fac-ece-001".to_owned()),
            subject: "Digital Logic".to_owned(),
            class_name: "CSE-2".to_owned(),
            section: "B".to_owned(),
            course: Some("B.Tech".to_owned()),
            semester: Some(3),
            slot: Some("MON-2".to_owned()),
        });
        assert_eq!(payload.kind(), RequestKind::CrossUnitAssignment);

        let effect = SideEffectApplier
            .on_approved(&request(Role::UnitHead, payload, "ece"), Utc::now())
            .expect("effect");
        let TerminalEffect::Allotment(allotment) = effect else {
            panic!("expected allotment effect");
        };
        assert_eq!(allotment.teaching_unit, UnitId("cse".to_owned()));
        assert_eq!(allotment.faculty_unit, UnitId("ece".to_owned()));
        assert_eq!(allotment.request_id, RequestId("REQ-1".to_owned()));
        assert!(allotment.id.0.starts_with("ALT-"));
    }
}
