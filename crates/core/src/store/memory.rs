use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::domain::allotment::Allotment;
use crate::domain::principal::{LeaveBalance, Principal, PrincipalId, Role, UnitId};
use crate::domain::request::{RequestId, WorkflowRequest};
use crate::effects::TerminalEffect;
use crate::flows::states::RequestStatus;

use super::{
    AllotmentStore, LeaveBalanceStore, PrincipalDirectory, RequestStore, StoreError,
    TransitionCommit, TransitionRecord,
};

pub const DEFAULT_LEAVE_ALLOWANCE: u32 = 15;

#[derive(Default)]
struct MemoryState {
    principals: HashMap<String, Principal>,
    balances: HashMap<String, LeaveBalance>,
    requests: BTreeMap<String, WorkflowRequest>,
    transitions: Vec<TransitionRecord>,
    allotments: Vec<Allotment>,
}

/// Process-local store. One lock guards all state, so a transition and its
/// effect are observed together or not at all.
pub struct InMemoryWorkflowStore {
    state: RwLock<MemoryState>,
    default_allowance: u32,
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::with_default_allowance(DEFAULT_LEAVE_ALLOWANCE)
    }
}

impl InMemoryWorkflowStore {
    pub fn with_default_allowance(default_allowance: u32) -> Self {
        Self { state: RwLock::new(MemoryState::default()), default_allowance }
    }

    /// Adds or replaces a principal. An existing balance keeps its consumed days.
    pub async fn register_principal(&self, principal: Principal) {
        let mut state = self.state.write().await;
        let key = principal.id.0.clone();
        state.balances.entry(key.clone()).or_insert_with(|| LeaveBalance {
            principal_id: principal.id.clone(),
            total_allowance: self.default_allowance,
            consumed: 0,
        });
        state.principals.insert(key, principal);
    }

    pub async fn set_allowance(&self, principal_id: &PrincipalId, total_allowance: u32) {
        let mut state = self.state.write().await;
        if let Some(balance) = state.balances.get_mut(&principal_id.0) {
            balance.total_allowance = total_allowance;
        }
    }
}

fn check_effect(state: &MemoryState, effect: &TerminalEffect) -> Result<(), StoreError> {
    match effect {
        TerminalEffect::LeaveDebit { principal_id, .. } => {
            if state.balances.contains_key(&principal_id.0) {
                Ok(())
            } else {
                Err(StoreError::Backend(format!("no leave balance for principal {principal_id}")))
            }
        }
        TerminalEffect::Allotment(allotment) => {
            if state.allotments.iter().any(|existing| existing.request_id == allotment.request_id)
            {
                Err(StoreError::Duplicate(format!(
                    "allotment for request {} already exists",
                    allotment.request_id
                )))
            } else {
                Ok(())
            }
        }
    }
}

fn apply_effect(state: &mut MemoryState, effect: TerminalEffect) {
    match effect {
        TerminalEffect::LeaveDebit { principal_id, days } => {
            if let Some(balance) = state.balances.get_mut(&principal_id.0) {
                balance.consumed = balance.consumed.saturating_add(days);
            }
        }
        TerminalEffect::Allotment(allotment) => state.allotments.push(allotment),
    }
}

#[async_trait::async_trait]
impl PrincipalDirectory for InMemoryWorkflowStore {
    async fn find_principal(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        let state = self.state.read().await;
        Ok(state.principals.get(&id.0).cloned())
    }

    async fn list_principals(
        &self,
        role: Role,
        unit: Option<&UnitId>,
    ) -> Result<Vec<Principal>, StoreError> {
        let state = self.state.read().await;
        let mut principals: Vec<Principal> = state
            .principals
            .values()
            .filter(|principal| principal.active && principal.role == role)
            .filter(|principal| unit.map_or(true, |unit| principal.belongs_to(unit)))
            .cloned()
            .collect();
        principals.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(principals)
    }

    async fn administrator(&self, unit: &UnitId) -> Result<Option<Principal>, StoreError> {
        let state = self.state.read().await;
        let mut administrators: Vec<Principal> = state
            .principals
            .values()
            .filter(|principal| principal.active && principal.role == Role::Administrator)
            .filter(|principal| principal.unit.is_none() || principal.belongs_to(unit))
            .cloned()
            .collect();
        match administrators.len() {
            0 | 1 => Ok(administrators.pop()),
            count => Err(StoreError::AmbiguousAdministrator { unit: unit.clone(), count }),
        }
    }
}

#[async_trait::async_trait]
impl RequestStore for InMemoryWorkflowStore {
    async fn insert_request(
        &self,
        request: &WorkflowRequest,
        effect: Option<&TerminalEffect>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id.0) {
            return Err(StoreError::Duplicate(format!("request {} already exists", request.id)));
        }
        if let Some(effect) = effect {
            check_effect(&state, effect)?;
            apply_effect(&mut state, effect.clone());
        }
        state.requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_request(&self, id: &RequestId) -> Result<Option<WorkflowRequest>, StoreError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn has_approved_leave_covering(
        &self,
        principal_id: &PrincipalId,
        day: NaiveDate,
    ) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.requests.values().any(|request| {
            request.requester.id == *principal_id
                && request.status == RequestStatus::Approved
                && request.leave().is_some_and(|leave| leave.covers(day))
        }))
    }

    async fn list_pending(&self) -> Result<Vec<WorkflowRequest>, StoreError> {
        let state = self.state.read().await;
        let mut pending: Vec<WorkflowRequest> =
            state.requests.values().filter(|request| !request.is_terminal()).cloned().collect();
        pending.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(pending)
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<WorkflowRequest, StoreError> {
        let mut state = self.state.write().await;
        let request_id = commit.request.id.clone();
        let stored_version = state
            .requests
            .get(&request_id.0)
            .map(|stored| stored.version)
            .ok_or_else(|| StoreError::Backend(format!("request {request_id} does not exist")))?;
        if stored_version != commit.expected_version {
            return Err(StoreError::Conflict {
                request_id,
                expected_version: commit.expected_version,
            });
        }
        if let Some(effect) = &commit.effect {
            check_effect(&state, effect)?;
        }

        if let Some(effect) = commit.effect {
            apply_effect(&mut state, effect);
        }
        state.transitions.push(commit.record);
        state.requests.insert(request_id.0, commit.request.clone());
        Ok(commit.request)
    }

    async fn transitions(&self, id: &RequestId) -> Result<Vec<TransitionRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.transitions.iter().filter(|record| record.request_id == *id).cloned().collect())
    }
}

#[async_trait::async_trait]
impl LeaveBalanceStore for InMemoryWorkflowStore {
    async fn balance(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<LeaveBalance>, StoreError> {
        let state = self.state.read().await;
        Ok(state.balances.get(&principal_id.0).cloned())
    }
}

#[async_trait::async_trait]
impl AllotmentStore for InMemoryWorkflowStore {
    async fn allotments_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Allotment>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .allotments
            .iter()
            .filter(|allotment| allotment.request_id == *request_id)
            .cloned()
            .collect())
    }

    async fn allotments_for_faculty(
        &self,
        faculty_id: &PrincipalId,
    ) -> Result<Vec<Allotment>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .allotments
            .iter()
            .filter(|allotment| allotment.faculty_id == *faculty_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::InMemoryWorkflowStore;
    use crate::domain::principal::{Principal, PrincipalId, Role, UnitId};
    use crate::domain::request::{
        LeavePayload, RequestId, RequestKind, RequestPayload, Requester, WorkflowRequest,
    };
    use crate::effects::TerminalEffect;
    use crate::flows::chain::RoutingChain;
    use crate::flows::states::{RequestStatus, WorkflowAction};
    use crate::store::{
        LeaveBalanceStore, PrincipalDirectory, RequestStore, StoreError, TransitionCommit,
        TransitionRecord,
    };

    fn student_request() -> WorkflowRequest {
        let chain = RoutingChain::for_origin(RequestKind::Leave, Role::Student).expect("chain");
        WorkflowRequest {
            id: RequestId("REQ-1".to_owned()),
            requester: Requester {
                id: PrincipalId("stu-1".to_owned()),
                role: Role::Student,
                unit: Some(UnitId("cse".to_owned())),
            },
            payload: RequestPayload::Leave(LeavePayload {
                leave_type: "casual".to_owned(),
                reason: "travel".to_owned(),
                start_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            }),
            status: chain.initial_status(),
            chain,
            scope_unit: Some(UnitId("cse".to_owned())),
            version: 1,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    fn approve_commit(request: &WorkflowRequest, expected_version: u32) -> TransitionCommit {
        let mut next = request.clone();
        next.status = RequestStatus::Approved;
        next.version = expected_version + 1;
        TransitionCommit {
            record: TransitionRecord {
                request_id: request.id.clone(),
                from: request.status,
                to: RequestStatus::Approved,
                action: WorkflowAction::Approve,
                actor_id: PrincipalId("hod-1".to_owned()),
                version: next.version,
                occurred_at: Utc::now(),
            },
            request: next,
            expected_version,
            effect: Some(TerminalEffect::LeaveDebit {
                principal_id: PrincipalId("stu-1".to_owned()),
                days: 2,
            }),
        }
    }

    async fn seeded_store() -> InMemoryWorkflowStore {
        let store = InMemoryWorkflowStore::default();
        store.register_principal(Principal::new("stu-1", "Asha", Role::Student, Some("cse"))).await;
        store.insert_request(&student_request(), None).await.expect("insert request");
        store
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict_and_applies_nothing() {
        let store = seeded_store().await;
        let request = student_request();

        store.commit_transition(approve_commit(&request, 1)).await.expect("first commit wins");
        let error = store
            .commit_transition(approve_commit(&request, 1))
            .await
            .expect_err("second commit is stale");

        assert_eq!(
            error,
            StoreError::Conflict { request_id: request.id.clone(), expected_version: 1 }
        );
        let balance = store.balance(&PrincipalId("stu-1".to_owned())).await.expect("balance");
        assert_eq!(balance.map(|balance| balance.consumed), Some(2));
        assert_eq!(store.transitions(&request.id).await.expect("history").len(), 1);
    }

    #[tokio::test]
    async fn approved_leave_is_visible_to_coverage_query() {
        let store = seeded_store().await;
        let request = student_request();
        let inside = NaiveDate::from_ymd_opt(2026, 4, 2).unwrap();
        let principal = PrincipalId("stu-1".to_owned());

        assert!(!store.has_approved_leave_covering(&principal, inside).await.expect("query"));
        store.commit_transition(approve_commit(&request, 1)).await.expect("commit");
        assert!(store.has_approved_leave_covering(&principal, inside).await.expect("query"));
        assert!(store.list_pending().await.expect("pending").is_empty());
        assert_eq!(
            store.find_request(&request.id).await.expect("find").map(|found| found.status),
            Some(RequestStatus::Approved)
        );
    }

    #[tokio::test]
    async fn second_administrator_in_unit_is_ambiguous() {
        let store = InMemoryWorkflowStore::default();
        let unit = UnitId("administration".to_owned());
        store
            .register_principal(Principal::new(
                "adm-1",
                "Principal",
                Role::Administrator,
                Some("administration"),
            ))
            .await;
        assert!(store.administrator(&unit).await.expect("single admin").is_some());

        store
            .register_principal(Principal::new(
                "adm-2",
                "Vice Principal",
                Role::Administrator,
                Some("administration"),
            ))
            .await;
        assert_eq!(
            store.administrator(&unit).await,
            Err(StoreError::AmbiguousAdministrator { unit, count: 2 })
        );
    }
}
