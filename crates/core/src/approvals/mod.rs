//! Resolution of who may act on a pending stage.
//!
//! Delegation is evaluated against live leave records every time a stage is
//! resolved. Nothing here is cached between calls.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::principal::{Principal, PrincipalId, Role, UnitId};
use crate::domain::request::WorkflowRequest;
use crate::errors::WorkflowError;
use crate::flows::states::Stage;
use crate::store::{PrincipalDirectory, RequestStore};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedActors {
    pub stages: Vec<Stage>,
    pub principals: BTreeSet<PrincipalId>,
    /// Members of `principals` admitted only through delegation.
    pub delegated: BTreeSet<PrincipalId>,
}

impl AuthorizedActors {
    fn for_stage(stage: Stage) -> Self {
        Self { stages: vec![stage], ..Self::default() }
    }

    pub fn contains(&self, principal_id: &PrincipalId) -> bool {
        self.principals.contains(principal_id)
    }

    pub fn is_delegated(&self, principal_id: &PrincipalId) -> bool {
        self.delegated.contains(principal_id)
    }

    /// An empty set means the stage cannot be acted on until the directory or
    /// leave records change.
    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    pub fn merge(&mut self, other: AuthorizedActors) {
        for stage in other.stages {
            if !self.stages.contains(&stage) {
                self.stages.push(stage);
            }
        }
        for principal in other.principals {
            let delegated_there = other.delegated.contains(&principal);
            let direct_here =
                self.principals.contains(&principal) && !self.delegated.contains(&principal);
            if delegated_there && !direct_here {
                self.delegated.insert(principal.clone());
            } else {
                self.delegated.remove(&principal);
            }
            self.principals.insert(principal);
        }
    }

    fn admit(&mut self, principals: Vec<Principal>, delegated: bool) {
        for principal in principals {
            if delegated {
                if !self.principals.contains(&principal.id) {
                    self.delegated.insert(principal.id.clone());
                }
            } else {
                self.delegated.remove(&principal.id);
            }
            self.principals.insert(principal.id);
        }
    }

    fn exclude(&mut self, principal_id: &PrincipalId) {
        self.principals.remove(principal_id);
        self.delegated.remove(principal_id);
    }
}

pub struct DelegationResolver<'a, D, R> {
    directory: &'a D,
    requests: &'a R,
    administrative_unit: &'a UnitId,
}

impl<'a, D, R> DelegationResolver<'a, D, R>
where
    D: PrincipalDirectory,
    R: RequestStore,
{
    pub fn new(directory: &'a D, requests: &'a R, administrative_unit: &'a UnitId) -> Self {
        Self { directory, requests, administrative_unit }
    }

    /// Whether the Administrator holds an approved leave covering `today`.
    /// False when no Administrator is on record.
    pub async fn administrator_on_leave(&self, today: NaiveDate) -> Result<bool, WorkflowError> {
        let (administrator, on_leave) = self.administrator_availability(today).await?;
        Ok(administrator.is_some() && on_leave)
    }

    /// Actors authorized for `stage` of a request scoped to `scope`, never
    /// including the requester.
    pub async fn resolve(
        &self,
        stage: Stage,
        scope: Option<&UnitId>,
        requester: &PrincipalId,
        today: NaiveDate,
    ) -> Result<AuthorizedActors, WorkflowError> {
        let mut actors = AuthorizedActors::for_stage(stage);

        match stage {
            Stage::PendingFaculty | Stage::PendingUnitHead => {
                if let Some(unit) = scope {
                    let holders =
                        self.directory.list_principals(stage.acting_role(), Some(unit)).await?;
                    actors.admit(holders, false);
                }
            }
            Stage::PendingAdministrator => {
                let (administrator, on_leave) = self.administrator_availability(today).await?;
                let delegation_active = administrator.is_none() || on_leave;
                if let Some(administrator) = administrator {
                    actors.admit(vec![administrator], false);
                }
                if delegation_active {
                    let deputies = self.stand_ins(Role::Administrator, None).await?;
                    debug!(
                        event_name = "workflow.delegation_active",
                        stage = %stage,
                        deputies = deputies.len(),
                        "administrator unavailable, deputies admitted"
                    );
                    actors.admit(deputies, true);
                }
            }
            Stage::PendingTargetUnitHead => {
                if let Some(unit) = scope {
                    let heads = self.directory.list_principals(Role::UnitHead, Some(unit)).await?;
                    let heads_absent = self.all_on_leave(&heads, today).await?;
                    actors.admit(heads, false);
                    if heads_absent {
                        let deputies = self.stand_ins(Role::UnitHead, Some(unit)).await?;
                        debug!(
                            event_name = "workflow.delegation_active",
                            stage = %stage,
                            unit = %unit,
                            deputies = deputies.len(),
                            "unit heads unavailable, deputies admitted"
                        );
                        actors.admit(deputies, true);
                    }
                }
            }
        }

        actors.exclude(requester);
        Ok(actors)
    }

    /// Union of the authorized sets of every stage in the request's chain.
    pub async fn resolve_chain(
        &self,
        request: &WorkflowRequest,
        today: NaiveDate,
    ) -> Result<AuthorizedActors, WorkflowError> {
        let mut union = AuthorizedActors::default();
        for stage in request.chain.stages() {
            let actors = self
                .resolve(*stage, request.scope_unit.as_ref(), &request.requester.id, today)
                .await?;
            union.merge(actors);
        }
        Ok(union)
    }

    /// The Administrator singleton and whether it is on leave `today`.
    async fn administrator_availability(
        &self,
        today: NaiveDate,
    ) -> Result<(Option<Principal>, bool), WorkflowError> {
        match self.directory.administrator(self.administrative_unit).await? {
            Some(administrator) => {
                let on_leave = self.on_leave(&administrator, today).await?;
                Ok((Some(administrator), on_leave))
            }
            None => Ok((None, false)),
        }
    }

    async fn stand_ins(
        &self,
        holder: Role,
        unit: Option<&UnitId>,
    ) -> Result<Vec<Principal>, WorkflowError> {
        let mut principals = Vec::new();
        for role in Role::stand_ins(holder) {
            principals.extend(self.directory.list_principals(role, unit).await?);
        }
        Ok(principals)
    }

    async fn on_leave(
        &self,
        principal: &Principal,
        today: NaiveDate,
    ) -> Result<bool, WorkflowError> {
        Ok(self.requests.has_approved_leave_covering(&principal.id, today).await?)
    }

    /// True when `principals` is empty or every member is on leave.
    async fn all_on_leave(
        &self,
        principals: &[Principal],
        today: NaiveDate,
    ) -> Result<bool, WorkflowError> {
        for principal in principals {
            if !self.on_leave(principal, today).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{AuthorizedActors, DelegationResolver};
    use crate::domain::principal::{Principal, PrincipalId, Role, UnitId};
    use crate::domain::request::{
        LeavePayload, RequestId, RequestKind, RequestPayload, Requester, WorkflowRequest,
    };
    use crate::flows::chain::RoutingChain;
    use crate::flows::states::{RequestStatus, Stage};
    use crate::store::{InMemoryWorkflowStore, RequestStore};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 12).unwrap()
    }

    fn id(value: &str) -> PrincipalId {
        PrincipalId(value.to_owned())
    }

    async fn directory() -> InMemoryWorkflowStore {
        let store = InMemoryWorkflowStore::default();
        for principal in [
            Principal::new("adm-1", "Principal", Role::Administrator, Some("administration")),
            Principal::new("dep-cse-1", "Deputy CSE", Role::DeputyUnitHead, Some("cse")),
            Principal::new("dep-ece-1", "Deputy ECE", Role::DeputyUnitHead, Some("ece")),
            Principal::new("hod-cse-1", "Head CSE", Role::UnitHead, Some("cse")),
            Principal::new("hod-ece-1", "Head ECE", Role::UnitHead, Some("ece")),
            Principal::new("fac-cse-1", "Faculty CSE", Role::Faculty, Some("cse")),
        ] {
            store.register_principal(principal).await;
        }
        store
    }

    async fn approve_leave_for(store: &InMemoryWorkflowStore, principal: &str, role: Role) {
        let chain = RoutingChain::for_origin(RequestKind::Leave, role).expect("chain");
        let request = WorkflowRequest {
            id: RequestId(format!("REQ-{principal}")),
            requester: Requester { id: id(principal), role, unit: None },
            payload: RequestPayload::Leave(LeavePayload {
                leave_type: "casual".to_owned(),
                reason: "away".to_owned(),
                start_date: today(),
                end_date: today(),
            }),
            chain,
            scope_unit: None,
            status: RequestStatus::Approved,
            version: 1,
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
            resolved_by: Some(id(principal)),
        };
        store.insert_request(&request, None).await.expect("insert approved leave");
    }

    #[tokio::test]
    async fn unit_head_stage_is_scoped_to_the_unit() {
        let store = directory().await;
        let admin_unit = UnitId("administration".to_owned());
        let resolver = DelegationResolver::new(&store, &store, &admin_unit);

        let actors = resolver
            .resolve(Stage::PendingUnitHead, Some(&UnitId("cse".to_owned())), &id("stu-1"), today())
            .await
            .expect("resolve");

        assert!(actors.contains(&id("hod-cse-1")));
        assert!(!actors.contains(&id("hod-ece-1")));
        assert!(actors.delegated.is_empty());
    }

    #[tokio::test]
    async fn deputies_join_administrator_stage_only_while_administrator_is_away() {
        let store = directory().await;
        let admin_unit = UnitId("administration".to_owned());
        let resolver = DelegationResolver::new(&store, &store, &admin_unit);

        let present = resolver
            .resolve(Stage::PendingAdministrator, None, &id("fac-cse-1"), today())
            .await
            .expect("resolve");
        assert!(present.contains(&id("adm-1")));
        assert!(!present.contains(&id("dep-cse-1")));
        assert!(!resolver.administrator_on_leave(today()).await.expect("fact"));

        approve_leave_for(&store, "adm-1", Role::Administrator).await;
        let away = resolver
            .resolve(Stage::PendingAdministrator, None, &id("fac-cse-1"), today())
            .await
            .expect("resolve");
        assert!(resolver.administrator_on_leave(today()).await.expect("fact"));
        assert!(away.contains(&id("dep-cse-1")));
        assert!(away.is_delegated(&id("dep-ece-1")));
        assert!(!away.is_delegated(&id("adm-1")));

        let tomorrow = today().succ_opt().unwrap();
        assert!(!resolver.administrator_on_leave(tomorrow).await.expect("fact"));
    }

    #[tokio::test]
    async fn requester_is_never_authorized_for_their_own_request() {
        let store = directory().await;
        approve_leave_for(&store, "adm-1", Role::Administrator).await;
        let admin_unit = UnitId("administration".to_owned());
        let resolver = DelegationResolver::new(&store, &store, &admin_unit);

        let actors = resolver
            .resolve(Stage::PendingAdministrator, None, &id("dep-cse-1"), today())
            .await
            .expect("resolve");

        assert!(!actors.contains(&id("dep-cse-1")));
        assert!(actors.contains(&id("dep-ece-1")));
    }

    #[tokio::test]
    async fn missing_administrator_leaves_only_the_delegation_path() {
        let store = InMemoryWorkflowStore::default();
        store
            .register_principal(Principal::new(
                "dep-1",
                "Deputy",
                Role::DeputyUnitHead,
                Some("cse"),
            ))
            .await;
        let admin_unit = UnitId("administration".to_owned());
        let resolver = DelegationResolver::new(&store, &store, &admin_unit);

        let actors = resolver
            .resolve(Stage::PendingAdministrator, None, &id("hod-1"), today())
            .await
            .expect("resolve");
        assert!(actors.is_delegated(&id("dep-1")));

        let empty = InMemoryWorkflowStore::default();
        let resolver = DelegationResolver::new(&empty, &empty, &admin_unit);
        let stuck = resolver
            .resolve(Stage::PendingAdministrator, None, &id("hod-1"), today())
            .await
            .expect("resolve");
        assert!(stuck.is_empty());
    }

    #[tokio::test]
    async fn target_unit_deputy_stands_in_when_heads_are_away() {
        let store = directory().await;
        let admin_unit = UnitId("administration".to_owned());
        let resolver = DelegationResolver::new(&store, &store, &admin_unit);
        let ece = UnitId("ece".to_owned());

        let normal = resolver
            .resolve(Stage::PendingTargetUnitHead, Some(&ece), &id("hod-cse-1"), today())
            .await
            .expect("resolve");
        assert_eq!(normal.principals.len(), 1);
        assert!(normal.contains(&id("hod-ece-1")));

        approve_leave_for(&store, "hod-ece-1", Role::UnitHead).await;
        let delegated = resolver
            .resolve(Stage::PendingTargetUnitHead, Some(&ece), &id("hod-cse-1"), today())
            .await
            .expect("resolve");
        assert!(delegated.is_delegated(&id("dep-ece-1")));
        assert!(!delegated.contains(&id("dep-cse-1")));
        assert!(!delegated.contains(&id("hod-cse-1")));
    }

    #[test]
    fn merge_keeps_direct_authority_over_delegated() {
        let mut left = AuthorizedActors::default();
        left.principals.insert(id("a"));
        left.delegated.insert(id("a"));
        let mut right = AuthorizedActors::default();
        right.principals.insert(id("a"));
        right.principals.insert(id("b"));
        right.delegated.insert(id("b"));

        left.merge(right);

        assert!(!left.is_delegated(&id("a")));
        assert!(left.is_delegated(&id("b")));
    }
}
