use sqlx::{sqlite::SqliteRow, Row};

use registrar_core::domain::allotment::{Allotment, AllotmentId};
use registrar_core::domain::principal::{PrincipalId, UnitId};
use registrar_core::domain::request::RequestId;
use registrar_core::store::{AllotmentStore, StoreError};

use super::{parse_timestamp, RepositoryError, SqlWorkflowStore};

const ALLOTMENT_COLUMNS: &str = "id, request_id, faculty_id, teaching_unit_id, faculty_unit_id,
    subject, class_name, section, course, semester, slot, created_at";

impl SqlWorkflowStore {
    async fn select_allotments(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Vec<Allotment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ALLOTMENT_COLUMNS} FROM class_allotment
             WHERE {column} = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(value)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(allotment_from_row).collect()
    }
}

fn allotment_from_row(row: SqliteRow) -> Result<Allotment, RepositoryError> {
    let semester = row
        .try_get::<Option<i64>, _>("semester")?
        .map(|value| {
            u8::try_from(value).map_err(|_| {
                RepositoryError::Decode(format!("invalid value for `semester`: {value}"))
            })
        })
        .transpose()?;

    Ok(Allotment {
        id: AllotmentId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        faculty_id: PrincipalId(row.try_get("faculty_id")?),
        teaching_unit: UnitId(row.try_get("teaching_unit_id")?),
        faculty_unit: UnitId(row.try_get("faculty_unit_id")?),
        subject: row.try_get("subject")?,
        class_name: row.try_get("class_name")?,
        section: row.try_get("section")?,
        course: row.try_get("course")?,
        semester,
        slot: row.try_get("slot")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[async_trait::async_trait]
impl AllotmentStore for SqlWorkflowStore {
    async fn allotments_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Allotment>, StoreError> {
        Ok(self.select_allotments("request_id", &request_id.0).await?)
    }

    async fn allotments_for_faculty(
        &self,
        faculty_id: &PrincipalId,
    ) -> Result<Vec<Allotment>, StoreError> {
        Ok(self.select_allotments("faculty_id", &faculty_id.0).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use registrar_core::domain::allotment::{Allotment, AllotmentId};
    use registrar_core::domain::principal::{Principal, PrincipalId, Role, UnitId};
    use registrar_core::domain::request::{
        AssignmentPayload, RequestId, RequestKind, RequestPayload, Requester, WorkflowRequest,
    };
    use registrar_core::effects::TerminalEffect;
    use registrar_core::flows::{RequestStatus, RoutingChain, WorkflowAction};
    use registrar_core::store::{
        AllotmentStore, RequestStore, StoreError, TransitionCommit, TransitionRecord,
    };

    use crate::repositories::SqlWorkflowStore;
    use crate::{connect_with_settings, migrations};

    async fn setup_store() -> SqlWorkflowStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let store = SqlWorkflowStore::new(pool);
        for principal in [
            Principal::new("hod-cse-001", "Head CSE", Role::UnitHead, Some("cse")),
            Principal::new("fac-ece-001", "Faculty ECE", Role::Faculty, Some("ece")),
        ] {
            store.register_principal(&principal).await.expect("register");
        }
        store
    }

    fn assignment_request() -> WorkflowRequest {
        let chain = RoutingChain::for_origin(RequestKind::CrossUnitAssignment, Role::UnitHead)
            .expect("assignment chain");
        WorkflowRequest {
            id: RequestId("REQ-ALT-001".to_string()),
            requester: Requester {
                id: PrincipalId("hod-cse-001".to_string()),
                role: Role::UnitHead,
                unit: Some(UnitId("cse".to_string())),
            },
            payload: RequestPayload::CrossUnitAssignment(AssignmentPayload {
                faculty_id: PrincipalId("fac-ece-001".to_string()),
                subject: "Signals and Systems".to_string(),
                class_name: "CSE-2".to_string(),
                section: "B".to_string(),
                course: Some("B.Tech".to_string()),
                semester: Some(3),
                slot: None,
            }),
            status: chain.initial_status(),
            chain,
            scope_unit: Some(UnitId("ece".to_string())),
            version: 1,
            created_at: parse_ts("2026-03-09T09:00:00Z"),
            resolved_at: None,
            resolved_by: None,
        }
    }

    fn allotment() -> Allotment {
        Allotment {
            id: AllotmentId("ALT-001".to_string()),
            request_id: RequestId("REQ-ALT-001".to_string()),
            faculty_id: PrincipalId("fac-ece-001".to_string()),
            teaching_unit: UnitId("cse".to_string()),
            faculty_unit: UnitId("ece".to_string()),
            subject: "Signals and Systems".to_string(),
            class_name: "CSE-2".to_string(),
            section: "B".to_string(),
            course: Some("B.Tech".to_string()),
            semester: Some(3),
            slot: None,
            created_at: parse_ts("2026-03-09T10:00:00Z"),
        }
    }

    fn approve(request: &WorkflowRequest) -> TransitionCommit {
        let occurred_at = parse_ts("2026-03-09T10:00:00Z");
        let mut next = request.clone();
        next.status = RequestStatus::Approved;
        next.version = request.version + 1;
        next.resolved_at = Some(occurred_at);
        next.resolved_by = Some(PrincipalId("hod-ece-001".to_string()));
        TransitionCommit {
            record: TransitionRecord {
                request_id: request.id.clone(),
                from: request.status,
                to: RequestStatus::Approved,
                action: WorkflowAction::Approve,
                actor_id: PrincipalId("hod-ece-001".to_string()),
                version: next.version,
                occurred_at,
            },
            request: next,
            expected_version: request.version,
            effect: Some(TerminalEffect::Allotment(allotment())),
        }
    }

    #[tokio::test]
    async fn approved_assignment_persists_one_allotment() {
        let store = setup_store().await;
        let request = assignment_request();
        store.insert_request(&request, None).await.expect("insert");

        store.commit_transition(approve(&request)).await.expect("approve");

        assert_eq!(
            store.allotments_for_request(&request.id).await.expect("by request"),
            vec![allotment()]
        );
        assert_eq!(
            store
                .allotments_for_faculty(&PrincipalId("fac-ece-001".to_string()))
                .await
                .expect("by faculty"),
            vec![allotment()]
        );
    }

    #[tokio::test]
    async fn second_allotment_for_a_request_is_a_duplicate() {
        let store = setup_store().await;
        let request = assignment_request();
        store.insert_request(&request, None).await.expect("insert");
        store.commit_transition(approve(&request)).await.expect("approve");

        let mut replay = approve(&request);
        replay.expected_version = 2;
        replay.request.version = 3;
        replay.record.version = 3;
        let error = store.commit_transition(replay).await.expect_err("allotment exists");

        assert!(matches!(error, StoreError::Duplicate(_)));
        assert_eq!(store.allotments_for_request(&request.id).await.expect("list").len(), 1);
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
