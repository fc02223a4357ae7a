use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use registrar_core::domain::principal::{PrincipalId, Role, UnitId};
use registrar_core::domain::request::{RequestId, RequestPayload, Requester, WorkflowRequest};
use registrar_core::effects::TerminalEffect;
use registrar_core::flows::{RequestStatus, RoutingChain, WorkflowAction};
use registrar_core::store::{RequestStore, StoreError, TransitionCommit, TransitionRecord};

use super::{
    format_date, parse_optional_timestamp, parse_timestamp, parse_u32, RepositoryError,
    SqlWorkflowStore,
};

const REQUEST_COLUMNS: &str = "id, requester_id, requester_role, requester_unit_id, kind,
    payload_json, chain, scope_unit_id, status, state_version, created_at, resolved_at,
    resolved_by";

const TERMINAL_STATUSES: &str = "('approved', 'rejected', 'revoked')";

impl SqlWorkflowStore {
    async fn insert_with_effect(
        &self,
        request: &WorkflowRequest,
        effect: Option<&TerminalEffect>,
    ) -> Result<(), RepositoryError> {
        let payload_json = serde_json::to_string(&request.payload)
            .map_err(|error| RepositoryError::Decode(format!("payload encode: {error}")))?;
        let leave = request.leave();

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO workflow_request (
                id, requester_id, requester_role, requester_unit_id, kind, payload_json,
                chain, scope_unit_id, status, state_version, leave_start_date, leave_end_date,
                created_at, resolved_at, resolved_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.requester.id.0)
        .bind(request.requester.role.as_str())
        .bind(request.requester.unit.as_ref().map(|unit| unit.0.as_str()))
        .bind(request.kind().as_str())
        .bind(payload_json)
        .bind(request.chain.encode())
        .bind(request.scope_unit.as_ref().map(|unit| unit.0.as_str()))
        .bind(request.status.as_str())
        .bind(i64::from(request.version))
        .bind(leave.map(|leave| format_date(leave.start_date)))
        .bind(leave.map(|leave| format_date(leave.end_date)))
        .bind(request.created_at.to_rfc3339())
        .bind(request.resolved_at.map(|timestamp| timestamp.to_rfc3339()))
        .bind(request.resolved_by.as_ref().map(|actor| actor.0.as_str()))
        .execute(&mut *tx)
        .await?;

        if let Some(effect) = effect {
            let applied_at = request.resolved_at.unwrap_or(request.created_at);
            apply_effect(&mut tx, &request.id, effect, applied_at).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn select_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<WorkflowRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM workflow_request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(self.pool())
                .await?;
        row.map(request_from_row).transpose()
    }

    async fn select_pending(&self) -> Result<Vec<WorkflowRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM workflow_request
             WHERE status NOT IN {TERMINAL_STATUSES}
             ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(request_from_row).collect()
    }

    async fn count_covering_leave(
        &self,
        principal_id: &PrincipalId,
        day: NaiveDate,
    ) -> Result<i64, RepositoryError> {
        let day = format_date(day);
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_request
             WHERE requester_id = ?
               AND kind = 'leave'
               AND status = 'approved'
               AND leave_start_date <= ?
               AND leave_end_date >= ?",
        )
        .bind(&principal_id.0)
        .bind(&day)
        .bind(&day)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    async fn commit_with_effect(
        &self,
        commit: TransitionCommit,
    ) -> Result<WorkflowRequest, RepositoryError> {
        let TransitionCommit { request, expected_version, record, effect } = commit;
        let mut tx = self.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE workflow_request
             SET status = ?, state_version = ?, resolved_at = ?, resolved_by = ?
             WHERE id = ? AND state_version = ?",
        )
        .bind(request.status.as_str())
        .bind(i64::from(request.version))
        .bind(request.resolved_at.map(|timestamp| timestamp.to_rfc3339()))
        .bind(request.resolved_by.as_ref().map(|actor| actor.0.as_str()))
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.select_request(&request.id).await? {
                Some(_) => Err(RepositoryError::Conflict {
                    request_id: request.id.clone(),
                    expected_version,
                }),
                None => Err(RepositoryError::Missing(format!("request {}", request.id))),
            };
        }

        sqlx::query(
            "INSERT INTO workflow_transition (
                request_id, from_status, to_status, action, actor_id, state_version, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.request_id.0)
        .bind(record.from.as_str())
        .bind(record.to.as_str())
        .bind(record.action.as_str())
        .bind(&record.actor_id.0)
        .bind(i64::from(record.version))
        .bind(record.occurred_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if let Some(effect) = &effect {
            apply_effect(&mut tx, &request.id, effect, record.occurred_at).await?;
        }
        tx.commit().await?;
        Ok(request)
    }

    async fn select_transitions(
        &self,
        id: &RequestId,
    ) -> Result<Vec<TransitionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, from_status, to_status, action, actor_id, state_version,
                    occurred_at
             FROM workflow_transition
             WHERE request_id = ?
             ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(transition_from_row).collect()
    }
}

async fn apply_effect(
    tx: &mut Transaction<'_, Sqlite>,
    request_id: &RequestId,
    effect: &TerminalEffect,
    applied_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    match effect {
        TerminalEffect::LeaveDebit { principal_id, days } => {
            sqlx::query(
                "INSERT INTO leave_debit (request_id, principal_id, days, applied_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&request_id.0)
            .bind(&principal_id.0)
            .bind(i64::from(*days))
            .bind(applied_at.to_rfc3339())
            .execute(&mut **tx)
            .await?;

            let debited = sqlx::query(
                "UPDATE principal SET leaves_consumed = leaves_consumed + ? WHERE id = ?",
            )
            .bind(i64::from(*days))
            .bind(&principal_id.0)
            .execute(&mut **tx)
            .await?;
            if debited.rows_affected() == 0 {
                return Err(RepositoryError::Missing(format!(
                    "no leave balance for principal {principal_id}"
                )));
            }
        }
        TerminalEffect::Allotment(allotment) => {
            sqlx::query(
                "INSERT INTO class_allotment (
                    id, request_id, faculty_id, teaching_unit_id, faculty_unit_id, subject,
                    class_name, section, course, semester, slot, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&allotment.id.0)
            .bind(&allotment.request_id.0)
            .bind(&allotment.faculty_id.0)
            .bind(&allotment.teaching_unit.0)
            .bind(&allotment.faculty_unit.0)
            .bind(&allotment.subject)
            .bind(&allotment.class_name)
            .bind(&allotment.section)
            .bind(allotment.course.as_deref())
            .bind(allotment.semester.map(i64::from))
            .bind(allotment.slot.as_deref())
            .bind(allotment.created_at.to_rfc3339())
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

fn request_from_row(row: SqliteRow) -> Result<WorkflowRequest, RepositoryError> {
    let role_raw = row.try_get::<String, _>("requester_role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown requester role `{role_raw}`")))?;
    let chain_raw = row.try_get::<String, _>("chain")?;
    let chain = RoutingChain::decode(&chain_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown routing chain `{chain_raw}`")))?;
    let status = parse_status("status", row.try_get("status")?)?;
    let payload_raw = row.try_get::<String, _>("payload_json")?;
    let payload: RequestPayload = serde_json::from_str(&payload_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid payload_json: {error}")))?;

    let kind_raw = row.try_get::<String, _>("kind")?;
    if payload.kind().as_str() != kind_raw {
        return Err(RepositoryError::Decode(format!(
            "payload kind `{}` does not match stored kind `{kind_raw}`",
            payload.kind().as_str()
        )));
    }

    Ok(WorkflowRequest {
        id: RequestId(row.try_get("id")?),
        requester: Requester {
            id: PrincipalId(row.try_get("requester_id")?),
            role,
            unit: row.try_get::<Option<String>, _>("requester_unit_id")?.map(UnitId),
        },
        payload,
        chain,
        scope_unit: row.try_get::<Option<String>, _>("scope_unit_id")?.map(UnitId),
        status,
        version: parse_u32("state_version", row.try_get("state_version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
        resolved_by: row.try_get::<Option<String>, _>("resolved_by")?.map(PrincipalId),
    })
}

fn transition_from_row(row: SqliteRow) -> Result<TransitionRecord, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = action_raw
        .parse::<WorkflowAction>()
        .map_err(|_| RepositoryError::Decode(format!("unknown workflow action `{action_raw}`")))?;

    Ok(TransitionRecord {
        request_id: RequestId(row.try_get("request_id")?),
        from: parse_status("from_status", row.try_get("from_status")?)?,
        to: parse_status("to_status", row.try_get("to_status")?)?,
        action,
        actor_id: PrincipalId(row.try_get("actor_id")?),
        version: parse_u32("state_version", row.try_get("state_version")?)?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

fn parse_status(column: &str, value: String) -> Result<RequestStatus, RepositoryError> {
    RequestStatus::parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status in `{column}`: `{value}`")))
}

#[async_trait::async_trait]
impl RequestStore for SqlWorkflowStore {
    async fn insert_request(
        &self,
        request: &WorkflowRequest,
        effect: Option<&TerminalEffect>,
    ) -> Result<(), StoreError> {
        Ok(self.insert_with_effect(request, effect).await?)
    }

    async fn find_request(&self, id: &RequestId) -> Result<Option<WorkflowRequest>, StoreError> {
        Ok(self.select_request(id).await?)
    }

    async fn has_approved_leave_covering(
        &self,
        principal_id: &PrincipalId,
        day: NaiveDate,
    ) -> Result<bool, StoreError> {
        Ok(self.count_covering_leave(principal_id, day).await? > 0)
    }

    async fn list_pending(&self) -> Result<Vec<WorkflowRequest>, StoreError> {
        Ok(self.select_pending().await?)
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<WorkflowRequest, StoreError> {
        Ok(self.commit_with_effect(commit).await?)
    }

    async fn transitions(&self, id: &RequestId) -> Result<Vec<TransitionRecord>, StoreError> {
        Ok(self.select_transitions(id).await?)
    }
}
