use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use registrar_core::domain::principal::{LeaveBalance, Principal, PrincipalId, Role, UnitId};
use registrar_core::store::{LeaveBalanceStore, PrincipalDirectory, StoreError};

use super::{parse_u32, RepositoryError, SqlWorkflowStore};

const PRINCIPAL_COLUMNS: &str = "id, display_name, role, unit_id, active";

impl SqlWorkflowStore {
    /// Inserts or updates a principal. Leave allowance and consumed days of
    /// an existing principal are left untouched.
    pub async fn register_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        Ok(self.upsert_principal(principal).await?)
    }

    pub async fn set_allowance(
        &self,
        principal_id: &PrincipalId,
        total_allowance: u32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE principal SET total_leave_allowance = ? WHERE id = ?")
            .bind(i64::from(total_allowance))
            .bind(&principal_id.0)
            .execute(self.pool())
            .await
            .map_err(RepositoryError::from)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::Missing(format!("principal {principal_id}")).into());
        }
        Ok(())
    }

    async fn upsert_principal(&self, principal: &Principal) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO principal (
                id, display_name, role, unit_id, active, total_leave_allowance,
                leaves_consumed, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                unit_id = excluded.unit_id,
                active = excluded.active",
        )
        .bind(&principal.id.0)
        .bind(&principal.display_name)
        .bind(principal.role.as_str())
        .bind(principal.unit.as_ref().map(|unit| unit.0.as_str()))
        .bind(principal.active)
        .bind(i64::from(self.default_allowance))
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn select_principal(
        &self,
        id: &PrincipalId,
    ) -> Result<Option<Principal>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PRINCIPAL_COLUMNS} FROM principal WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(self.pool())
            .await?;
        row.map(principal_from_row).transpose()
    }

    async fn select_principals(
        &self,
        role: Role,
        unit: Option<&UnitId>,
    ) -> Result<Vec<Principal>, RepositoryError> {
        let rows = if let Some(unit) = unit {
            sqlx::query(&format!(
                "SELECT {PRINCIPAL_COLUMNS} FROM principal
                 WHERE active = 1 AND role = ? AND unit_id = ?
                 ORDER BY id ASC"
            ))
            .bind(role.as_str())
            .bind(&unit.0)
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {PRINCIPAL_COLUMNS} FROM principal
                 WHERE active = 1 AND role = ?
                 ORDER BY id ASC"
            ))
            .bind(role.as_str())
            .fetch_all(self.pool())
            .await?
        };
        rows.into_iter().map(principal_from_row).collect()
    }

    /// Active administrators with no unit or affiliated with `unit`.
    async fn select_administrators(
        &self,
        unit: &UnitId,
    ) -> Result<Vec<Principal>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principal
             WHERE active = 1 AND role = ? AND (unit_id IS NULL OR unit_id = ?)
             ORDER BY id ASC"
        ))
        .bind(Role::Administrator.as_str())
        .bind(&unit.0)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(principal_from_row).collect()
    }

    async fn select_balance(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<LeaveBalance>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, total_leave_allowance, leaves_consumed FROM principal WHERE id = ?",
        )
        .bind(&principal_id.0)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| {
            Ok(LeaveBalance {
                principal_id: PrincipalId(row.try_get("id")?),
                total_allowance: parse_u32(
                    "total_leave_allowance",
                    row.try_get("total_leave_allowance")?,
                )?,
                consumed: parse_u32("leaves_consumed", row.try_get("leaves_consumed")?)?,
            })
        })
        .transpose()
    }
}

fn principal_from_row(row: SqliteRow) -> Result<Principal, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown principal role `{role_raw}`")))?;

    Ok(Principal {
        id: PrincipalId(row.try_get("id")?),
        display_name: row.try_get("display_name")?,
        role,
        unit: row.try_get::<Option<String>, _>("unit_id")?.map(UnitId),
        active: row.try_get("active")?,
    })
}

#[async_trait::async_trait]
impl PrincipalDirectory for SqlWorkflowStore {
    async fn find_principal(&self, id: &PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.select_principal(id).await?)
    }

    async fn list_principals(
        &self,
        role: Role,
        unit: Option<&UnitId>,
    ) -> Result<Vec<Principal>, StoreError> {
        Ok(self.select_principals(role, unit).await?)
    }

    async fn administrator(&self, unit: &UnitId) -> Result<Option<Principal>, StoreError> {
        let mut administrators = self.select_administrators(unit).await?;
        match administrators.len() {
            0 | 1 => Ok(administrators.pop()),
            count => Err(StoreError::AmbiguousAdministrator { unit: unit.clone(), count }),
        }
    }
}

#[async_trait::async_trait]
impl LeaveBalanceStore for SqlWorkflowStore {
    async fn balance(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<LeaveBalance>, StoreError> {
        Ok(self.select_balance(principal_id).await?)
    }
}
