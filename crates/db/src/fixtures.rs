use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic roster of principals used by demos and CLI smoke runs.
///
/// Covers every role, one administrative unit and two teaching units so both
/// leave chains and the cross-unit assignment flow can be exercised end to end.
pub struct DemoInstitution;

const SEED_PRINCIPALS: &[SeedPrincipal] = &[
    SeedPrincipal { id: "adm-001", role: "administrator", unit: "administration" },
    SeedPrincipal { id: "hod-cse-001", role: "unit_head", unit: "cse" },
    SeedPrincipal { id: "dep-cse-001", role: "deputy_unit_head", unit: "cse" },
    SeedPrincipal { id: "fac-cse-001", role: "faculty", unit: "cse" },
    SeedPrincipal { id: "fac-cse-002", role: "faculty", unit: "cse" },
    SeedPrincipal { id: "stu-cse-001", role: "student", unit: "cse" },
    SeedPrincipal { id: "hod-ece-001", role: "unit_head", unit: "ece" },
    SeedPrincipal { id: "dep-ece-001", role: "deputy_unit_head", unit: "ece" },
    SeedPrincipal { id: "fac-ece-001", role: "faculty", unit: "ece" },
    SeedPrincipal { id: "stu-ece-001", role: "student", unit: "ece" },
];

impl DemoInstitution {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_institution.sql");

    /// Loads the roster. Existing principals are left as they are, so the
    /// load is idempotent and never resets consumed leave.
    ///
    /// `leave_allowance` is applied to seeded principals that have not
    /// consumed any leave yet.
    pub async fn load(pool: &DbPool, leave_allowance: u32) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        let ids = sql_array_from_ids(&seed_ids());
        sqlx::query(&format!(
            "UPDATE principal SET total_leave_allowance = ?
             WHERE id IN {ids} AND leaves_consumed = 0"
        ))
        .bind(i64::from(leave_allowance))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(SeedResult { principals_seeded: seed_ids() })
    }

    /// Checks that every seeded principal exists with its role and unit and
    /// that the administrative unit holds exactly one administrator.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for principal in SEED_PRINCIPALS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM principal
                    WHERE id = ?1 AND role = ?2 AND unit_id = ?3 AND active = 1
                )",
            )
            .bind(principal.id)
            .bind(principal.role)
            .bind(principal.unit)
            .fetch_one(pool)
            .await?;
            checks.push((principal.id, present == 1));
        }

        let administrators: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM principal
             WHERE role = 'administrator' AND unit_id = 'administration' AND active = 1",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("administrator-singleton", administrators == 1));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the roster and every request it raised.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let ids = sql_array_from_ids(&seed_ids());
        let mut tx = pool.begin().await?;

        sqlx::query(&format!("DELETE FROM workflow_request WHERE requester_id IN {ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM class_allotment WHERE faculty_id IN {ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM leave_debit WHERE principal_id IN {ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM principal WHERE id IN {ids}")).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedPrincipal {
    id: &'static str,
    role: &'static str,
    unit: &'static str,
}

fn seed_ids() -> Vec<&'static str> {
    SEED_PRINCIPALS.iter().map(|principal| principal.id).collect()
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub principals_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoInstitution::SQL.is_empty());
        for principal in SEED_PRINCIPALS {
            assert!(DemoInstitution::SQL.contains(principal.id), "{} missing", principal.id);
        }
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_keeps_consumed_leave() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoInstitution::load(&pool, 20).await.expect("load roster");
        assert_eq!(first.principals_seeded.len(), SEED_PRINCIPALS.len());
        let verification = DemoInstitution::verify(&pool).await.expect("verify roster");
        assert!(verification.all_present, "{:?}", verification.checks);

        sqlx::query("UPDATE principal SET leaves_consumed = 4 WHERE id = 'fac-cse-001'")
            .execute(&pool)
            .await
            .expect("consume leave");
        DemoInstitution::load(&pool, 30).await.expect("reload roster");

        let (allowance, consumed): (i64, i64) = sqlx::query_as(
            "SELECT total_leave_allowance, leaves_consumed
             FROM principal WHERE id = 'fac-cse-001'",
        )
        .fetch_one(&pool)
        .await
        .expect("read balance");
        assert_eq!((allowance, consumed), (20, 4));

        let principal_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM principal")
            .fetch_one(&pool)
            .await
            .expect("count principals");
        assert_eq!(principal_count, SEED_PRINCIPALS.len() as i64);
    }

    #[tokio::test]
    async fn clean_removes_roster() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoInstitution::load(&pool, 15).await.expect("load roster");

        DemoInstitution::clean(&pool).await.expect("clean roster");

        let verification = DemoInstitution::verify(&pool).await.expect("verify roster");
        assert!(!verification.all_present);
    }

    #[test]
    fn contract_json_matches_rust_seed_constants() {
        let contract: serde_json::Value = serde_json::from_str(include_str!(
            "../../../config/fixtures/demo_institution_contract.json"
        ))
        .expect("demo institution contract JSON must parse");

        let principals = contract["principals"].as_array().expect("principals should be an array");
        assert_eq!(principals.len(), SEED_PRINCIPALS.len());
        for (expected, actual) in SEED_PRINCIPALS.iter().zip(principals) {
            assert_eq!(actual["id"].as_str(), Some(expected.id));
            assert_eq!(actual["role"].as_str(), Some(expected.role));
            assert_eq!(actual["unit"].as_str(), Some(expected.unit));
        }
    }
}
