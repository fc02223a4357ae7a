use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::NaiveDate;
use registrar_cli::commands::workflow::{self, AssignmentArgs, LeaveArgs};
use registrar_cli::commands::{migrate, seed};
use registrar_core::WorkflowAction;
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_database(|| {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("REGISTRAR_DATABASE_URL", "postgres://elsewhere/registrar")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_database(|| {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");
        assert!(first_payload["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("demo institution loaded with 10 principals"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn student_leave_moves_through_both_stages_and_debits_balance() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let submitted = workflow::submit_leave(LeaveArgs {
            requester: "stu-cse-001".to_string(),
            leave_type: "casual".to_string(),
            reason: "family event".to_string(),
            start: date(2026, 4, 6),
            end: date(2026, 4, 8),
        });
        assert_eq!(submitted.exit_code, 0, "submit failed: {}", submitted.output);
        let payload = parse_payload(&submitted.output);
        assert_eq!(payload["command"], "submit-leave");
        assert_eq!(payload["data"]["request"]["status"], "pending_faculty");
        let request_id = payload["data"]["request"]["id"].as_str().unwrap_or_default().to_string();
        assert!(!request_id.is_empty());

        let pending = workflow::pending("fac-cse-001".to_string());
        let pending_payload = parse_payload(&pending.output);
        assert_eq!(pending_payload["data"]["requests"].as_array().map(Vec::len), Some(1));

        let faculty = workflow::act(
            request_id.clone(),
            "fac-cse-001".to_string(),
            WorkflowAction::Approve,
        );
        assert_eq!(faculty.exit_code, 0, "faculty approval failed: {}", faculty.output);
        assert_eq!(
            parse_payload(&faculty.output)["data"]["request"]["status"],
            "pending_unit_head"
        );

        let head =
            workflow::act(request_id.clone(), "hod-cse-001".to_string(), WorkflowAction::Approve);
        assert_eq!(head.exit_code, 0, "unit head approval failed: {}", head.output);
        assert_eq!(parse_payload(&head.output)["data"]["request"]["status"], "approved");

        let shown = parse_payload(&workflow::show(request_id).output);
        assert_eq!(shown["data"]["history"].as_array().map(Vec::len), Some(2));

        let balance = parse_payload(&workflow::balance("stu-cse-001".to_string()).output);
        assert_eq!(balance["data"]["balance"]["consumed"], 3);
        assert_eq!(balance["data"]["remaining"], 12);
    });
}

#[test]
fn acting_outside_the_chain_is_forbidden() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let submitted = workflow::submit_leave(LeaveArgs {
            requester: "stu-ece-001".to_string(),
            leave_type: "medical".to_string(),
            reason: "clinic visit".to_string(),
            start: date(2026, 4, 13),
            end: date(2026, 4, 13),
        });
        let request_id = parse_payload(&submitted.output)["data"]["request"]["id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let result = workflow::act(request_id, "fac-cse-001".to_string(), WorkflowAction::Approve);
        assert_eq!(result.exit_code, 11, "expected forbidden exit code: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "act");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "unauthorized");
    });
}

#[test]
fn approved_assignment_is_listed_for_the_faculty_member() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let submitted = workflow::submit_assignment(AssignmentArgs {
            requester: "hod-cse-001".to_string(),
            faculty: "fac-ece-001".to_string(),
            subject: "Digital Electronics".to_string(),
            class_name: "CSE-2".to_string(),
            section: "B".to_string(),
            course: None,
            semester: Some(3),
            slot: Some("WED-2".to_string()),
        });
        assert_eq!(submitted.exit_code, 0, "submit failed: {}", submitted.output);
        let request_id = parse_payload(&submitted.output)["data"]["request"]["id"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let approved =
            workflow::act(request_id, "hod-ece-001".to_string(), WorkflowAction::Approve);
        assert_eq!(approved.exit_code, 0, "approval failed: {}", approved.output);
        assert_eq!(
            parse_payload(&approved.output)["data"]["allotments"].as_array().map(Vec::len),
            Some(1)
        );

        let listed = workflow::faculty_allotments("fac-ece-001".to_string());
        assert_eq!(listed.exit_code, 0);
        let payload = parse_payload(&listed.output);
        assert_eq!(payload["command"], "allotments");
        assert_eq!(payload["data"]["allotments"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn unknown_request_is_a_bad_request() {
    with_database(|| {
        let result = workflow::show("REQ-missing".to_string());
        assert_eq!(result.exit_code, 10, "expected bad request exit code: {}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "request_not_found");
    });
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_database(test_fn: impl FnOnce()) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}/registrar.db?mode=rwc", dir.path().display());
    with_env(&[("REGISTRAR_DATABASE_URL", url.as_str())], test_fn);
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REGISTRAR_DATABASE_URL",
        "REGISTRAR_DATABASE_MAX_CONNECTIONS",
        "REGISTRAR_DATABASE_TIMEOUT_SECS",
        "REGISTRAR_WORKFLOW_DEFAULT_LEAVE_ALLOWANCE",
        "REGISTRAR_WORKFLOW_ADMINISTRATIVE_UNIT",
        "REGISTRAR_LOGGING_LEVEL",
        "REGISTRAR_LOGGING_FORMAT",
        "REGISTRAR_LOG_LEVEL",
        "REGISTRAR_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
