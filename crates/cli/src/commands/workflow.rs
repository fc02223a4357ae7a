//! Workflow commands run against the configured SQLite database.
//!
//! Each command opens one pool, applies pending migrations, performs a single
//! service call and prints one JSON outcome line. Workflow failures keep the
//! error's class name and exit with a code chosen by its interface class.

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use registrar_core::{
    AssignmentPayload, InterfaceError, LeavePayload, PrincipalId, RequestId, RequestPayload,
    WorkflowAction, WorkflowError, WorkflowService, WorkflowSettings,
};
use registrar_db::{connect_with_config, migrations, SqlWorkflowStore};

use crate::commands::{build_runtime, load_config, CommandResult};

type SqlService = WorkflowService<SqlWorkflowStore>;

#[derive(Clone, Debug)]
pub struct LeaveArgs {
    pub requester: String,
    pub leave_type: String,
    pub reason: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Clone, Debug)]
pub struct AssignmentArgs {
    pub requester: String,
    pub faculty: String,
    pub subject: String,
    pub class_name: String,
    pub section: String,
    pub course: Option<String>,
    pub semester: Option<u8>,
    pub slot: Option<String>,
}

struct Outcome {
    message: String,
    data: Value,
}

pub fn submit_leave(args: LeaveArgs) -> CommandResult {
    execute("submit-leave", |service| async move {
        let payload = RequestPayload::Leave(LeavePayload {
            leave_type: args.leave_type,
            reason: args.reason,
            start_date: args.start,
            end_date: args.end,
        });
        let request = service.submit(&PrincipalId(args.requester), payload).await?;
        Ok(Outcome {
            message: format!("leave request {} is {}", request.id, request.status),
            data: json!({ "request": request }),
        })
    })
}

pub fn submit_assignment(args: AssignmentArgs) -> CommandResult {
    execute("submit-assignment", |service| async move {
        let payload = RequestPayload::CrossUnitAssignment(AssignmentPayload {
            faculty_id: PrincipalId(args.faculty),
            subject: args.subject,
            class_name: args.class_name,
            section: args.section,
            course: args.course,
            semester: args.semester,
            slot: args.slot,
        });
        let request = service.submit(&PrincipalId(args.requester), payload).await?;
        Ok(Outcome {
            message: format!("assignment request {} is {}", request.id, request.status),
            data: json!({ "request": request }),
        })
    })
}

pub fn act(request_id: String, actor: String, action: WorkflowAction) -> CommandResult {
    execute("act", |service| async move {
        let request = service.act(&RequestId(request_id), &PrincipalId(actor), action).await?;
        // The transition is committed; a failed read only drops the allotments from the output.
        let allotments = match service.allotments(&request.id).await {
            Ok(allotments) => allotments,
            Err(error) => {
                warn!(
                    event_name = "cli.workflow.allotments_unavailable",
                    request_id = %request.id,
                    error = %error,
                    "could not read allotments after the transition"
                );
                Vec::new()
            }
        };
        Ok(Outcome {
            message: format!("{action} recorded; request {} is {}", request.id, request.status),
            data: json!({ "request": request, "allotments": allotments }),
        })
    })
}

pub fn show(request_id: String) -> CommandResult {
    execute("show", |service| async move {
        let request_id = RequestId(request_id);
        let request = service.find(&request_id).await?;
        let history = service.history(&request_id).await?;
        let stage = service.actionable_by(&request_id).await?;
        let allotments = service.allotments(&request_id).await?;
        Ok(Outcome {
            message: format!("request {} is {}", request.id, request.status),
            data: json!({
                "request": request,
                "history": history,
                "stage": stage,
                "allotments": allotments,
            }),
        })
    })
}

pub fn faculty_allotments(faculty: String) -> CommandResult {
    execute("allotments", |service| async move {
        let allotments = service.faculty_allotments(&PrincipalId(faculty.clone())).await?;
        Ok(Outcome {
            message: format!("{} allotment(s) recorded for {faculty}", allotments.len()),
            data: json!({ "allotments": allotments }),
        })
    })
}

pub fn pending(principal: String) -> CommandResult {
    execute("pending", |service| async move {
        let requests = service.pending_for(&PrincipalId(principal.clone())).await?;
        Ok(Outcome {
            message: format!("{} pending request(s) actionable by {principal}", requests.len()),
            data: json!({ "requests": requests }),
        })
    })
}

pub fn balance(principal: String) -> CommandResult {
    execute("balance", |service| async move {
        let balance = service.balance(&PrincipalId(principal)).await?;
        Ok(Outcome {
            message: format!(
                "{} has {} of {} leave days remaining",
                balance.principal_id,
                balance.remaining(),
                balance.total_allowance
            ),
            data: json!({ "balance": balance, "remaining": balance.remaining() }),
        })
    })
}

fn execute<F, Fut>(command: &'static str, operation: F) -> CommandResult
where
    F: FnOnce(Arc<SqlService>) -> Fut,
    Fut: Future<Output = Result<Outcome, WorkflowError>>,
{
    let config = match load_config(command) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime(command) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(command, "db_connectivity", error.to_string(), 4)
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            pool.close().await;
            return CommandResult::failure(command, "migration", error.to_string(), 5);
        }

        let store = SqlWorkflowStore::with_default_allowance(
            pool.clone(),
            config.workflow.default_leave_allowance,
        );
        let settings = WorkflowSettings::from(&config.workflow);
        let service = Arc::new(WorkflowService::new(Arc::new(store), settings));

        info!(event_name = "cli.workflow.command_started", command, "running workflow command");
        let result = operation(service).await;
        pool.close().await;

        match result {
            Ok(outcome) => CommandResult::success_with_data(command, outcome.message, outcome.data),
            Err(error) => workflow_failure(command, error),
        }
    })
}

fn workflow_failure(command: &str, error: WorkflowError) -> CommandResult {
    let error_class = error.class();
    let detail = error.to_string();
    let interface = error.into_interface(format!("cli-{}", Uuid::new_v4()));
    let message = format!(
        "{} {detail} (correlation_id: {})",
        interface.user_message(),
        interface.correlation_id()
    );
    CommandResult::failure(command, error_class, message, exit_code_for(&interface))
}

fn exit_code_for(interface: &InterfaceError) -> u8 {
    match interface {
        InterfaceError::BadRequest { .. } => 10,
        InterfaceError::Forbidden { .. } => 11,
        InterfaceError::Conflict { .. } => 12,
        InterfaceError::ServiceUnavailable { .. } => 13,
        InterfaceError::Internal { .. } => 14,
    }
}

#[cfg(test)]
mod tests {
    use registrar_core::{PrincipalId, RequestId, RequestStatus, WorkflowAction, WorkflowError};

    use super::workflow_failure;

    #[test]
    fn workflow_failures_keep_class_and_map_exit_code() {
        let forbidden = workflow_failure(
            "act",
            WorkflowError::Unauthorized {
                request_id: RequestId("REQ-1".to_string()),
                actor: PrincipalId("fac-ece-001".to_string()),
                action: WorkflowAction::Approve,
                status: RequestStatus::Approved,
            },
        );
        assert_eq!(forbidden.exit_code, 11);
        let payload: serde_json::Value =
            serde_json::from_str(&forbidden.output).expect("valid JSON");
        assert_eq!(payload["error_class"], "unauthorized");
        assert!(payload["message"].as_str().unwrap_or_default().contains("correlation_id: cli-"));

        let conflict = workflow_failure(
            "act",
            WorkflowError::PersistenceConflict {
                request_id: RequestId("REQ-1".to_string()),
                expected_version: 2,
            },
        );
        assert_eq!(conflict.exit_code, 12);
    }
}
