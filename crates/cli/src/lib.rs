pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use registrar_core::WorkflowAction;
use std::process::ExitCode;

use crate::commands::workflow::{AssignmentArgs, LeaveArgs};

#[derive(Debug, Parser)]
#[command(
    name = "registrar",
    about = "Registrar approval workflow CLI",
    long_about = "Submit and act on leave and cross-unit assignment requests.",
    after_help = concat!(
        "Examples:\n",
        "  registrar migrate\n",
        "  registrar seed\n",
        "  registrar submit-leave --requester stu-cse-001 --leave-type casual \\\n",
        "    --reason travel --start 2026-04-01 --end 2026-04-03\n",
        "  registrar act <REQUEST_ID> --actor fac-cse-001 --action approve",
    )
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo institution roster")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, schema and administrator readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Submit a leave request on behalf of a principal")]
    SubmitLeave {
        #[arg(long)]
        requester: String,
        #[arg(long)]
        leave_type: String,
        #[arg(long)]
        reason: String,
        #[arg(long, help = "First day of leave (YYYY-MM-DD)")]
        start: NaiveDate,
        #[arg(long, help = "Last day of leave, inclusive (YYYY-MM-DD)")]
        end: NaiveDate,
    },
    #[command(about = "Ask another unit's head to lend a faculty member for a class")]
    SubmitAssignment {
        #[arg(long, help = "Unit head raising the request")]
        requester: String,
        #[arg(long, help = "Faculty member from another unit")]
        faculty: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        class_name: String,
        #[arg(long)]
        section: String,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        semester: Option<u8>,
        #[arg(long)]
        slot: Option<String>,
    },
    #[command(about = "Approve, reject or revoke a pending request")]
    Act {
        request_id: String,
        #[arg(long)]
        actor: String,
        #[arg(long, help = "approve | reject | revoke")]
        action: WorkflowAction,
    },
    #[command(about = "Show a request with its history, current actors and allotments")]
    Show { request_id: String },
    #[command(about = "List pending requests a principal can act on now")]
    Pending {
        #[arg(long)]
        principal: String,
    },
    #[command(about = "List classes allotted to a faculty member by approved assignments")]
    Allotments {
        #[arg(long)]
        faculty: String,
    },
    #[command(about = "Show a principal's leave balance")]
    Balance {
        #[arg(long)]
        principal: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::SubmitLeave { requester, leave_type, reason, start, end } => {
            let args = LeaveArgs { requester, leave_type, reason, start, end };
            commands::workflow::submit_leave(args)
        }
        Command::SubmitAssignment {
            requester,
            faculty,
            subject,
            class_name,
            section,
            course,
            semester,
            slot,
        } => commands::workflow::submit_assignment(AssignmentArgs {
            requester,
            faculty,
            subject,
            class_name,
            section,
            course,
            semester,
            slot,
        }),
        Command::Act { request_id, actor, action } => {
            commands::workflow::act(request_id, actor, action)
        }
        Command::Show { request_id } => commands::workflow::show(request_id),
        Command::Pending { principal } => commands::workflow::pending(principal),
        Command::Allotments { faculty } => commands::workflow::faculty_allotments(faculty),
        Command::Balance { principal } => commands::workflow::balance(principal),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
