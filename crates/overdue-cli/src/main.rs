mod cli;
mod dispatch;
mod output;
mod stdout_io;

use std::process::ExitCode;

use clap::{Parser, error::ErrorKind};
use overdue_client::ClientError;
use stdout_io::write_stdout_text;
use tracing_subscriber::EnvFilter;

const ROOT_HELP: &str = "overdue - collections and dunning escalation

Usage:
  overdue <command>

Start here:
  overdue report overdue
  overdue batch run
  overdue --help
";

const TOP_LEVEL_HELP: &str = "overdue - collections and dunning escalation

USAGE: overdue [--home <dir>] [--actor <name>] [--json] <command>

Set up a customer:
  overdue customer add <name> --email <email>              Register a customer
  overdue policy create <customer>                         Create a dunning policy (defaults 7/14/21 days)
  overdue policy update <policy-id> --level2-fee 12        Change selected policy fields
  overdue policy show <customer>                           Show policy and service state

Record invoices:
  overdue invoice add <number> --customer <id> --amount <n> Record an invoice
  overdue invoice flag-overdue                             Move past-due invoices to overdue
  overdue invoice pay <invoice-id>                         Mark paid and reactivate service if possible

Escalate:
  overdue batch run                                        Apply every due level transition once
  overdue escalate <level> <invoice-id>                    Move one invoice to the next level by hand

Service:
  overdue service check <customer>                         Is service allowed right now?
  overdue service suspend <customer> --reason <text>       Suspend by hand
  overdue service reactivate <customer>                    Lift a suspension

Reports:
  overdue report overdue                                   Overdue invoices with aging and next action
  overdue report upcoming                                  Invoices reaching their next level soon
  overdue report history <customer>                        Dunning events, newest first
  overdue report suspended                                 Suspended customers
  overdue report stats --from <date> --to <date>           Dunning effectiveness

Writes need an actor: pass --actor or set OVERDUE_ACTOR.
The ledger lives in $OVERDUE_HOME (default ~/.overdue).
Run `overdue <command> --help` for command usage.
";

/// Flags whose next argument is a value, not part of the command path.
const GLOBAL_VALUE_FLAGS: [&str; 2] = ["--home", "--actor"];

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(code) => code,
        Err(code) => code,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<ExitCode, ExitCode> {
    let raw_args = std::env::args().collect::<Vec<String>>();
    if raw_args.len() == 1 {
        if write_stdout_text(ROOT_HELP).is_err() {
            return Err(ExitCode::from(2));
        }
        return Ok(ExitCode::SUCCESS);
    }
    let parsed = cli::Cli::try_parse();
    let cli = match parsed {
        Ok(value) => value,
        Err(err) => {
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) {
                let text = if is_top_level_help_request(&raw_args) {
                    TOP_LEVEL_HELP.to_string()
                } else {
                    err.to_string()
                };
                if write_stdout_text(&text).is_err() {
                    return Err(ExitCode::from(2));
                }
                return Ok(ExitCode::SUCCESS);
            }
            let command_hint = if matches!(
                err.kind(),
                ErrorKind::MissingRequiredArgument
                    | ErrorKind::InvalidValue
                    | ErrorKind::ValueValidation
                    | ErrorKind::WrongNumberOfValues
                    | ErrorKind::UnknownArgument
                    | ErrorKind::InvalidSubcommand
                    | ErrorKind::ArgumentConflict
            ) {
                command_path_from_args(&raw_args)
            } else {
                None
            };
            let clean_message = strip_clap_boilerplate(&err.to_string());
            let parse_error =
                ClientError::invalid_argument_for_command(&clean_message, command_hint.as_deref());
            let mode = output::mode_for_args(&raw_args);
            if output::print_failure(command_hint.as_deref(), &parse_error, mode).is_err() {
                return Err(ExitCode::from(2));
            }
            return Err(ExitCode::from(1));
        }
    };
    let mode = output::mode_for_cli(&cli);
    let command = command_path_from_args(&raw_args);
    tracing::debug!(command = command.as_deref().unwrap_or("?"), "dispatching");

    match dispatch::dispatch(&cli) {
        Ok(success) => {
            if output::print_success(&success, mode).is_err() {
                return Err(ExitCode::from(2));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            if is_internal_error(&error) {
                tracing::error!(code = %error.code, "{}", error.message);
            }
            if output::print_failure(command.as_deref(), &error, mode).is_err() {
                return Err(ExitCode::from(2));
            }
            Err(exit_code_for_error(&error))
        }
    }
}

fn is_top_level_help_request(raw_args: &[String]) -> bool {
    raw_args.len() == 2 && matches!(raw_args[1].as_str(), "--help" | "-h")
}

/// Drops clap's trailing usage and "For more information" lines; the
/// recovery steps carry that guidance instead.
fn strip_clap_boilerplate(message: &str) -> String {
    let trimmed = if let Some(pos) = message.find("\n\nUsage:") {
        &message[..pos]
    } else if let Some(pos) = message.find("\nFor more information") {
        &message[..pos]
    } else {
        message
    };
    trimmed.trim_end().to_string()
}

/// Command path ("report overdue", "service check") from raw args, skipping
/// flags and the values of global flags.
fn command_path_from_args(raw_args: &[String]) -> Option<String> {
    let mut words = Vec::new();
    let mut skip_value = false;
    for arg in raw_args.iter().skip(1) {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg.starts_with('-') {
            skip_value = GLOBAL_VALUE_FLAGS.contains(&arg.as_str());
            continue;
        }
        words.push(arg.as_str());
    }

    let hint = match words.as_slice() {
        ["customer", "add", ..] => "customer add",
        ["customer", ..] => "customer",
        ["invoice", "add", ..] => "invoice add",
        ["invoice", "pay", ..] => "invoice pay",
        ["invoice", "flag-overdue", ..] => "invoice flag-overdue",
        ["invoice", ..] => "invoice",
        ["policy", "create", ..] => "policy create",
        ["policy", "update", ..] => "policy update",
        ["policy", "show", ..] => "policy show",
        ["policy", ..] => "policy",
        ["escalate", ..] => "escalate",
        ["service", "suspend", ..] => "service suspend",
        ["service", "reactivate", ..] => "service reactivate",
        ["service", "auto-reactivate", ..] => "service auto-reactivate",
        ["service", "check", ..] => "service check",
        ["service", ..] => "service",
        ["batch", "run", ..] => "batch run",
        ["batch", ..] => "batch",
        ["report", "overdue", ..] => "report overdue",
        ["report", "history", ..] => "report history",
        ["report", "suspended", ..] => "report suspended",
        ["report", "stats", ..] => "report stats",
        ["report", "upcoming", ..] => "report upcoming",
        ["report", ..] => "report",
        _ => return None,
    };
    Some(hint.to_string())
}

fn exit_code_for_error(error: &ClientError) -> ExitCode {
    if is_internal_error(error) {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}

fn is_internal_error(error: &ClientError) -> bool {
    error.code.starts_with("internal_")
        || matches!(
            error.code.as_str(),
            "ledger_init_permission_denied"
                | "ledger_locked"
                | "ledger_corrupt"
                | "migration_failed"
                | "ledger_init_failed"
        )
}
