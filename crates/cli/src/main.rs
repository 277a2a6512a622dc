use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, bail};
use clap::{
    Arg, ArgAction, ArgMatches, Command,
    builder::{NonEmptyStringValueParser, ValueParser},
};
use serde_json::{Map, Value, json};
use stepwise_engine::{
    RunOptions, ShellProcessRunner, WorkflowError, decode_resume_token, load_workflow_file, resume_workflow, run_workflow,
};
use stepwise_types::{OutputPolicy, RunOutcome, WorkflowSource};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let matches = build_cli().get_matches();

    let envelope = match matches.subcommand() {
        Some(("run", sub)) => run_command(sub)?,
        Some(("resume", sub)) => resume_command(sub)?,
        Some(("validate", sub)) => validate_command(sub),
        _ => bail!("expected a subcommand: run, resume, or validate"),
    };

    println!("{}", serde_json::to_string_pretty(&envelope).context("failed to render result")?);
    let failed = envelope.get("status").and_then(Value::as_str) == Some("error");
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Logs go to stderr so stdout carries only the JSON result.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let file = Arg::new("file")
        .long("file")
        .short('f')
        .required(true)
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Path to the workflow YAML/JSON file");
    let output = Arg::new("output")
        .long("output")
        .action(ArgAction::Set)
        .default_value("all")
        .value_parser(ValueParser::new(|value: &str| value.parse::<OutputPolicy>()))
        .help("Which step results to print on completion: all, last, or marked");

    Command::new("stepwise")
        .about("Run sequential shell and LLM workflows with suspend/resume")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run a workflow from its first step")
                .arg(file.clone())
                .arg(
                    Arg::new("args-json")
                        .long("args-json")
                        .action(ArgAction::Set)
                        .help("JSON object of arg values overriding declared defaults"),
                )
                .arg(output.clone()),
        )
        .subcommand(
            Command::new("resume")
                .about("Continue a halted workflow with the host's completion")
                .arg(
                    Arg::new("token")
                        .long("token")
                        .required(true)
                        .action(ArgAction::Set)
                        .value_parser(NonEmptyStringValueParser::new())
                        .help("Resume token from a needs_llm result"),
                )
                .arg(
                    Arg::new("llm-response")
                        .long("llm-response")
                        .required(true)
                        .action(ArgAction::Set)
                        .value_parser(NonEmptyStringValueParser::new())
                        .help("Completion text for the halted prompt step, used verbatim"),
                )
                .arg(output),
        )
        .subcommand(Command::new("validate").about("Check a workflow file without running it").arg(file))
}

fn run_command(matches: &ArgMatches) -> Result<Value> {
    let options = run_options(matches).with_args(parse_args_json(matches.get_one::<String>("args-json"))?);
    let Some(file) = matches.get_one::<PathBuf>("file") else {
        bail!("--file is required");
    };
    debug!(file = %file.display(), "running workflow");

    let result = load_workflow_file(file).and_then(|definition| run_workflow(&definition, &options, &ShellProcessRunner));
    outcome_envelope(result)
}

fn resume_command(matches: &ArgMatches) -> Result<Value> {
    let options = run_options(matches);
    let (Some(token), Some(llm_response)) = (
        matches.get_one::<String>("token"),
        matches.get_one::<String>("llm-response"),
    ) else {
        bail!("--token and --llm-response are required");
    };

    let result = decode_resume_token(token)
        .map_err(WorkflowError::from)
        .and_then(|payload| resume_workflow(payload, llm_response, &options, &ShellProcessRunner));
    outcome_envelope(result)
}

fn validate_command(matches: &ArgMatches) -> Value {
    let Some(file) = matches.get_one::<PathBuf>("file") else {
        return json!({"status": "error", "error": {"kind": "usage", "message": "--file is required"}});
    };
    match load_workflow_file(file) {
        Ok(definition) => json!({
            "status": "ok",
            "workflow": WorkflowSource::of(&definition),
            "steps": definition.steps.len(),
        }),
        Err(error) => error_envelope(&error),
    }
}

fn run_options(matches: &ArgMatches) -> RunOptions {
    let output = matches
        .get_one::<OutputPolicy>("output")
        .copied()
        .unwrap_or_default();
    RunOptions::from_process_environment().with_output(output)
}

fn parse_args_json(raw: Option<&String>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("--args-json is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--args-json must be a JSON object, got {other}"),
    }
}

fn outcome_envelope(result: Result<RunOutcome, WorkflowError>) -> Result<Value> {
    match result {
        Ok(outcome) => serde_json::to_value(&outcome).context("failed to serialize run outcome"),
        Err(error) => Ok(error_envelope(&error)),
    }
}

fn error_envelope(error: &WorkflowError) -> Value {
    let mut body = Map::new();
    body.insert("kind".into(), json!(error.kind()));
    body.insert("message".into(), json!(error.to_string()));
    if let Some(step_id) = error.step_id() {
        body.insert("stepId".into(), json!(step_id));
    }
    if let WorkflowError::Validation { violations } = error {
        let violations: Vec<String> = violations.iter().map(ToString::to_string).collect();
        body.insert("violations".into(), json!(violations));
    }
    json!({"status": "error", "error": body})
}
