#![cfg(unix)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::json;
use stepwise_engine::{
    RunOptions, ShellProcessRunner, WorkflowError, decode_resume_token, load_workflow_file, resume_workflow, run_workflow,
};
use stepwise_types::{LlmRequest, OutputPolicy, RunOutcome, StepResult};

fn write_workflow(directory: &Path, file_name: &str, content: &str) -> PathBuf {
    let path = directory.join(file_name);
    fs::write(&path, content).expect("write workflow");
    path
}

fn run_file(path: &Path, options: &RunOptions) -> Result<RunOutcome, WorkflowError> {
    let definition = load_workflow_file(path)?;
    run_workflow(&definition, options, &ShellProcessRunner)
}

fn resume(request: &LlmRequest, completion: &str, options: &RunOptions) -> Result<RunOutcome, WorkflowError> {
    let payload = decode_resume_token(&request.resume_token)?;
    resume_workflow(payload, completion, options, &ShellProcessRunner)
}

fn expect_halt(outcome: RunOutcome) -> LlmRequest {
    match outcome {
        RunOutcome::NeedsLlm { request } => request,
        other => panic!("expected needs_llm, got {other:?}"),
    }
}

fn expect_ok(outcome: RunOutcome) -> Vec<StepResult> {
    match outcome {
        RunOutcome::Ok { output } => output,
        other => panic!("expected ok, got {other:?}"),
    }
}

fn stdout_of<'a>(output: &'a [StepResult], id: &str) -> &'a str {
    output
        .iter()
        .find(|result| result.id == id)
        .map(|result| result.stdout.as_str())
        .unwrap_or_else(|| panic!("no result for step '{id}'"))
}

#[test]
fn prompt_halts_and_completion_flows_downstream_verbatim() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "capital.yaml",
        r#"
name: capital
args:
  country:
    default: France
steps:
  - id: facts
    command: printf '%s has many cities' "${country}"
  - id: ask
    prompt: What is the capital of ${country}?
    system: Answer with one word.
    stdin: ${facts.stdout}
  - id: shout
    command: tr a-z A-Z
    stdin: ${ask.stdout}
"#,
    );
    let options = RunOptions::from_process_environment();

    let request = expect_halt(run_file(&path, &options).expect("run"));
    assert_eq!(request.step_id, "ask");
    assert_eq!(request.prompt, "What is the capital of France?");
    assert_eq!(request.system.as_deref(), Some("Answer with one word."));
    assert_eq!(request.context.as_deref(), Some("France has many cities"));

    let output = expect_ok(resume(&request, "Paris $facts.stdout\n", &options).expect("resume"));
    assert_eq!(stdout_of(&output, "ask"), "Paris $facts.stdout\n");
    assert_eq!(stdout_of(&output, "shout"), "PARIS $FACTS.STDOUT\n");
    assert_eq!(output.len(), 3);
}

#[test]
fn two_prompts_take_two_round_trips_in_order() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "pair.yaml",
        r#"
name: pair
steps:
  - id: first
    prompt: Name a color.
  - id: second
    prompt: Name a fruit that is ${first.stdout}.
  - id: combine
    command: printf '%s/%s' "${first.stdout}" "${second.stdout}"
"#,
    );
    let options = RunOptions::from_process_environment();

    let first = expect_halt(run_file(&path, &options).expect("run"));
    assert_eq!(first.step_id, "first");

    let second = expect_halt(resume(&first, "red", &options).expect("first resume"));
    assert_eq!(second.step_id, "second");
    assert_eq!(second.prompt, "Name a fruit that is red.");

    let output = expect_ok(resume(&second, "apple", &options).expect("second resume"));
    assert_eq!(stdout_of(&output, "combine"), "red/apple");
}

#[test]
fn relative_cwd_resolves_against_the_workflow_directory() {
    let directory = tempfile::tempdir().expect("tempdir");
    fs::create_dir(directory.path().join("work")).expect("create work dir");
    let path = write_workflow(
        directory.path(),
        "dirs.yaml",
        r#"
name: dirs
steps:
  - id: default_dir
    command: pwd
  - id: relative_dir
    command: pwd
    cwd: work
"#,
    );

    let output = expect_ok(run_file(&path, &RunOptions::from_process_environment()).expect("run"));
    let reported = |id: &str| fs::canonicalize(stdout_of(&output, id).trim()).expect("canonical pwd");
    let base = fs::canonicalize(directory.path()).expect("canonical tempdir");
    assert_eq!(reported("default_dir"), base);
    assert_eq!(reported("relative_dir"), base.join("work"));
}

#[test]
fn args_outrank_the_parent_environment() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "args.yaml",
        r#"
name: args-first
args:
  NAME:
    default: arg-value
env:
  NAME: ${NAME}
steps:
  - id: show
    command: printf '%s' "$NAME"
"#,
    );
    let mut options = RunOptions::from_process_environment();
    options.parent_env.insert("NAME".into(), "env-value".into());

    let output = expect_ok(run_file(&path, &options).expect("run"));
    assert_eq!(stdout_of(&output, "show"), "arg-value");
}

#[test]
fn step_env_outranks_workflow_env_which_outranks_parent() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "layers.yaml",
        r#"
name: layers
env:
  V: workflow
steps:
  - id: workflow_level
    command: printf '%s' "$V"
  - id: step_level
    command: printf '%s' "$V"
    env:
      V: step
"#,
    );
    let mut options = RunOptions::from_process_environment();
    options.parent_env.insert("V".into(), "parent".into());

    let output = expect_ok(run_file(&path, &options).expect("run"));
    assert_eq!(stdout_of(&output, "workflow_level"), "workflow");
    assert_eq!(stdout_of(&output, "step_level"), "step");
}

#[test]
fn shell_variables_pass_through_untouched() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "shell.yaml",
        r#"
name: shell
steps:
  - id: backup
    command: printf '%s' "$HOME.bak"
"#,
    );
    let mut options = RunOptions::from_process_environment();
    options.parent_env.insert("HOME".into(), "/home/dev".into());

    let output = expect_ok(run_file(&path, &options).expect("run"));
    assert_eq!(stdout_of(&output, "backup"), "/home/dev.bak");
}

#[test]
fn json_output_is_addressable_by_later_steps() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "json.yaml",
        r#"
name: json
steps:
  - id: fetch
    command: |-
      printf '{"items": [{"id": "a1"}, {"id": "b2"}], "count": 2}'
  - id: pick
    command: printf '%s:%s' "$fetch.json.items[1].id" "${fetch.json.count}"
"#,
    );

    let output = expect_ok(run_file(&path, &RunOptions::from_process_environment()).expect("run"));
    assert_eq!(output[0].json, Some(json!({"items": [{"id": "a1"}, {"id": "b2"}], "count": 2})));
    assert_eq!(stdout_of(&output, "pick"), "b2:2");
}

#[test]
fn nonzero_exit_fails_the_run_without_partial_output() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "fail.yaml",
        r#"
name: fail
steps:
  - id: fine
    command: echo ok
  - id: broken
    command: echo "disk full" >&2; exit 3
  - id: never
    command: echo unreachable
"#,
    );

    let error = run_file(&path, &RunOptions::from_process_environment()).expect_err("run fails");
    assert_eq!(error.kind(), "execution");
    assert_eq!(error.step_id(), Some("broken"));
    let message = error.to_string();
    assert!(message.contains("status 3"), "{message}");
    assert!(message.contains("disk full"), "{message}");
}

#[test]
fn invalid_workflows_never_start() {
    let directory = tempfile::tempdir().expect("tempdir");
    let marker = directory.path().join("ran");
    let path = write_workflow(
        directory.path(),
        "invalid.yaml",
        &format!(
            r#"
name: invalid
steps:
  - id: touch
    command: touch {}
  - id: conflicted
    command: echo hi
    prompt: hello
  - id: empty
"#,
            marker.display()
        ),
    );

    let error = load_workflow_file(&path).expect_err("validation fails");
    let WorkflowError::Validation { violations } = &error else {
        panic!("expected validation error, got {error:?}");
    };
    assert_eq!(violations.len(), 2);
    assert!(violations[0].message.contains("both 'command' and 'prompt'"));
    assert!(violations[1].message.contains("neither 'command' nor 'prompt'"));
    assert!(!marker.exists());
}

#[test]
fn tampered_tokens_are_decode_errors() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "ask.yaml",
        r#"
name: ask
steps:
  - id: q
    prompt: hi
"#,
    );
    let options = RunOptions::from_process_environment();
    let mut request = expect_halt(run_file(&path, &options).expect("run"));
    request.resume_token.truncate(request.resume_token.len() / 2);
    request.resume_token.push('!');

    let error = resume(&request, "hello", &options).expect_err("tampered");
    assert_eq!(error.kind(), "decode");
}

#[test]
fn tokens_for_an_edited_workflow_are_rejected() {
    let directory = tempfile::tempdir().expect("tempdir");
    let original = r#"
name: editable
steps:
  - id: q
    prompt: hi
"#;
    let path = write_workflow(directory.path(), "edit.yaml", original);
    let options = RunOptions::from_process_environment();
    let request = expect_halt(run_file(&path, &options).expect("run"));

    write_workflow(directory.path(), "edit.yaml", &original.replace("editable", "renamed"));
    let error = resume(&request, "hello", &options).expect_err("renamed workflow");
    assert_eq!(error.kind(), "resume");
}

#[test]
fn output_policies_select_results() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = write_workflow(
        directory.path(),
        "policy.yaml",
        r#"
name: policy
steps:
  - id: one
    command: printf 1
    output: true
  - id: two
    command: printf 2
  - id: three
    command: printf 3
"#,
    );

    let ids = |policy: OutputPolicy| {
        let options = RunOptions::from_process_environment().with_output(policy);
        expect_ok(run_file(&path, &options).expect("run"))
            .into_iter()
            .map(|result| result.id)
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(OutputPolicy::All), vec!["one", "two", "three"]);
    assert_eq!(ids(OutputPolicy::Last), vec!["three"]);
    assert_eq!(ids(OutputPolicy::Marked), vec!["one"]);
}
