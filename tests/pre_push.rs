//! The pre-push change-set protocol, end to end against a real remote.

mod common;

use anyhow::Result;
use common::TestProject;
use indoc::indoc;

const ZERO_OID: &str = "0000000000000000000000000000000000000000";

const ECHO_CONFIG: &str = indoc! {r#"
    version: 0
    environments:
      - id: host
        ecosystem: {language: system}
        dependencies: [echo]
    hooks:
      - id: list
        environment: host
        command: echo
        types: [python]
        read_only: true
"#};

/// Repo with `pushed.py` on the remote and `pending.py` only local.
fn project_with_remote() -> Result<(TestProject, String, String)> {
    let project = TestProject::new()?;
    project.write_config(ECHO_CONFIG)?;
    project.commit_file("pushed.py", "print(1)\n")?;

    let remote_path = project.create_bare_remote("origin.git")?;
    let git = project.git();
    git.remote_add("origin", &remote_path.to_string_lossy())?;
    git.push("origin", "main")?;
    let remote_oid = git.rev_parse("HEAD")?;

    project.commit_file("pending.py", "print(2)\n")?;
    let local_oid = git.rev_parse("HEAD")?;

    project.run_goose(&["upgrade"])?.assert_success();
    Ok((project, local_oid, remote_oid))
}

#[test]
fn updated_ref_checks_only_the_outgoing_changes() -> Result<()> {
    let (project, local_oid, remote_oid) = project_with_remote()?;
    let input = format!("refs/heads/main {local_oid} refs/heads/main {remote_oid}\n");
    let output =
        project.run_goose_with_stdin(&["exec-pre-push", "--remote", "origin"], &input)?;
    output.assert_success();
    output.assert_stderr_contains("pending.py");
    assert!(!output.stderr.contains("pushed.py"), "{}", output.stderr);
    Ok(())
}

#[test]
fn new_branch_checks_every_unpushed_commit() -> Result<()> {
    let (project, _, _) = project_with_remote()?;
    let git = project.git();
    git.switch_new_branch("feature")?;
    project.commit_file("feature.py", "print(3)\n")?;
    let tip = git.rev_parse("HEAD")?;

    let input = format!("refs/heads/feature {tip} refs/heads/feature {ZERO_OID}\n");
    let output =
        project.run_goose_with_stdin(&["exec-pre-push", "--remote", "origin"], &input)?;
    output.assert_success();
    // Both commits are unknown to the remote.
    output.assert_stderr_contains("pending.py");
    output.assert_stderr_contains("feature.py");
    assert!(!output.stderr.contains("pushed.py"), "{}", output.stderr);
    Ok(())
}

#[test]
fn ref_deletion_runs_no_hooks_on_files() -> Result<()> {
    let (project, _, remote_oid) = project_with_remote()?;
    let input = format!("(delete) {ZERO_OID} refs/heads/main {remote_oid}\n");
    let output =
        project.run_goose_with_stdin(&["exec-pre-push", "--remote", "origin"], &input)?;
    output.assert_success();
    assert!(!output.stderr.contains("pushed.py"), "{}", output.stderr);
    assert!(!output.stderr.contains("pending.py"), "{}", output.stderr);
    Ok(())
}

#[test]
fn malformed_protocol_lines_are_fatal() -> Result<()> {
    let (project, _, _) = project_with_remote()?;
    let output =
        project.run_goose_with_stdin(&["exec-pre-push", "--remote", "origin"], "nonsense\n")?;
    output.assert_exit_code(1);
    output.assert_stderr_contains("failing line");
    Ok(())
}
