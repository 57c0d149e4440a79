#![cfg(feature = "cli")]
#![expect(clippy::unwrap_used)] // test code OK

use std::fs;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn schemelet() -> Command {
    Command::new(env!("CARGO_BIN_EXE_schemelet"))
}

fn run_with_input(args: &[&str], input: &str) -> Output {
    let mut child = schemelet()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn test_piped_program_reports_errors_on_stderr() {
    let out = run_with_input(&[], "(+ 1 2) (display \"hi\") (car 5) (display \"after\")");

    assert!(out.status.success());
    assert_eq!(text(&out.stdout), "3\nhi");
    let stderr = text(&out.stderr);
    assert!(stderr.starts_with("Error: Type error"), "stderr: {stderr}");
}

#[test]
fn test_piped_parse_error_goes_to_stderr() {
    let out = run_with_input(&[], "(define x 1) x (oops");

    assert_eq!(text(&out.stdout), "1\n");
    assert!(text(&out.stderr).contains("Error: ParseError"));
}

#[test]
fn test_failing_file_reports_on_stderr_and_next_file_runs() {
    let dir = tempdir().unwrap();
    let bad = dir.path().join("bad.scm");
    let good = dir.path().join("good.scm");
    fs::write(&bad, "(define a 1)\n(car 5)\n").unwrap();
    fs::write(&good, "(display a)\n").unwrap();

    let out = schemelet()
        .arg("--no-repl")
        .arg(&bad)
        .arg(&good)
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(out.status.success());
    assert_eq!(text(&out.stdout), "1");
    let stderr = text(&out.stderr);
    assert!(
        stderr.starts_with(&format!("Error: {}: Type error", bad.display())),
        "stderr: {stderr}"
    );
}
