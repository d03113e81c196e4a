use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_with_stdin(input: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tmplxml"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input)
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
#[ntest::timeout(5000)]
fn test_cli_converts_stdin() {
    let output = run_with_stdin(b"Hello {{.Name}}");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout,
        format!("{}\n", tmplxml::to_xml_string("Hello {{.Name}}").unwrap())
    );
    assert!(stdout.contains("<text>\"Hello \"</text>"), "{stdout}");
}

#[test]
#[ntest::timeout(5000)]
fn test_cli_keeps_bytes_that_are_not_utf8() {
    let output = run_with_stdin(b"a\xffb{{.X}}");
    assert!(output.status.success(), "{output:?}");

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(r#"<text>"a\xffb"</text>"#), "{stdout}");
    assert!(stdout.contains("<action>.X</action>"), "{stdout}");
}

#[test]
#[ntest::timeout(5000)]
fn test_cli_rejects_invalid_utf8_in_actions() {
    let output = run_with_stdin(b"{{.X \xff}}");
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid UTF-8 encoding"), "{stderr}");
}

#[test]
#[ntest::timeout(5000)]
fn test_cli_reports_parse_errors() {
    let output = run_with_stdin(b"{{if .X}}unclosed");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.starts_with("tmplxml: "), "{stderr}");
    assert!(stderr.contains("unexpected EOF"), "{stderr}");
}

#[test]
#[ntest::timeout(5000)]
fn test_cli_reports_missing_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_tmplxml"))
        .arg("this/file/does/not/exist.tmpl")
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Failed to read this/file/does/not/exist.tmpl"), "{stderr}");
}
