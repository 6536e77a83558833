//! End-to-end checks of the command-line front-end.

use std::fs;
use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_faultline"))
}

const MODEL: &str = r#"<opsa-mef name="demo">
  <define-fault-tree name="train">
    <define-gate name="top">
      <and>
        <basic-event name="a"/>
        <basic-event name="b"/>
      </and>
    </define-gate>
    <define-basic-event name="a"><float value="0.1"/></define-basic-event>
    <define-basic-event name="b"><float value="0.2"/></define-basic-event>
  </define-fault-tree>
</opsa-mef>
"#;

#[test]
fn analyses_a_model_and_prints_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("demo.xml");
    fs::write(&input, MODEL).unwrap();

    let output = binary()
        .arg(&input)
        .arg("--importance")
        .output()
        .expect("binary runs");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<report"));
    assert!(stdout.contains("2.000000e-2"));
    assert!(stdout.contains("<importance>"));
}

#[test]
fn validation_errors_exit_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.xml");
    fs::write(
        &input,
        r#"<opsa-mef>
  <define-basic-event name="a"><float value="1.5"/></define-basic-event>
  <define-gate name="top"><null><basic-event name="a"/></null></define-gate>
</opsa-mef>
"#,
    )
    .unwrap();

    let output = binary().arg(&input).output().expect("binary runs");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn missing_input_exits_with_two() {
    let output = binary()
        .arg("/nonexistent/model.xml")
        .output()
        .expect("binary runs");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn config_file_drives_the_analyses() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("demo.xml");
    fs::write(&input, MODEL).unwrap();
    let config = dir.path().join("config.xml");
    fs::write(
        &config,
        r#"<faultline>
  <probability approximation="rare-event"/>
  <importance/>
</faultline>
"#,
    )
    .unwrap();

    let output = binary()
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("binary runs");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("rare-event"));
}

#[test]
fn report_can_be_written_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("demo.xml");
    fs::write(&input, MODEL).unwrap();
    let out = dir.path().join("report.xml");

    let output = binary()
        .arg(&input)
        .arg("--output")
        .arg(&out)
        .output()
        .expect("binary runs");
    assert!(output.status.success());
    let report = fs::read_to_string(&out).unwrap();
    assert!(report.contains("</report>"));
}
