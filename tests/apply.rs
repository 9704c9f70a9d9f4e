use assert_cmd::Command;
use assert_fs::prelude::*;
use insta::assert_snapshot;
use predicates::prelude::*;

fn cmd() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

const DOCUMENT: &str = "<project>\n<status>in progress</status>\n<tasks><task>docs</task></tasks>\n</project>";

#[test]
fn apply_subcommand_requires_operations_source() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input_file = temp.child("input.xml");
    input_file.write_str(DOCUMENT).unwrap();

    cmd()
        .arg("--file")
        .arg(input_file.path())
        .arg("apply")
        .arg("--operations-file")
        .arg("foo.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read operations file"));
}

#[test]
fn apply_command_applies_operations_from_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input_file = temp.child("input.xml");
    input_file.write_str(DOCUMENT).unwrap();

    let operations_file = temp.child("ops.yaml");
    operations_file
        .write_str(
            r#"- op: set_text
  select: //status
  text: complete
- op: append
  select: //tasks
  content: <task>tests</task>
  comment: add the missing task
- op: set_attribute
  select: /project
  name: version
  value: "2"
"#,
        )
        .unwrap();

    cmd()
        .arg("--file")
        .arg(input_file.path())
        .arg("apply")
        .arg("--operations-file")
        .arg(operations_file.path())
        .assert()
        .success();

    let content = std::fs::read_to_string(input_file.path()).unwrap();
    assert_snapshot!(content, @r###"
    <?xml version="1.0"?>
    <project version="2">
    <status>complete</status>
    <tasks><task>docs</task><task>tests</task></tasks>
    </project>
    "###);
}

#[test]
fn apply_diff_prints_changes_without_writing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input_file = temp.child("input.xml");
    input_file.write_str(DOCUMENT).unwrap();

    cmd()
        .arg("--file")
        .arg(input_file.path())
        .arg("apply")
        .arg("--operations")
        .arg(r#"[{"op": "remove", "select": "//status"}]"#)
        .arg("--diff")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--- original")
                .and(predicate::str::contains("+++ modified"))
                .and(predicate::str::contains("-<status>in progress</status>")),
        );

    input_file.assert(DOCUMENT);
}

#[test]
fn apply_dry_run_prints_result() {
    cmd()
        .arg("apply")
        .arg("--operations")
        .arg(r#"[{"op": "unwrap", "select": "//task"}]"#)
        .arg("--dry-run")
        .write_stdin(DOCUMENT)
        .assert()
        .success()
        .stdout(predicate::str::contains("<tasks>").not())
        .stdout(predicate::str::contains("</status>\n<task>docs</task>\n</project>"));
}

#[test]
fn apply_is_atomic_when_an_operation_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input_file = temp.child("input.xml");
    input_file.write_str(DOCUMENT).unwrap();

    cmd()
        .arg("--file")
        .arg(input_file.path())
        .arg("apply")
        .arg("--operations")
        .arg(
            r#"[
                {"op": "remove", "select": "//status"},
                {"op": "append", "select": "//nothing", "content": "<x/>"}
            ]"#,
        )
        .assert()
        .failure()
        .stderr(predicate::str::contains("'//nothing' did not match"));

    input_file.assert(DOCUMENT);
}

#[test]
fn apply_uses_registered_namespaces() {
    let stdout = cmd()
        .args(["-n", "p=urn:p", "apply", "--dry-run", "--operations"])
        .arg(r#"[{"op": "remove_attribute", "select": "//p:item", "name": "old"}]"#)
        .write_stdin(r#"<list xmlns="urn:p"><item old="1"/></list>"#)
        .output()
        .unwrap()
        .stdout;
    assert_eq!(
        String::from_utf8(stdout).unwrap(),
        "<?xml version=\"1.0\"?>\n<list xmlns=\"urn:p\"><item/></list>\n"
    );
}
