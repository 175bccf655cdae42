use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_scene(xml: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(xml.as_bytes()).expect("write scene");
    tmp
}

#[test]
fn cli_summarizes_an_unlit_scene_as_fully_lit() {
    let scene = write_scene(
        r#"<scene>
  <object>
    <name>Camera</name>
    <type>camera</type>
    <position>0 1 6</position>
    <target>0 1 0</target>
  </object>
  <object>
    <name>Dancer</name>
    <type>figure</type>
  </object>
</scene>
"#,
    );

    let mut cmd = Command::cargo_bin("marionette-viewer").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 2 objects (0 lights)"))
        .stdout(contains(" - Dancer (figure)"))
        .stdout(contains(
            "Pass schedule: shadow-primary -> shadow-secondary -> main",
        ))
        .stdout(contains("Shadow stage: Ready (sampling off)"))
        .stdout(contains("Posed 18 vertices across 2 bones"))
        .stdout(contains("light=1.00"));
}

#[test]
fn cli_reports_both_lights() {
    let scene = write_scene(
        r#"<scene>
  <object>
    <name>Sun</name>
    <type>light</type>
    <position>-10 12 0</position>
    <target>0 1 0</target>
  </object>
  <object>
    <name>Fill</name>
    <type>light</type>
    <position>8 6 4</position>
    <target>0 1 0</target>
    <extent>6</extent>
    <resolution>512</resolution>
  </object>
  <object>
    <name>Dancer</name>
    <type>figure</type>
  </object>
</scene>
"#,
    );

    let mut cmd = Command::cargo_bin("marionette-viewer").expect("binary exists");
    cmd.arg(scene.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 3 objects (2 lights)"))
        .stdout(contains("Shadow stage: Ready (sampling on)"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    let scene = write_scene("<scene></scene>");
    let mut cmd = Command::cargo_bin("marionette-viewer").expect("binary exists");
    cmd.arg(scene.path()).arg("--bogus");
    cmd.assert().failure();
}
