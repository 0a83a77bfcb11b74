//! End-to-end runs of the `chain-builder` binary against local repositories.

use git2::{Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn chain_builder(temp: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chain-builder"))
        .args(args)
        .arg("--scratch-root")
        .arg(temp.path().join("scratch"))
        .arg("--log-dir")
        .arg(temp.path().join("logs"))
        .arg("--deploy-repository")
        .arg(temp.path().join("repository"))
        .env_remove("RUST_LOG")
        .env_remove("CHAIN_BUILD_COMMAND")
        .output()
        .unwrap()
}

/// Repository with a single commit tagged `v1`.
fn create_origin(root: &Path, name: &str) -> PathBuf {
    let origin = root.join(name);
    let repo = Repository::init(&origin).unwrap();
    fs::write(origin.join("pom.xml"), "<project/>\n").unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new("pom.xml")).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Chain Tester", "tester@example.com").unwrap();
    let commit = repo
        .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    let object = repo.find_object(commit, None).unwrap();
    repo.tag_lightweight("v1", &object, false).unwrap();
    origin
}

fn write_descriptor(temp: &TempDir, content: &str) -> PathBuf {
    let path = temp.path().join("chain.cfg");
    fs::write(&path, content).unwrap();
    path
}

fn report(temp: &TempDir) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(temp.path().join("report.json")).unwrap()).unwrap()
}

#[test]
fn test_missing_descriptor_exits_with_2() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope.cfg");

    let output = chain_builder(&temp, &[missing.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_descriptor_without_defaults_exits_with_2() {
    let temp = TempDir::new().unwrap();
    let descriptor = write_descriptor(&temp, "[core]\nscmurl = https://x/core.git#1\n");

    let output = chain_builder(&temp, &[descriptor.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    assert!(!temp.path().join("scratch").exists());
}

#[test]
fn test_patched_path_must_exist() {
    let temp = TempDir::new().unwrap();
    let descriptor = write_descriptor(&temp, "[DEFAULT]\n");
    let missing = temp.path().join("local-core");

    let output = chain_builder(
        &temp,
        &[
            descriptor.to_str().unwrap(),
            "--patched-project",
            "core",
            "--patched-path",
            missing.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_malformed_locator_halts_with_report() {
    let temp = TempDir::new().unwrap();
    let descriptor = write_descriptor(
        &temp,
        "[DEFAULT]\n[core]\nscmurl = https://x/core.git\n",
    );
    let report_path = temp.path().join("report.json");

    let output = chain_builder(
        &temp,
        &[
            descriptor.to_str().unwrap(),
            "--report",
            report_path.to_str().unwrap(),
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    let report = report(&temp);
    assert_eq!(report["halted_at"], "core");
    assert_eq!(report["units"][1]["status"], "failed");
}

#[cfg(unix)]
#[test]
fn test_chain_builds_local_repository() {
    let temp = TempDir::new().unwrap();
    let origin = create_origin(temp.path(), "core");
    let builds = temp.path().join("builds.txt");
    let descriptor = write_descriptor(
        &temp,
        &format!(
            "[DEFAULT]\njvm_options = -Xmx1g\n\n[core]\nscmurl = git+{}#v1\nskipTests\n",
            origin.display()
        ),
    );
    let build_command = format!(
        "echo \"$(basename $PWD) $MAVEN_OPTS $(cat pom.xml)\" >> {}; true",
        builds.display()
    );
    let report_path = temp.path().join("report.json");

    let output = chain_builder(
        &temp,
        &[
            descriptor.to_str().unwrap(),
            "--build-command",
            &build_command,
            "--report",
            report_path.to_str().unwrap(),
        ],
    );

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        fs::read_to_string(&builds).unwrap(),
        "core -Xmx1g <project/>\n"
    );
    assert_eq!(fs::read_dir(temp.path().join("scratch")).unwrap().count(), 0);
    assert!(temp.path().join("logs").join("chain-core.log").exists());

    let report = report(&temp);
    assert_eq!(report["units"][1]["status"], "built");
    assert_eq!(report["units"][1]["project"], "core");
    assert!(report["halted_at"].is_null());
}

#[cfg(unix)]
#[test]
fn test_failing_build_exits_with_1() {
    let temp = TempDir::new().unwrap();
    let origin = create_origin(temp.path(), "core");
    let descriptor = write_descriptor(
        &temp,
        &format!("[DEFAULT]\n[core]\nscmurl = {}#v1\n", origin.display()),
    );

    let output = chain_builder(
        &temp,
        &[
            descriptor.to_str().unwrap(),
            "--build-command",
            "echo broken; exit 4; true",
        ],
    );

    assert_eq!(output.status.code(), Some(1));
    let log = fs::read_to_string(temp.path().join("logs").join("chain-core.log")).unwrap();
    assert!(log.contains("broken"));
    assert_eq!(fs::read_dir(temp.path().join("scratch")).unwrap().count(), 0);
}
