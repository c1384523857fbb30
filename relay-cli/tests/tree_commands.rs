use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn relay_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("relay"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

fn write(root: &Path, relative: &str, data: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, data).expect("write");
}

fn seed(root: &Path) {
    write(root, "a.png", b"\x89PNG");
    write(root, "readme.md", b"# hi");
    write(root, "scripts/x.lua", b"print('x')");
}

#[test]
fn manifest_prints_included_files_sorted() {
    let home = TempDir::new().expect("home");
    let tree = TempDir::new().expect("tree");
    seed(tree.path());

    let assert = relay_cmd(home.path())
        .arg("manifest")
        .arg(tree.path())
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.starts_with("Version 1\n"));
    let files: Vec<_> = stdout
        .lines()
        .filter(|line| line.starts_with("    filename"))
        .collect();
    assert_eq!(
        files,
        vec!["    filename \"a.png\"", "    filename \"scripts/x.lua\""]
    );
}

#[test]
fn manifest_base_mode_includes_readme() {
    let home = TempDir::new().expect("home");
    let tree = TempDir::new().expect("tree");
    seed(tree.path());

    relay_cmd(home.path())
        .args(["manifest", "--base"])
        .arg(tree.path())
        .assert()
        .success()
        .stdout(contains("readme.md"));
}

#[test]
fn sync_twice_copies_once() {
    let home = TempDir::new().expect("home");
    let src = TempDir::new().expect("src");
    let dst = TempDir::new().expect("dst");
    seed(src.path());

    relay_cmd(home.path())
        .arg("sync")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .stdout(contains("3 copied"));
    assert_eq!(fs::read(dst.path().join("scripts/x.lua")).unwrap(), b"print('x')");

    relay_cmd(home.path())
        .arg("sync")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .stdout(contains("nothing to do"));
}

#[test]
fn sync_dry_run_leaves_destination_untouched() {
    let home = TempDir::new().expect("home");
    let src = TempDir::new().expect("src");
    let dst = TempDir::new().expect("dst");
    seed(src.path());

    relay_cmd(home.path())
        .args(["sync", "--dry-run"])
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("does not exist"));
    assert!(!dst.path().join("a.png").exists());
}

#[test]
fn verify_detects_tampering() {
    let home = TempDir::new().expect("home");
    let tree = TempDir::new().expect("tree");
    seed(tree.path());
    let manifest = tree.path().join("manifest.txt");

    relay_cmd(home.path())
        .arg("manifest")
        .arg(tree.path())
        .arg("--output")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(contains("wrote 2 entries"));

    relay_cmd(home.path())
        .arg("verify")
        .arg(tree.path())
        .assert()
        .success()
        .stdout(contains("2 files match"));

    fs::write(tree.path().join("a.png"), b"changed!").expect("tamper");
    relay_cmd(home.path())
        .arg("verify")
        .arg(tree.path())
        .assert()
        .failure()
        .stdout(contains("a.png"))
        .stderr(contains("1 of 2 files do not match"));
}

#[test]
fn diff_shows_pending_additions_without_publishing() {
    let home = TempDir::new().expect("home");
    relay_cmd(home.path())
        .args(["config", "init"])
        .assert()
        .success();
    relay_cmd(home.path())
        .args(["config", "add-project", "common"])
        .assert()
        .success();

    let work = home.path().join(".relay/work/common");
    seed(&work);
    let out = home.path().join(".relay/out/common");
    fs::create_dir_all(&out).expect("out dir");

    relay_cmd(home.path())
        .args(["diff", "common"])
        .assert()
        .success()
        .stdout(contains("+    filename \"scripts/x.lua\""))
        .stdout(contains("2 added, 0 removed, 0 changed"));
    assert!(!out.join("manifest.txt").exists());
}
