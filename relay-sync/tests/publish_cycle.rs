use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use relay_core::{InclusionRules, Project, ProjectName};
use relay_sync::{
    build_manifest, publish, read_manifest, sync_tree, verify_tree, BuildOptions, Discrepancy,
    FileAction, SyncOptions,
};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write(root: &Path, relative: &str, data: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, data).expect("write");
}

fn seed_work_tree(work: &Path) {
    write(work, "images/a.png", b"\x89PNG\r\n");
    write(work, "sounds/b.wav", b"RIFF");
    write(work, "scripts/x.lua", b"print('x')");
    write(work, "scripts/.luacheckrc", b"std = 'lua51'");
    write(work, "scripts/lib/util.lua", b"return {}");
    write(work, "data/charTemplate.txt", b"template");
    write(work, "README.md", b"# readme");
    write(work, "notes.txt", b"not published");
    write(work, ".git/HEAD", b"ref: refs/heads/master");
}

fn project(tmp: &TempDir) -> Project {
    let project = Project {
        name: ProjectName::from("common"),
        work_dir: tmp.path().join("work"),
        out_dir: tmp.path().join("out"),
    };
    fs::create_dir_all(&project.out_dir).expect("out dir");
    seed_work_tree(&project.work_dir);
    project
}

#[tokio::test]
async fn manifest_ignores_modification_times() {
    init_logging();
    let tmp = TempDir::new().expect("tmp");
    let project = project(&tmp);
    let rules = InclusionRules::default();

    let first = build_manifest(&project.work_dir, &rules, &BuildOptions::default())
        .await
        .expect("first build");

    let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(24 * 60 * 60));
    for entry in first.entries() {
        set_file_mtime(project.work_dir.join(&entry.relative_path), old).expect("set mtime");
    }

    let second = build_manifest(&project.work_dir, &rules, &BuildOptions::default())
        .await
        .expect("second build");
    assert_eq!(first.render(), second.render());
}

#[tokio::test]
async fn manifest_lists_expected_files_in_order() {
    init_logging();
    let tmp = TempDir::new().expect("tmp");
    let project = project(&tmp);

    let manifest = build_manifest(
        &project.work_dir,
        &InclusionRules::default(),
        &BuildOptions::default(),
    )
    .await
    .expect("build");
    let paths: Vec<_> = manifest
        .entries()
        .iter()
        .map(|e| e.relative_path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec![
            "data/charTemplate.txt",
            "images/a.png",
            "scripts/.luacheckrc",
            "scripts/lib/util.lua",
            "scripts/x.lua",
            "sounds/b.wav",
        ]
    );
}

#[tokio::test]
async fn mirror_then_verify_against_published_manifest() {
    init_logging();
    let tmp = TempDir::new().expect("tmp");
    let project = project(&tmp);

    let manifest = build_manifest(
        &project.work_dir,
        &InclusionRules::default(),
        &BuildOptions::default(),
    )
    .await
    .expect("build");
    let report = sync_tree(&project.work_dir, &project.out_dir, &SyncOptions::default())
        .await
        .expect("sync");
    assert_eq!(report.failed(), 0);
    assert!(report
        .actions
        .iter()
        .all(|a| !a.path().starts_with(".git")));

    let text = manifest.render();
    let persisted = publish::write_manifest(&project, &text, 1_700_000_000).await;
    assert!(persisted.manifest_written);
    assert!(publish::write_version(&project, "abc1234").await);

    let published = read_manifest(&project.manifest_path()).expect("read back");
    assert_eq!(published.render(), text);

    // The mirror never publishes hidden entries, even allow-listed ones.
    let verified = verify_tree(&project.out_dir, &published, 8).await;
    assert_eq!(verified.checked, manifest.len());
    assert_eq!(
        verified.discrepancies,
        vec![Discrepancy::Missing {
            path: "scripts/.luacheckrc".to_string(),
        }]
    );
}

#[tokio::test]
async fn second_cycle_copies_only_the_changed_file() {
    init_logging();
    let tmp = TempDir::new().expect("tmp");
    let project = project(&tmp);

    sync_tree(&project.work_dir, &project.out_dir, &SyncOptions::default())
        .await
        .expect("first sync");

    write(&project.work_dir, "scripts/x.lua", b"print('y')");
    let report = sync_tree(&project.work_dir, &project.out_dir, &SyncOptions::default())
        .await
        .expect("second sync");

    let copied: Vec<_> = report
        .actions
        .iter()
        .filter(|a| matches!(a, FileAction::Copied { .. }))
        .map(|a| a.path())
        .collect();
    assert_eq!(copied, vec!["scripts/x.lua"]);
}
