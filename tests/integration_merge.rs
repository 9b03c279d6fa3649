//! End-to-end merge engine tests against real temporary roots.

mod common;

use common::prelude::*;
use common::current_owner;

use std::fs;
use std::rc::Rc;

use pkgmerge::changeset::{ChangeSet, ChangeSets, FsObject};
use pkgmerge::config::{self, MergeConfig};
use pkgmerge::engine::MergeEngine;
use pkgmerge::fs_ops::scan_livefs;
use pkgmerge::observer::{LoggingObserver, PhaseStatus, RecordingObserver};
use pkgmerge::spawn::ProcessSpawner;
use pkgmerge::triggers::{self, IdFixup};
use pkgmerge::Error;

#[test]
fn test_fixup_then_merge_with_explicit_hooks() {
    use std::os::unix::fs::MetadataExt;

    init_logging();
    let root = TempDir::new().unwrap();
    let observer = Rc::new(RecordingObserver::new());

    // `install` is the same file as `new_cset`, so it is derived from it and
    // sees the fixup made in the earlier hook.
    let file_a = FsObject::file("usr/share/a").with_owner(250, 250);
    let csets = ChangeSets::new().with("new_cset", ChangeSet::from(vec![file_a]));

    let engine = MergeEngine::new(csets, ["new_cset", "install"])
        .unwrap()
        .with_offset(root.path())
        .with_observer(Rc::clone(&observer))
        .with_derivation("install", ["new_cset"], |sets| {
            sets.get("new_cset").cloned().unwrap_or_default()
        })
        .with_trigger(
            "new_cset",
            triggers::fix_default_uid(IdFixup { default: 250, replacement: 0 }, "new_cset").unwrap(),
        )
        .unwrap()
        .with_trigger("install", triggers::merge_trigger("install").unwrap())
        .unwrap();

    let report = engine.run().unwrap();
    for label in ["new_cset", "install"] {
        let merged = report.csets.get(label).unwrap().get("usr/share/a").unwrap();
        assert_eq!(merged.uid, 0, "uid in {}", label);
    }
    assert_eq!(observer.installed(), vec![std::path::PathBuf::from("/usr/share/a")]);

    let placed = root.child("usr/share/a");
    placed.assert(predicate::path::is_file());
    let on_disk = fs::symlink_metadata(placed.path()).unwrap().uid();
    let (runner_uid, _) = current_owner(root.path());
    if runner_uid == 0 {
        assert_eq!(on_disk, 0);
    } else {
        // Without privilege the owner stays with whoever ran the merge.
        assert_eq!(on_disk, runner_uid);
    }
}

#[test]
fn test_install_pipeline_places_files_and_runs_ldconfig() {
    init_logging();
    let fixture = MergeFixture::new()
        .with_dir("usr")
        .with_dir("usr/lib")
        .with_image_file("usr/lib/libfoo.so.1", "\x7fELF")
        .with_symlink("usr/lib/libfoo.so", "libfoo.so.1")
        .with_image_file("usr/bin/foo", "#!/bin/sh\necho foo\n");
    let spawner = FakeSpawner::exiting_with(0);
    let observer = Rc::new(RecordingObserver::new());

    let engine = MergeEngine::install(ChangeSet::from(fixture.objects()), &MergeConfig::default())
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(spawner.clone())
        .with_observer(Rc::clone(&observer));
    let report = engine.run().unwrap();

    assert!(report.is_clean());
    assert_eq!(
        observer.phases_started(),
        vec!["pre_merge", "merge", "post_merge"]
    );
    assert_eq!(
        observer.triggers_started(),
        vec!["fix-default-uid", "fix-default-gid", "livefs-merge", "ldconfig"]
    );

    let root = fixture.root();
    root.child("usr/bin/foo").assert("#!/bin/sh\necho foo\n");
    root.child("usr/lib/libfoo.so.1").assert("\x7fELF");
    assert_eq!(
        fs::read_link(root.path().join("usr/lib/libfoo.so")).unwrap(),
        std::path::PathBuf::from("libfoo.so.1")
    );
    root.child("etc/ld.so.conf").assert(predicate::path::is_file());

    let calls = spawner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0], "/sbin/ldconfig");
    assert_eq!(calls[0][1], "-r");
    assert_eq!(calls[0][2], root.path().to_string_lossy());
}

#[test]
fn test_ldconfig_failure_is_a_warning() {
    init_logging();
    let fixture = MergeFixture::new().with_image_file("usr/lib/libbar.so", "lib");
    let spawner = FakeSpawner::exiting_with(1);

    let report = MergeEngine::install(ChangeSet::from(fixture.objects()), &MergeConfig::default())
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(spawner)
        .run()
        .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].hook, "post_merge");
    assert_eq!(report.warnings[0].trigger, "ldconfig");
    assert!(report.warnings[0].message.contains("returned 1"));
    assert_eq!(report.status_of("merge"), Some(&PhaseStatus::Success));
    assert_eq!(report.status_of("post_merge"), Some(&PhaseStatus::Warned(1)));
    fixture
        .root()
        .child("usr/lib/libbar.so")
        .assert(predicate::path::is_file());
}

#[test]
fn test_ldconfig_warning_lets_later_hooks_fire() {
    init_logging();
    let fixture = MergeFixture::new().with_image_file("usr/lib/libnew.so", "lib");
    fixture.root().child("usr/lib/libold.so").write_str("old").unwrap();
    let stale = ChangeSet::from(vec![FsObject::file("usr/lib/libold.so")]);
    let observer = Rc::new(RecordingObserver::new());

    let csets = ChangeSets::new()
        .with("install", ChangeSet::from(fixture.objects()))
        .with("stale", stale);
    let report = MergeEngine::new(csets, ["merge", "post_merge", "cleanup"])
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(FakeSpawner::exiting_with(1))
        .with_observer(Rc::clone(&observer))
        .with_trigger("merge", triggers::merge_trigger("install").unwrap())
        .unwrap()
        .with_trigger(
            "post_merge",
            triggers::ldconfig_trigger("install", Default::default()).unwrap(),
        )
        .unwrap()
        .with_trigger("cleanup", triggers::unmerge_trigger("stale").unwrap())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].trigger, "ldconfig");
    assert_eq!(report.status_of("post_merge"), Some(&PhaseStatus::Warned(1)));
    assert_eq!(report.status_of("cleanup"), Some(&PhaseStatus::Success));
    assert_eq!(
        observer.phases_started(),
        vec!["merge", "post_merge", "cleanup"]
    );
    let root = fixture.root();
    root.child("usr/lib/libnew.so").assert("lib");
    root.child("usr/lib/libold.so").assert(predicate::path::missing());
}

#[test]
fn test_no_libraries_means_no_ldconfig() {
    let fixture = MergeFixture::new().with_image_file("etc/motd", "hello\n");
    let spawner = FakeSpawner::exiting_with(0);

    MergeEngine::install(ChangeSet::from(fixture.objects()), &MergeConfig::default())
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(spawner.clone())
        .run()
        .unwrap();

    assert!(spawner.calls().is_empty());
    fixture
        .root()
        .child("etc/ld.so.conf")
        .assert(predicate::path::missing());
}

#[test]
fn test_missing_ldconfig_binary_aborts_after_merge() {
    init_logging();
    let fixture = MergeFixture::new().with_image_file("usr/lib/libbaz.so", "lib");
    let config = config::parse("ldconfig: /nonexistent/sbin/ldconfig\n").unwrap();
    let observer = Rc::new(RecordingObserver::new());

    let err = MergeEngine::install(ChangeSet::from(fixture.objects()), &config)
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(ProcessSpawner::new())
        .with_observer(Rc::clone(&observer))
        .run()
        .unwrap_err();

    assert!(matches!(err, Error::TriggerFailed { ref hook, ref trigger, .. }
        if hook == "post_merge" && trigger == "ldconfig"));
    assert!(matches!(err.root_cause(), Error::Spawn { .. }));
    // Nothing is rolled back.
    fixture
        .root()
        .child("usr/lib/libbaz.so")
        .assert(predicate::path::is_file());
    assert_eq!(
        observer.events().last(),
        Some(&pkgmerge::observer::ObserverEvent::PhaseEnd(
            "post_merge".into(),
            PhaseStatus::Failed
        ))
    );
}

#[test]
fn test_uninstall_keeps_foreign_files() {
    init_logging();
    let fixture = MergeFixture::new()
        .with_dir("opt")
        .with_dir("opt/tool")
        .with_image_file("opt/tool/run", "run")
        .with_image_file("opt/tool/README", "readme");
    let cset = ChangeSet::from(fixture.objects());

    MergeEngine::install(cset.clone(), &MergeConfig::default())
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(FakeSpawner::exiting_with(0))
        .run()
        .unwrap();
    fixture.root().child("opt/unrelated").write_str("mine").unwrap();

    let observer = Rc::new(RecordingObserver::new());
    let report = MergeEngine::uninstall(cset, &MergeConfig::default())
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(FakeSpawner::exiting_with(0))
        .with_observer(Rc::clone(&observer))
        .run()
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(observer.removed().len(), 4);
    let root = fixture.root();
    root.child("opt/tool").assert(predicate::path::missing());
    root.child("opt/unrelated").assert("mine");
}

#[test]
fn test_replace_removes_only_dropped_entries() {
    init_logging();
    let old = MergeFixture::new()
        .with_dir("srv")
        .with_image_file("srv/keep", "v1")
        .with_image_file("srv/drop", "old only");
    let root_path = old.root_path();

    MergeEngine::install(ChangeSet::from(old.objects()), &MergeConfig::default())
        .unwrap()
        .with_offset(&root_path)
        .with_spawner(FakeSpawner::exiting_with(0))
        .run()
        .unwrap();

    let new = MergeFixture::new()
        .with_dir("srv")
        .with_image_file("srv/keep", "v2")
        .with_image_file("srv/added", "new only");

    let report = MergeEngine::replace(
        ChangeSet::from(old.objects()),
        ChangeSet::from(new.objects()),
        &MergeConfig::default(),
    )
    .unwrap()
    .with_offset(&root_path)
    .with_spawner(FakeSpawner::exiting_with(0))
    .run()
    .unwrap();

    let uninstall = report.csets.get("uninstall").unwrap();
    let dropped: Vec<_> = uninstall.locations().collect();
    assert_eq!(dropped, vec![std::path::Path::new("/srv/drop")]);

    let root = old.root();
    root.child("srv/keep").assert("v2");
    root.child("srv/added").assert("new only");
    root.child("srv/drop").assert(predicate::path::missing());
    root.child("srv").assert(predicate::path::is_dir());
}

#[test]
fn test_scanned_tree_round_trips_through_install_and_uninstall() {
    init_logging();
    let image = TempDir::new().unwrap();
    image.child("usr/share/doc/pkg/NEWS").write_str("news").unwrap();
    image.child("usr/share/doc/pkg/COPYING").write_str("gpl").unwrap();
    let cset = scan_livefs(image.path()).unwrap();
    assert_eq!(cset.len(), 6);

    let root = TempDir::new().unwrap();
    MergeEngine::install(cset.clone(), &MergeConfig::default())
        .unwrap()
        .with_offset(root.path())
        .with_spawner(FakeSpawner::exiting_with(0))
        .with_observer(LoggingObserver::new())
        .run()
        .unwrap();
    root.child("usr/share/doc/pkg/NEWS").assert("news");

    MergeEngine::uninstall(cset, &MergeConfig::default())
        .unwrap()
        .with_offset(root.path())
        .with_spawner(FakeSpawner::exiting_with(0))
        .run()
        .unwrap();
    root.child("usr").assert(predicate::path::missing());
}

#[test]
fn test_custom_ld_so_conf_location() {
    let fixture = MergeFixture::new().with_image_file("usr/lib64/libqux.so", "lib");
    let yaml_file = fixture.root().child("pkgmerge.yaml");
    yaml_file
        .write_str("ld_so_conf: etc/ld.so.conf.d/local.conf\n")
        .unwrap();
    let config = config::from_file(yaml_file.path()).unwrap();

    MergeEngine::install(ChangeSet::from(fixture.objects()), &config)
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(FakeSpawner::exiting_with(0))
        .run()
        .unwrap();

    fixture
        .root()
        .child("etc/ld.so.conf.d/local.conf")
        .assert(predicate::path::is_file());
}

#[test]
fn test_owner_matches_runner_after_merge() {
    let fixture = MergeFixture::new().with_image_file("var/lib/pkg/state", "0");
    let (uid, gid) = current_owner(fixture.root().path());

    let report = MergeEngine::install(ChangeSet::from(fixture.objects()), &MergeConfig::default())
        .unwrap()
        .with_offset(fixture.root_path())
        .with_spawner(FakeSpawner::exiting_with(0))
        .run()
        .unwrap();

    let merged = report.csets.get("install").unwrap().get("var/lib/pkg/state").unwrap();
    assert_eq!((merged.uid, merged.gid), (uid, gid));
    assert!(fixture.image_path().join("var/lib/pkg/state").is_file());
}
