//! End-to-end tests for the populate, verify, and merge operations.

use std::fs;
use std::path::Path;

use filetime::FileTime;
use manifest::{FileRecord, Manifest};
use walk::{DenyPolicy, EntryKind, WalkOptions};

use engine::{create_manifest, merge_tree, verify_tree, MismatchReporter};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Missing(EntryKind, String),
    New(EntryKind, String),
    Checked { rel: String, equal: bool },
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl Recorder {
    fn missing(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Missing(..)))
            .collect()
    }

    fn new_entries(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::New(..)))
            .collect()
    }

    fn unequal(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Checked { rel, equal: false } => Some(rel.as_str()),
                _ => None,
            })
            .collect()
    }

    fn assert_clean(&self) {
        assert!(self.missing().is_empty(), "missing: {:?}", self.events);
        assert!(self.new_entries().is_empty(), "new: {:?}", self.events);
        assert!(self.unequal().is_empty(), "mismatched: {:?}", self.events);
    }
}

impl MismatchReporter for Recorder {
    fn file_not_found(&mut self, kind: EntryKind, rel_path: &str) {
        self.events.push(Event::Missing(kind, rel_path.to_owned()));
    }

    fn new_file(&mut self, kind: EntryKind, rel_path: &str) {
        self.events.push(Event::New(kind, rel_path.to_owned()));
    }

    fn check_mismatch(
        &mut self,
        rel_path: &str,
        expected: &FileRecord,
        actual: &FileRecord,
    ) -> bool {
        let equal = expected == actual;
        self.events.push(Event::Checked {
            rel: rel_path.to_owned(),
            equal,
        });
        equal
    }
}

fn write_with_mtime(path: &Path, contents: &[u8], mtime: i64) {
    fs::write(path, contents).expect("write file");
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).expect("set mtime");
}

/// Builds the reference tree: `a.txt` with "foo" and `sub/b.txt` empty.
fn build_sample_tree(root: &Path) {
    fs::create_dir_all(root.join("sub")).expect("create tree");
    write_with_mtime(&root.join("a.txt"), b"foo", 1_700_000_000);
    write_with_mtime(&root.join("sub/b.txt"), b"", 1_700_000_100);
}

fn populated(temp: &tempfile::TempDir) -> (std::path::PathBuf, Manifest) {
    let root = temp.path().join("root");
    build_sample_tree(&root);
    let manifest = Manifest::open(&temp.path().join("files.db"), true).expect("open manifest");
    create_manifest(&root, &manifest, &WalkOptions::default()).expect("populate");
    (root, manifest)
}

#[test]
fn populate_records_the_expected_rows() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (_root, manifest) = populated(&temp);

    let root_rows = manifest.list("").expect("list root");
    assert_eq!(root_rows.len(), 2);
    assert_eq!(
        root_rows.get("a.txt"),
        Some(&FileRecord::File {
            size: 3,
            mtime: 1_700_000_000,
            digest: checksums::ContentHasher::digest(b"foo"),
        })
    );
    assert_eq!(root_rows.get("sub"), Some(&FileRecord::Dir));

    let sub_rows = manifest.list("sub").expect("list sub");
    assert_eq!(sub_rows.len(), 1);
    assert_eq!(
        sub_rows.get("b.txt"),
        Some(&FileRecord::File {
            size: 0,
            mtime: 1_700_000_100,
            digest: checksums::ContentHasher::digest(b""),
        })
    );

    let dirs = manifest.dirs().expect("dirs");
    assert_eq!(dirs.len(), 2);
    assert!(dirs.contains(""));
    assert!(dirs.contains("sub"));
}

#[test]
fn populate_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    let before_root = manifest.list("").expect("list");
    let before_sub = manifest.list("sub").expect("list");

    create_manifest(&root, &manifest, &WalkOptions::default()).expect("repopulate");

    assert_eq!(manifest.list("").expect("list"), before_root);
    assert_eq!(manifest.list("sub").expect("list"), before_sub);
    assert_eq!(manifest.dirs().expect("dirs").len(), 2);
}

#[test]
fn verify_is_clean_on_an_unchanged_tree() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");
    recorder.assert_clean();
    // Every recorded entry was compared exactly once.
    assert_eq!(recorder.events.len(), 3);
}

#[test]
fn verify_reports_a_changed_file_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    write_with_mtime(&root.join("a.txt"), b"", 1_700_000_500);

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");

    assert_eq!(recorder.unequal(), vec!["a.txt"]);
    assert!(recorder.missing().is_empty());
    assert!(recorder.new_entries().is_empty());
}

#[test]
fn verify_reports_a_missing_file_at_directory_leave() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    fs::remove_file(root.join("sub/b.txt")).expect("remove");

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");

    assert_eq!(
        recorder.missing(),
        vec![&Event::Missing(EntryKind::File, "sub/b.txt".to_owned())]
    );
    assert!(recorder.new_entries().is_empty());
    assert!(recorder.unequal().is_empty());
}

#[test]
fn verify_reports_a_missing_subtree_as_one_event() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    fs::remove_dir_all(root.join("sub")).expect("remove subtree");

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");

    assert_eq!(
        recorder.missing(),
        vec![&Event::Missing(EntryKind::Dir, "sub".to_owned())]
    );
}

#[test]
fn verify_reports_a_new_file_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    fs::write(root.join("new.dat"), b"fresh").expect("write");

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");

    assert_eq!(
        recorder.new_entries(),
        vec![&Event::New(EntryKind::File, "new.dat".to_owned())]
    );
    assert!(recorder.missing().is_empty());
    assert!(recorder.unequal().is_empty());
}

#[test]
fn verify_does_not_descend_into_unknown_directories() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (root, manifest) = populated(&temp);

    fs::create_dir(root.join("newdir")).expect("mkdir");
    fs::write(root.join("newdir/inner.txt"), b"data").expect("write");

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");

    assert_eq!(
        recorder.new_entries(),
        vec![&Event::New(EntryKind::Dir, "newdir".to_owned())]
    );
    assert!(!recorder
        .events
        .iter()
        .any(|e| format!("{e:?}").contains("inner.txt")));
}

#[test]
fn symlinks_are_invisible_to_populate_and_verify() {
    use std::os::unix::fs::symlink;

    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("root");
    build_sample_tree(&root);
    symlink("/", root.join("sub/escape")).expect("symlink");

    let manifest = Manifest::open(&temp.path().join("files.db"), true).expect("open manifest");
    create_manifest(&root, &manifest, &WalkOptions::default()).expect("populate");

    assert!(!manifest.list("sub").expect("list").contains_key("escape"));
    assert_eq!(manifest.dirs().expect("dirs").len(), 2);

    let mut recorder = Recorder::default();
    verify_tree(&root, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");
    recorder.assert_clean();
}

#[test]
fn failed_populate_leaves_the_manifest_untouched() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("root");
    build_sample_tree(&root);
    let locked = root.join("locked");
    fs::create_dir(&locked).expect("mkdir");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

    if fs::read_dir(&locked).is_ok() {
        // Running privileged; the permission bits cannot produce the error.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("restore");
        return;
    }

    let manifest = Manifest::open(&temp.path().join("files.db"), true).expect("open manifest");
    let options = WalkOptions {
        access_denied: DenyPolicy::Fail,
    };
    let result = create_manifest(&root, &manifest, &options);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("restore");

    result.expect_err("denied descent aborts the populate");
    assert!(manifest.dirs().expect("dirs").is_empty());
    assert!(manifest.list("").expect("list").is_empty());
}

#[test]
fn merge_copies_missing_entries_and_preserves_contents() {
    let temp = tempfile::tempdir().expect("tempdir");
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("d")).expect("create src");
    write_with_mtime(&src.join("x"), b"0123456789", 1_700_001_000);
    write_with_mtime(&src.join("d/y"), &[7u8; 20], 1_700_002_000);

    let manifest = Manifest::open(&temp.path().join("files.db"), true).expect("open manifest");
    create_manifest(&src, &manifest, &WalkOptions::default()).expect("populate");

    let dest = temp.path().join("dest");
    fs::create_dir(&dest).expect("create dest");

    let counts = merge_tree(&src, &dest, &manifest, &WalkOptions::default()).expect("merge");
    assert_eq!(counts.missing, 2);

    assert_eq!(fs::read(dest.join("x")).expect("read x"), b"0123456789");
    assert_eq!(fs::read(dest.join("d/y")).expect("read y"), vec![7u8; 20]);

    // The merged tree verifies cleanly, mtimes included.
    let mut recorder = Recorder::default();
    verify_tree(&dest, &manifest, &mut recorder, &WalkOptions::default()).expect("verify");
    recorder.assert_clean();
}

#[test]
fn merge_reports_but_keeps_entries_only_in_the_destination() {
    let temp = tempfile::tempdir().expect("tempdir");
    let src = temp.path().join("src");
    fs::create_dir(&src).expect("create src");
    write_with_mtime(&src.join("x"), b"payload", 1_700_001_000);

    let manifest = Manifest::open(&temp.path().join("files.db"), true).expect("open manifest");
    create_manifest(&src, &manifest, &WalkOptions::default()).expect("populate");

    let dest = temp.path().join("dest");
    fs::create_dir(&dest).expect("create dest");
    fs::write(dest.join("extra.txt"), b"kept").expect("write extra");

    let counts = merge_tree(&src, &dest, &manifest, &WalkOptions::default()).expect("merge");
    assert_eq!(counts.unexpected, 1);
    assert_eq!(counts.missing, 1);

    assert_eq!(fs::read(dest.join("extra.txt")).expect("read"), b"kept");
    assert_eq!(fs::read(dest.join("x")).expect("read"), b"payload");
}

#[test]
fn merge_into_a_partial_destination_fills_only_the_gaps() {
    let temp = tempfile::tempdir().expect("tempdir");
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("d")).expect("create src");
    write_with_mtime(&src.join("x"), b"0123456789", 1_700_001_000);
    write_with_mtime(&src.join("d/y"), b"nested bytes", 1_700_002_000);

    let manifest = Manifest::open(&temp.path().join("files.db"), true).expect("open manifest");
    create_manifest(&src, &manifest, &WalkOptions::default()).expect("populate");

    // Destination already holds a matching copy of `x`.
    let dest = temp.path().join("dest");
    fs::create_dir(&dest).expect("create dest");
    write_with_mtime(&dest.join("x"), b"0123456789", 1_700_001_000);

    let counts = merge_tree(&src, &dest, &manifest, &WalkOptions::default()).expect("merge");
    assert_eq!(counts.missing, 1);
    assert_eq!(counts.mismatched, 0);

    assert_eq!(fs::read(dest.join("d/y")).expect("read"), b"nested bytes");
}
