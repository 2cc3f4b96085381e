use clap::Parser;
/// Integration tests for tidy
///
/// These tests run whole actions against temporary trees, through the library
/// API and through the command-line entry point.
///
/// Test categories:
/// 1. Dedupe workflows
/// 2. Organize workflows and idempotence
/// 3. Encryption and key handling
/// 4. Dry-run fidelity
/// 5. Filtering
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tidy::actions::{self, ActionContext, DedupeMode, EncryptOptions, OrganizeMode};
use tidy::cli::{Cli, run_cli};
use tidy::config::PathFilter;
use tidy::fingerprint::Blake3Fingerprinter;
use tidy::keystore::{KeyMaterial, KeyStore, select_key_store};
use tidy::relocator::RunMode;

// ============================================================================
// Test Utilities
// ============================================================================

/// A temporary directory tree to run actions against.
struct TestFixture {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp directory");
        TestFixture {
            _temp_dir: temp_dir,
            root,
        }
    }

    fn path(&self) -> &Path {
        &self.root
    }

    /// Create a file, and any parent directories, with content.
    fn create_file(&self, rel_path: &str, content: &[u8]) {
        let path = self.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write file");
    }

    fn read(&self, rel_path: &str) -> Vec<u8> {
        fs::read(self.path().join(rel_path)).expect("Failed to read file")
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }

    /// Every file below the root, relative and sorted.
    fn list_files_recursive(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        Self::walk_dir(self.path(), &mut files);
        let mut files: Vec<PathBuf> = files
            .into_iter()
            .map(|p| p.strip_prefix(self.path()).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                } else if path.is_dir() {
                    Self::walk_dir(&path, files);
                }
            }
        }
    }

    /// Snapshot of every file and its content.
    fn contents(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.list_files_recursive()
            .into_iter()
            .map(|rel| {
                let content = fs::read(self.path().join(&rel)).unwrap();
                (rel, content)
            })
            .collect()
    }

    /// Run the CLI against this fixture's root with extra arguments.
    fn run(&self, args: &[&str]) -> Result<(), tidy::cli::CliError> {
        let root = self.path().to_str().expect("non UTF-8 temp path");
        let mut argv = vec!["tidy", "--root", root];
        argv.extend_from_slice(args);
        run_cli(&Cli::try_parse_from(argv).expect("Failed to parse arguments"))
    }

    fn rel(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.path()).unwrap().to_path_buf()
    }
}

fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}

// ============================================================================
// Test Suite 1: Dedupe
// ============================================================================

#[test]
fn test_dedupe_report_scenario_leaves_tree_untouched() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"0123456789");
    fixture.create_file("b.txt", b"0123456789");
    fixture.create_file("c.txt", b"abcdefghij");
    fixture.create_file("d.txt", b"01234567890123456789");
    let before = fixture.contents();

    let filter = PathFilter::default();
    let ctx = ActionContext::new(fixture.path(), &filter, RunMode::Apply);
    let outcome = actions::dedupe(
        &ctx,
        DedupeMode::Report,
        &fixture.path().join("_duplicates"),
        &Blake3Fingerprinter,
    );

    assert_eq!(outcome.group_count(), 1);
    let group = &outcome.groups[0];
    assert_eq!(group.len(), 2);
    assert_eq!(fixture.rel(group.keeper()), p("a.txt"));
    assert_eq!(group.duplicates().len(), 1);
    assert_eq!(fixture.rel(&group.duplicates()[0]), p("b.txt"));
    assert_eq!(outcome.operated, 0);
    assert_eq!(fixture.contents(), before);
}

#[test]
fn test_dedupe_report_via_cli_with_apply_does_not_mutate() {
    let fixture = TestFixture::new();
    fixture.create_file("one.bin", b"payload");
    fixture.create_file("nested/two.bin", b"payload");
    let before = fixture.contents();

    fixture.run(&["--dedupe", "report", "--apply"]).unwrap();

    assert_eq!(fixture.contents(), before);
}

#[test]
fn test_dedupe_move_applies_into_flat_directory() {
    let fixture = TestFixture::new();
    fixture.create_file("keep.jpg", b"photo-bytes");
    fixture.create_file("backup/keep.jpg", b"photo-bytes");
    fixture.create_file("old/backup/keep.jpg", b"photo-bytes");
    fixture.create_file("unique.jpg", b"other-bytes!");

    fixture.run(&["--dedupe", "move", "--apply"]).unwrap();

    fixture.assert_file_exists("keep.jpg");
    fixture.assert_file_exists("unique.jpg");
    fixture.assert_file_not_exists("backup/keep.jpg");
    fixture.assert_file_not_exists("old/backup/keep.jpg");
    fixture.assert_file_exists("_duplicates/keep.jpg");
    fixture.assert_file_exists("_duplicates/keep__1.jpg");
    assert_eq!(fixture.read("_duplicates/keep__1.jpg"), b"photo-bytes");
}

#[test]
fn test_dedupe_delete_dry_run_then_apply() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"same");
    fixture.create_file("sub/a.txt", b"same");

    fixture.run(&["--dedupe", "delete"]).unwrap();
    fixture.assert_file_exists("sub/a.txt");

    fixture.run(&["--dedupe", "delete", "--apply"]).unwrap();
    fixture.assert_file_exists("a.txt");
    fixture.assert_file_not_exists("sub/a.txt");
}

#[test]
fn test_dedupe_custom_duplicates_dir() {
    let fixture = TestFixture::new();
    let elsewhere = TempDir::new().unwrap();
    fixture.create_file("x.dat", b"same");
    fixture.create_file("y.dat", b"same");

    let dups = elsewhere.path().join("dups");
    fixture
        .run(&["--dedupe", "move", "--duplicates-dir", dups.to_str().unwrap(), "--apply"])
        .unwrap();

    assert!(dups.join("y.dat").is_file());
    fixture.assert_file_exists("x.dat");
    fixture.assert_file_not_exists("y.dat");
}

// ============================================================================
// Test Suite 2: Organize
// ============================================================================

#[test]
fn test_organize_by_extension_scenario() {
    let fixture = TestFixture::new();
    fixture.create_file("x.JPG", b"x");
    fixture.create_file("y.jpg", b"y");
    fixture.create_file("z", b"z");

    fixture.run(&["--organize", "ext", "--apply"]).unwrap();

    assert_eq!(
        fixture.list_files_recursive(),
        vec![
            p("_organized/jpg/x.JPG"),
            p("_organized/jpg/y.jpg"),
            p("_organized/noext/z"),
        ]
    );
}

#[test]
fn test_organize_disambiguates_same_basename() {
    let fixture = TestFixture::new();
    fixture.create_file("a/photo.jpg", b"first");
    fixture.create_file("b/photo.jpg", b"second");

    fixture.run(&["--organize", "ext", "--apply"]).unwrap();

    assert_eq!(fixture.read("_organized/jpg/photo.jpg"), b"first");
    assert_eq!(fixture.read("_organized/jpg/photo__1.jpg"), b"second");
}

#[test]
fn test_organize_twice_makes_no_moves_the_second_time() {
    let fixture = TestFixture::new();
    fixture.create_file("a/photo.jpg", b"first");
    fixture.create_file("b/photo.jpg", b"second");
    fixture.create_file("notes.TXT", b"notes");
    fixture.create_file("README", b"readme");

    let filter = PathFilter::default();
    let organize_dir = fixture.path().join("_organized");
    let ctx = ActionContext::new(fixture.path(), &filter, RunMode::Apply);

    let first = actions::organize(&ctx, OrganizeMode::Ext, &organize_dir);
    assert_eq!(first.moved(), 4);
    let after_first = fixture.contents();

    let second = actions::organize(&ctx, OrganizeMode::Ext, &organize_dir);
    assert_eq!(second.moved(), 0);
    assert_eq!(second.already_in_place, 4);
    assert_eq!(fixture.contents(), after_first);
}

#[test]
fn test_organize_by_date_is_idempotent() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"a");
    fixture.create_file("deep/b.txt", b"b");

    let filter = PathFilter::default();
    let organize_dir = fixture.path().join("_organized");
    let ctx = ActionContext::new(fixture.path(), &filter, RunMode::Apply);

    let first = actions::organize(&ctx, OrganizeMode::Date, &organize_dir);
    assert_eq!(first.moved(), 2);
    for plan in &first.moves {
        let rel = plan.destination.strip_prefix(&organize_dir).unwrap();
        let parts: Vec<_> = rel.iter().map(|c| c.to_string_lossy().into_owned()).collect();
        assert_eq!(parts.len(), 3, "expected YYYY/MM/name, got {:?}", parts);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[1].len(), 2);
    }

    let second = actions::organize(&ctx, OrganizeMode::Date, &organize_dir);
    assert_eq!(second.moved(), 0);
}

// ============================================================================
// Test Suite 3: Encryption
// ============================================================================

#[cfg(feature = "fernet")]
#[test]
fn test_encrypt_dry_run_then_apply_with_remove_originals() {
    let fixture = TestFixture::new();
    fixture.create_file("secret.txt", b"top secret contents");

    // Dry run: only the key file is written.
    fixture.run(&["--encrypt", "--remove-originals"]).unwrap();
    fixture.assert_file_exists("secret.txt");
    fixture.assert_file_exists("_key.fernet");
    fixture.assert_file_not_exists("_encrypted/secret.txt.enc");
    let key_after_dry_run = fixture.read("_key.fernet");

    fixture.run(&["--encrypt", "--remove-originals", "--apply"]).unwrap();
    fixture.assert_file_not_exists("secret.txt");
    fixture.assert_file_exists("_encrypted/secret.txt.enc");
    fixture.assert_file_exists("_key.fernet");
    assert_eq!(fixture.read("_key.fernet"), key_after_dry_run);

    let store = select_key_store();
    let key = KeyMaterial::from_encoded(std::str::from_utf8(&key_after_dry_run).unwrap()).unwrap();
    let ciphertext = fixture.read("_encrypted/secret.txt.enc");
    assert_eq!(store.decrypt(&ciphertext, &key).unwrap(), b"top secret contents");
}

#[cfg(feature = "fernet")]
#[test]
fn test_encrypt_mirrors_tree_and_skips_own_output() {
    let fixture = TestFixture::new();
    fixture.create_file("docs/a.pdf", b"pdf");
    fixture.create_file("b.txt", b"text");
    fixture.create_file("already.enc", b"opaque");

    fixture.run(&["--encrypt", "--apply"]).unwrap();

    fixture.assert_file_exists("_encrypted/docs/a.pdf.enc");
    fixture.assert_file_exists("_encrypted/b.txt.enc");
    fixture.assert_file_not_exists("_encrypted/already.enc.enc");
    fixture.assert_file_not_exists("_encrypted/_key.fernet.enc");

    // Re-running finds every artifact in place and writes nothing new.
    let before = fixture.contents();
    fixture.run(&["--encrypt", "--apply"]).unwrap();
    fixture.run(&["--encrypt", "--apply"]).unwrap();
    assert_eq!(fixture.contents(), before);
    fixture.assert_file_not_exists("_encrypted/b.txt__1.enc");
    fixture.assert_file_not_exists("_encrypted/_encrypted/b.txt.enc.enc");
}

#[cfg(feature = "fernet")]
#[test]
fn test_encrypt_round_trip_via_library() {
    let fixture = TestFixture::new();
    let binary: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();
    fixture.create_file("blob.bin", &binary);

    let filter = PathFilter::default();
    let ctx = ActionContext::new(fixture.path(), &filter, RunMode::Apply);
    let key_dir = TempDir::new().unwrap();
    let options = EncryptOptions {
        output_dir: &fixture.path().join("out"),
        key_file: &key_dir.path().join("k.fernet"),
        remove_originals: false,
    };
    let store = select_key_store();
    let key = store.load_or_create(options.key_file).unwrap();

    let outcome = actions::encrypt_tree(&ctx, &options, store.as_ref(), &key);
    assert_eq!(outcome.processed(), 1);
    assert!(outcome.failures.is_empty());

    let ciphertext = fixture.read("out/blob.bin.enc");
    assert_eq!(store.decrypt(&ciphertext, &key).unwrap(), binary);
    fixture.assert_file_exists("blob.bin");
}

#[test]
fn test_invalid_key_file_is_fatal_before_encrypting() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"a");
    fixture.create_file("_key.fernet", b"garbage");

    let err = fixture.run(&["--encrypt", "--apply", "--remove-originals"]).unwrap_err();

    assert_eq!(err.exit_code(), 2);
    fixture.assert_file_exists("a.txt");
    fixture.assert_file_not_exists("_encrypted/a.txt.enc");
}

#[test]
fn test_invalid_key_file_stops_run_before_earlier_actions() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"dup");
    fixture.create_file("bb.txt", b"dup");
    fixture.create_file("_key.fernet", b"garbage");
    let before = fixture.contents();

    let err = fixture
        .run(&["--dedupe", "delete", "--organize", "ext", "--encrypt", "--apply"])
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    fixture.assert_file_exists("bb.txt");
    assert_eq!(fixture.contents(), before);
}

#[cfg(feature = "fernet")]
#[test]
fn test_encrypt_resumes_after_partial_run_with_remove_originals() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"first");
    fixture.create_file("b.txt", b"second");

    // First run handles a.txt only.
    fixture
        .run(&["--encrypt", "--exclude-glob", "*/b.txt", "--remove-originals", "--apply"])
        .unwrap();
    fixture.assert_file_not_exists("a.txt");
    fixture.assert_file_exists("b.txt");
    let first_artifact = fixture.read("_encrypted/a.txt.enc");

    fixture.run(&["--encrypt", "--remove-originals", "--apply"]).unwrap();

    fixture.assert_file_not_exists("b.txt");
    fixture.assert_file_exists("_encrypted/b.txt.enc");
    assert_eq!(fixture.read("_encrypted/a.txt.enc"), first_artifact);
    assert_eq!(
        fixture.list_files_recursive(),
        vec![
            p("_encrypted/a.txt.enc"),
            p("_encrypted/b.txt.enc"),
            p("_key.fernet"),
        ]
    );
}

// ============================================================================
// Test Suite 4: Dry-run fidelity
// ============================================================================

#[test]
fn test_organize_dry_run_matches_applied_pairs() {
    let build = || {
        let fixture = TestFixture::new();
        fixture.create_file("a/photo.jpg", b"1");
        fixture.create_file("b/photo.jpg", b"2");
        fixture.create_file("c/photo.JPG", b"3");
        fixture.create_file("_organized/jpg/photo.jpg", b"existing");
        fixture.create_file("doc.pdf", b"4");
        fixture
    };
    let pairs = |fixture: &TestFixture, mode| {
        let filter = PathFilter::default();
        let ctx = ActionContext::new(fixture.path(), &filter, mode);
        actions::organize(&ctx, OrganizeMode::Ext, &fixture.path().join("_organized"))
            .moves
            .into_iter()
            .map(|plan| (fixture.rel(&plan.source), fixture.rel(&plan.destination)))
            .collect::<Vec<_>>()
    };

    let dry = build();
    let before = dry.contents();
    let preview = pairs(&dry, RunMode::DryRun);
    assert_eq!(dry.contents(), before, "dry run must not touch the tree");

    let real = build();
    let applied = pairs(&real, RunMode::Apply);

    assert_eq!(preview, applied);
    assert_eq!(
        applied,
        vec![
            (p("a/photo.jpg"), p("_organized/jpg/photo__1.jpg")),
            (p("b/photo.jpg"), p("_organized/jpg/photo__2.jpg")),
            (p("c/photo.JPG"), p("_organized/jpg/photo.JPG")),
            (p("doc.pdf"), p("_organized/pdf/doc.pdf")),
        ]
    );
}

#[test]
fn test_dedupe_move_dry_run_matches_applied_pairs() {
    let build = || {
        let fixture = TestFixture::new();
        fixture.create_file("k.txt", b"dup");
        fixture.create_file("x/k.txt", b"dup");
        fixture.create_file("y/k.txt", b"dup");
        fixture
    };
    let pairs = |fixture: &TestFixture, mode| {
        let filter = PathFilter::default();
        let ctx = ActionContext::new(fixture.path(), &filter, mode);
        actions::dedupe(
            &ctx,
            DedupeMode::Move,
            &fixture.path().join("_duplicates"),
            &Blake3Fingerprinter,
        )
        .moves
        .into_iter()
        .map(|plan| (fixture.rel(&plan.source), fixture.rel(&plan.destination)))
        .collect::<Vec<_>>()
    };

    let dry = build();
    let preview = pairs(&dry, RunMode::DryRun);
    dry.assert_file_exists("x/k.txt");
    dry.assert_file_not_exists("_duplicates/k.txt");

    let real = build();
    let applied = pairs(&real, RunMode::Apply);

    assert_eq!(preview, applied);
    assert_eq!(
        applied,
        vec![
            (p("x/k.txt"), p("_duplicates/k.txt")),
            (p("y/k.txt"), p("_duplicates/k__1.txt")),
        ]
    );
}

#[cfg(feature = "fernet")]
#[test]
fn test_encrypt_dry_run_matches_applied_pairs() {
    let build = || {
        let fixture = TestFixture::new();
        fixture.create_file("a.txt", b"a");
        fixture.create_file("sub/b.txt", b"b");
        fixture.create_file("c.txt", b"c");
        fixture.create_file("_encrypted/c.txt.enc", b"earlier artifact");
        fixture
    };
    let pairs = |fixture: &TestFixture, mode| {
        let filter = PathFilter::default();
        let ctx = ActionContext::new(fixture.path(), &filter, mode);
        let options = EncryptOptions {
            output_dir: &fixture.path().join("_encrypted"),
            key_file: &fixture.path().join("_key.fernet"),
            remove_originals: false,
        };
        let store = select_key_store();
        let key = store.load_or_create(options.key_file).unwrap();
        actions::encrypt_tree(&ctx, &options, store.as_ref(), &key)
            .written
            .into_iter()
            .map(|(src, dst)| (fixture.rel(&src), fixture.rel(&dst)))
            .collect::<Vec<_>>()
    };

    let preview = pairs(&build(), RunMode::DryRun);
    let real = build();
    let applied = pairs(&real, RunMode::Apply);

    assert_eq!(preview, applied);
    assert_eq!(
        applied,
        vec![
            (p("a.txt"), p("_encrypted/a.txt.enc")),
            (p("sub/b.txt"), p("_encrypted/sub/b.txt.enc")),
        ]
    );
    assert_eq!(real.read("_encrypted/c.txt.enc"), b"earlier artifact");
}

// ============================================================================
// Test Suite 5: Filtering
// ============================================================================

#[test]
fn test_hidden_files_skipped_unless_included() {
    let fixture = TestFixture::new();
    fixture.create_file(".config/app.toml", b"cfg");
    fixture.create_file(".profile", b"p");
    fixture.create_file("visible.toml", b"v");

    fixture.run(&["--organize", "ext", "--apply"]).unwrap();
    fixture.assert_file_exists(".config/app.toml");
    fixture.assert_file_exists(".profile");
    fixture.assert_file_exists("_organized/toml/visible.toml");

    fixture
        .run(&["--organize", "ext", "--include-hidden", "--apply"])
        .unwrap();
    fixture.assert_file_exists("_organized/toml/app.toml");
    fixture.assert_file_exists("_organized/noext/.profile");
}

#[test]
fn test_exclude_glob_matches_full_path() {
    let fixture = TestFixture::new();
    fixture.create_file("keep/a.log", b"a");
    fixture.create_file("skip/b.log", b"b");
    fixture.create_file("c.tmp", b"c");

    fixture
        .run(&[
            "--organize",
            "ext",
            "--exclude-glob",
            "*/skip/*",
            "--exclude-glob",
            "*.tmp",
            "--apply",
        ])
        .unwrap();

    fixture.assert_file_exists("_organized/log/a.log");
    fixture.assert_file_exists("skip/b.log");
    fixture.assert_file_exists("c.tmp");
}

#[test]
fn test_config_file_exclusions_apply() {
    let fixture = TestFixture::new();
    let config_dir = TempDir::new().unwrap();
    let config = config_dir.path().join("tidy.toml");
    fs::write(&config, "[filters.exclude]\nextensions = [\"bak\"]\n").unwrap();
    fixture.create_file("a.bak", b"a");
    fixture.create_file("b.txt", b"b");

    fixture
        .run(&["--organize", "ext", "--config", config.to_str().unwrap(), "--apply"])
        .unwrap();

    fixture.assert_file_exists("a.bak");
    fixture.assert_file_exists("_organized/txt/b.txt");
}

#[test]
fn test_invalid_exclude_glob_is_fatal() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"a");

    let err = fixture
        .run(&["--organize", "ext", "--exclude-glob", "[oops", "--apply"])
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    fixture.assert_file_exists("a.txt");
}

#[test]
fn test_report_writes_json_and_never_mutates() {
    let fixture = TestFixture::new();
    fixture.create_file("a.txt", b"hello");
    fixture.create_file("b/c.md", b"markdown!");
    let out_dir = TempDir::new().unwrap();
    let out = out_dir.path().join("inventory.json");
    let before = fixture.contents();

    fixture
        .run(&[
            "--report",
            "--report-format",
            "json",
            "--report-output",
            out.to_str().unwrap(),
            "--apply",
        ])
        .unwrap();

    assert_eq!(fixture.contents(), before);
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(value["total_files"], 2);
    assert_eq!(value["total_size_bytes"], 14);
}
