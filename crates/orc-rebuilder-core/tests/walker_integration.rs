//! Integration tests for the recursive archive walk

mod common;

use common::*;
use orc_rebuilder_core::{
    ArchiveSource, ArchiveWalker, SevenZipBackend, WalkContext, WalkError, WalkProgress,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use tempfile::TempDir;

fn context(dest: &TempDir) -> WalkContext {
    WalkContext {
        destination: dest.path().to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn test_single_artifact_is_rebuilt_under_volume_folder() {
    let dest = TempDir::new().unwrap();
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("abc123", GUID_VOLUME, r"\Windows\System32\foo.txt")]),
        ),
        ("abc123", b"X"),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    let expected = dest
        .path()
        .join(GUID_VOLUME)
        .join("Windows/System32/foo.txt");
    assert_eq!(std::fs::read(&expected).unwrap(), b"X");
    assert_eq!(outcome.stats.artifacts_written, 1);
    assert!(outcome.volume_labels.is_empty());
    assert!(log.is_empty());
}

#[test]
fn test_modification_time_is_restored_to_the_second() {
    let dest = TempDir::new().unwrap();
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("abc123", "0x5A3C", r"\a.txt")]),
        ),
        ("abc123", b"X"),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    let metadata = std::fs::metadata(dest.path().join("0x5A3C/a.txt")).unwrap();
    let modified = metadata.modified().unwrap().duration_since(UNIX_EPOCH).unwrap();
    // 2023-01-02T03:04:05Z
    assert_eq!(modified.as_secs(), 1672628645);
}

#[test]
fn test_snapshot_samples_get_their_own_folder() {
    let dest = TempDir::new().unwrap();
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[
                Sample::new("live", "0x5A3C", r"\Users\bob\NTUSER.DAT"),
                Sample::new("shadow", "0x5A3C", r"\Users\bob\NTUSER.DAT").snapshot(SNAPSHOT),
            ]),
        ),
        ("live", b"now"),
        ("shadow", b"then"),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    let live = dest.path().join("0x5A3C/Users/bob/NTUSER.DAT");
    let shadow = dest
        .path()
        .join(format!("0x5A3C (vsc {})", SNAPSHOT))
        .join("Users/bob/NTUSER.DAT");
    assert_eq!(std::fs::read(live).unwrap(), b"now");
    assert_eq!(std::fs::read(shadow).unwrap(), b"then");
}

#[test]
fn test_corrupt_nested_archive_does_not_abort() {
    let dest = TempDir::new().unwrap();
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("abc123", "0x5A3C", r"\ok.txt")]),
        ),
        ("Broken.7z", b"\x37\x7a\xbc\xaf truncated"),
        ("abc123", b"X"),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert!(dest.path().join("0x5A3C/ok.txt").is_file());
    assert_eq!(outcome.stats.archives_opened, 1);
    assert_eq!(outcome.stats.archives_failed, 1);
}

#[test]
fn test_truncated_sevenz_nested_archive_does_not_abort() {
    let dest = TempDir::new().unwrap();
    let whole = sevenz_archive(&[("inner.txt", b"lost"), ("other.txt", b"lost too")]);
    let truncated = &whole[..whole.len() / 2];
    let root = sevenz_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("abc123", "0x5A3C", r"\ok.txt")]),
        ),
        ("Broken.7z", truncated),
        ("abc123", b"X"),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&SevenZipBackend::new(), &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert_eq!(std::fs::read(dest.path().join("0x5A3C/ok.txt")).unwrap(), b"X");
    assert_eq!(outcome.stats.archives_opened, 1);
    assert_eq!(outcome.stats.archives_failed, 1);
    assert_eq!(outcome.written.len(), 1);
}

#[test]
fn test_invalid_root_archive_is_reported_to_caller() {
    let dest = TempDir::new().unwrap();
    let ctx = context(&dest);
    let log = discard_log();
    let result = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(b"nope".to_vec()), ".");

    assert!(matches!(result, Err(WalkError::Open { .. })));
}

#[test]
fn test_child_labels_override_parent() {
    let dest = TempDir::new().unwrap();
    let child = fake_archive(&[("volstats.csv", &volstats(&[("V1", "D:\\"), ("V2", "E:\\")]))]);
    let root = fake_archive(&[
        ("volstats.csv", &volstats(&[("V1", "C:\\"), ("V3", "F:\\")])),
        ("Child.7z", &child),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    let labels = outcome.volume_labels;
    assert_eq!(labels.get("V1"), Some('D'));
    assert_eq!(labels.get("V2"), Some('E'));
    assert_eq!(labels.get("V3"), Some('F'));
}

#[test]
fn test_later_sibling_wins_on_label_collision() {
    let dest = TempDir::new().unwrap();
    let first = fake_archive(&[("volstats.csv", &volstats(&[("V1", "C:\\")]))]);
    let second = fake_archive(&[("volstats.csv", &volstats(&[("V1", "D:\\")]))]);
    let root = fake_archive(&[("A.7z", &first), ("B.7z", &second)]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert_eq!(outcome.volume_labels.get("V1"), Some('D'));
}

#[test]
fn test_labels_bubble_up_from_any_depth() {
    let dest = TempDir::new().unwrap();
    let deepest = fake_archive(&[("volstats.csv", &volstats(&[("0x5A3C", "C:\\"), ("0x77AA", "")]))]);
    let middle = fake_archive(&[("Deepest.7z", &deepest)]);
    let root = fake_archive(&[("Middle.7z", &middle)]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert_eq!(outcome.volume_labels.get("0x5A3C"), Some('C'));
    assert_eq!(outcome.volume_labels.get("0x77AA"), None);
    assert_eq!(outcome.stats.archives_opened, 3);
}

#[test]
fn test_manifest_only_applies_to_its_own_level() {
    let dest = TempDir::new().unwrap();
    let child = fake_archive(&[("abc123", b"child copy")]);
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("abc123", "0x5A3C", r"\a.txt")]),
        ),
        ("Child.7z", &child),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert!(!dest.path().join("0x5A3C/a.txt").exists());
    assert_eq!(outcome.stats.artifacts_written, 0);
    assert_eq!(outcome.stats.entries_skipped, 1);
}

#[test]
fn test_malformed_manifest_skips_the_whole_level() {
    let dest = TempDir::new().unwrap();
    let mut bad_manifest = getthis(&[Sample::new("good", "0x1", r"\good.txt")]);
    bad_manifest.extend_from_slice(b"WKS01,0x1,\\bad.txt,bad,1,yesterday,today,{00000000-0000-0000-0000-000000000000}\r\n");
    let bad = fake_archive(&[("GetThis.csv", &bad_manifest), ("good", b"g"), ("bad", b"b")]);
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("root", "0x2", r"\root.txt")]),
        ),
        ("Bad.7z", &bad),
        ("root", b"r"),
    ]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert!(dest.path().join("0x2/root.txt").is_file());
    assert!(!dest.path().join("0x1").exists());
    assert_eq!(outcome.stats.archives_failed, 1);

    // The same manifest at the top fails the walk.
    let root = fake_archive(&[("GetThis.csv", &bad_manifest), ("good", b"g")]);
    let result = ArchiveWalker::new(&JsonBackend, &ctx, &log).walk(ArchiveSource::Memory(root), ".");
    assert!(matches!(result, Err(WalkError::Manifest { .. })));
}

#[test]
fn test_traversal_in_manifest_is_refused() {
    let dest = TempDir::new().unwrap();
    let target_root = dest.path().join("out");
    let root = fake_archive(&[
        (
            "GetThis.csv",
            &getthis(&[Sample::new("evil", "0x1", r"\..\..\escaped.txt")]),
        ),
        ("evil", b"pwned"),
    ]);

    let ctx = WalkContext {
        destination: target_root,
        ..Default::default()
    };
    let log = discard_log();
    let result = ArchiveWalker::new(&JsonBackend, &ctx, &log).walk(ArchiveSource::Memory(root), ".");

    assert!(matches!(result, Err(WalkError::Manifest { .. })));
    assert!(!dest.path().join("escaped.txt").exists());
}

#[test]
fn test_protected_archive_uses_configured_password() {
    let dest = TempDir::new().unwrap();
    let secret = fake_protected_archive(
        "avproof",
        &[
            (
                "GetThis.csv",
                &getthis(&[Sample::new("mal", "0x1", r"\Temp\dropper.exe")]),
            ),
            ("mal", b"MZ"),
        ],
    );
    let root = fake_archive(&[("Secret.7z", &secret)]);

    let log = discard_log();
    let without = ArchiveWalker::new(&JsonBackend, &context(&dest), &log)
        .walk(ArchiveSource::Memory(root.clone()), ".")
        .unwrap();
    assert_eq!(without.stats.archives_failed, 1);
    assert!(!dest.path().join("0x1/Temp/dropper.exe").exists());

    let ctx = WalkContext {
        passwords: HashMap::from([("Secret.7z".to_string(), "avproof".to_string())]),
        ..context(&dest)
    };
    let with = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();
    assert_eq!(with.stats.archives_failed, 0);
    assert_eq!(std::fs::read(dest.path().join("0x1/Temp/dropper.exe")).unwrap(), b"MZ");
}

#[test]
fn test_report_files_are_copied_verbatim() {
    let dest = TempDir::new().unwrap();
    let general = fake_archive(&[("Config.xml", b"<orc/>"), ("Other.xml", b"<no/>")]);
    let root = fake_archive(&[
        ("Summary.txt", b"summary"),
        ("General.7z", &general),
    ]);

    let ctx = WalkContext {
        report_files: ["./Summary.txt", "General.7z/Config.xml"]
            .into_iter()
            .map(String::from)
            .collect(),
        report_directory: Some(dest.path().join("reports")),
        ..context(&dest)
    };
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert_eq!(std::fs::read(dest.path().join("reports/Summary.txt")).unwrap(), b"summary");
    assert_eq!(std::fs::read(dest.path().join("reports/Config.xml")).unwrap(), b"<orc/>");
    assert!(!dest.path().join("reports/Other.xml").exists());
    assert_eq!(outcome.stats.reports_written, 2);
    assert_eq!(outcome.stats.entries_skipped, 1);
}

#[test]
fn test_conflicting_targets_are_logged_not_overwritten() {
    let dest = TempDir::new().unwrap();
    let manifest = getthis(&[Sample::new("abc", "0x1", r"\same.txt")]);
    let first = fake_archive(&[("GetThis.csv", &manifest), ("abc", b"first")]);
    let second = fake_archive(&[("GetThis.csv", &manifest), ("abc", b"second")]);
    let root = fake_archive(&[("First.7z", &first), ("Second.7z", &second)]);

    let ctx = context(&dest);
    let log = discard_log();
    let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert_eq!(std::fs::read(dest.path().join("0x1/same.txt")).unwrap(), b"first");
    assert_eq!(outcome.stats.write_conflicts, 1);
    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].archive_name, "Second.7z");
    assert_eq!(entries[0].artefact_name, "abc");
    assert_eq!(entries[0].expected_path, dest.path().join("0x1/same.txt"));
}

#[test]
fn test_parallel_walk_matches_sequential() {
    let children: Vec<Vec<u8>> = (0..6)
        .map(|i| {
            let sample = format!("s{}", i);
            let path = format!(r"\dir\file{}.txt", i);
            let mount = format!("{}:\\", (b'C' + i as u8) as char);
            fake_archive(&[
                ("GetThis.csv", &getthis(&[Sample::new(&sample, "0x1", &path)])),
                (sample.as_str(), sample.as_bytes()),
                ("volstats.csv", &volstats(&[("0x1", &mount), (&format!("own{}", i), "Z:\\")])),
            ])
        })
        .collect();
    let names: Vec<String> = (0..6).map(|i| format!("Part{}.7z", i)).collect();
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .zip(&children)
        .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
        .collect();
    let root = fake_archive(&entries);

    let run = |parallel: bool| {
        let dest = TempDir::new().unwrap();
        let ctx = WalkContext {
            parallel,
            ..context(&dest)
        };
        let log = discard_log();
        let outcome = ArchiveWalker::new(&JsonBackend, &ctx, &log)
            .walk(ArchiveSource::Memory(root.clone()), ".")
            .unwrap();
        for i in 0..6 {
            assert!(dest.path().join(format!("0x1/dir/file{}.txt", i)).is_file());
        }
        outcome
    };

    let sequential = run(false);
    let parallel = run(true);
    assert_eq!(sequential.volume_labels, parallel.volume_labels);
    assert_eq!(sequential.stats, parallel.stats);
    // Listing order decides: the last part maps 0x1 to H.
    assert_eq!(parallel.volume_labels.get("0x1"), Some('H'));
}

#[test]
fn test_progress_reports_every_opened_archive() {
    let dest = TempDir::new().unwrap();
    let child = fake_archive(&[("x", b"")]);
    let root = fake_archive(&[("Child.7z", &child), ("Broken.7z", b"")]);

    let seen = Mutex::new(Vec::new());
    let callback = |progress: WalkProgress| {
        seen.lock().unwrap().push((progress.archive_name, progress.depth));
    };
    let ctx = context(&dest);
    let log = discard_log();
    ArchiveWalker::new(&JsonBackend, &ctx, &log)
        .with_progress(&callback)
        .walk(ArchiveSource::Memory(root), ".")
        .unwrap();

    assert_eq!(
        seen.into_inner().unwrap(),
        vec![(".".to_string(), 0), ("Child.7z".to_string(), 1)]
    );
}
