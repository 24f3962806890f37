//! Preview behavior against real temp directories.

use std::fs::File;
use std::io::Write;

use oncutf::files::FileEntry;
use oncutf::rename::{
    ConflictKind, EngineConfig, PostTransform, RenameEngine, RenameModule, RenamePlan,
};
use tempfile::tempdir;

fn engine() -> RenameEngine {
    RenameEngine::new(
        EngineConfig::default()
            .with_case_insensitive_fs(false)
            .without_memoization(),
    )
}

fn make_files(dir: &std::path::Path, names: &[&str]) -> Vec<FileEntry> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            File::create(&path)
                .unwrap()
                .write_all(b"content")
                .unwrap();
            FileEntry::from_path(&path).unwrap()
        })
        .collect()
}

fn counter_plan() -> RenamePlan {
    RenamePlan {
        modules: vec![RenameModule::Counter {
            start: 1,
            step: 1,
            padding: 3,
        }],
        transform: PostTransform::default(),
    }
}

#[test]
fn test_counter_preview_end_to_end() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg", "b.jpg"]);

    let previews = engine().preview(&files, &counter_plan());

    assert_eq!(previews.len(), 2);
    assert_eq!(
        (previews[0].old_name.as_str(), previews[0].new_name.as_str()),
        ("a.jpg", "001.jpg")
    );
    assert_eq!(
        (previews[1].old_name.as_str(), previews[1].new_name.as_str()),
        ("b.jpg", "002.jpg")
    );
    assert!(previews.iter().all(|p| p.valid));
    assert!(previews.iter().all(|p| p.conflict == ConflictKind::None));
}

#[test]
fn test_preview_idempotent_across_calls() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["x.png", "y.png", "z.png"]);
    let plan = counter_plan();
    let eng = engine();

    let first = eng.preview(&files, &plan);
    let second = eng.preview(&files, &plan);
    assert_eq!(first, second);
}

#[test]
fn test_preview_idempotent_with_memoization_enabled() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["x.png", "y.png"]);
    let plan = counter_plan();
    // Memoized engine: the second call is a cache hit and must be
    // observably identical
    let eng = RenameEngine::new(EngineConfig::default().with_case_insensitive_fs(false));

    let first = eng.preview(&files, &plan);
    let second = eng.preview(&files, &plan);
    assert_eq!(first, second);
}

#[test]
fn test_preview_length_and_order_match_input() {
    let dir = tempdir().unwrap();
    // Deliberately not in sorted order
    let files = make_files(dir.path(), &["zz.txt", "aa.txt", "mm.txt"]);

    let previews = engine().preview(&files, &counter_plan());

    assert_eq!(previews.len(), files.len());
    for (i, (file, preview)) in files.iter().zip(&previews).enumerate() {
        assert_eq!(preview.old_name, file.name);
        assert_eq!(preview.index, i);
    }
}

#[test]
fn test_ineffective_module_contributes_nothing() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["doc.txt"]);

    let with_empty_text = RenamePlan {
        modules: vec![
            RenameModule::SpecifiedText {
                text: String::new(),
            },
            RenameModule::Counter {
                start: 7,
                step: 1,
                padding: 2,
            },
        ],
        transform: PostTransform::default(),
    };
    let only_counter = RenamePlan {
        modules: vec![RenameModule::Counter {
            start: 7,
            step: 1,
            padding: 2,
        }],
        transform: PostTransform::default(),
    };

    let eng = engine();
    assert_eq!(
        eng.preview(&files, &with_empty_text)[0].new_name,
        eng.preview(&files, &only_counter)[0].new_name
    );
}

#[test]
fn test_on_disk_collision_outside_batch_is_flagged() {
    let dir = tempdir().unwrap();
    // "001.jpg" exists but is not part of the batch
    make_files(dir.path(), &["001.jpg"]);
    let files = make_files(dir.path(), &["a.jpg"]);

    let previews = engine().preview(&files, &counter_plan());
    assert_eq!(previews[0].new_name, "001.jpg");
    assert_eq!(previews[0].conflict, ConflictKind::TargetExists);
    assert!(!previews[0].is_executable());
}

#[test]
fn test_target_owned_by_batch_member_is_not_a_collision() {
    let dir = tempdir().unwrap();
    // b.jpg will take a.jpg's spot? No - but "001.jpg" here IS in the
    // batch, so its name being a target for a.jpg is not an on-disk
    // conflict (it is a duplicate-target conflict instead, since both
    // map through the same counter)
    let files = make_files(dir.path(), &["001.jpg", "a.jpg"]);

    let plan = RenamePlan {
        modules: vec![RenameModule::SpecifiedText {
            text: "001".to_string(),
        }],
        transform: PostTransform::default(),
    };
    let previews = engine().preview(&files, &plan);
    // Both compose to "001.jpg" -> duplicate-in-batch, not target-exists
    assert!(previews
        .iter()
        .all(|p| p.conflict == ConflictKind::DuplicateInBatch));
}

#[test]
fn test_preview_never_touches_the_filesystem() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg", "b.jpg"]);

    engine().preview(&files, &counter_plan());

    let mut listing: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    listing.sort();
    assert_eq!(listing, vec!["a.jpg", "b.jpg"]);
}
