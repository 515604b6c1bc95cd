use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mediasort_core::{
    BatchSummary, ErrorKind, MediaType, OperationResult, OperationStatus, ParsedIdentity, ResolvedMatch,
};
use mediasort_organizer::{ConflictMode, OrganizeOptions, Organizer, cleanup_empty_dirs};

fn movie(title: &str, year: Option<u16>) -> ResolvedMatch {
    ResolvedMatch {
        identity: ParsedIdentity {
            title: title.into(),
            season: 1,
            episode: None,
            year: None,
            is_movie: true,
            raw_filename: "video.mkv".into(),
            low_confidence: false,
        },
        external_id: "372058".into(),
        media_type: MediaType::Movie,
        display_title: title.into(),
        release_year: year,
        season_count: None,
        episode_title: None,
        confidence: 0.95,
    }
}

fn episode(title: &str, season: u32, ep: u32) -> ResolvedMatch {
    ResolvedMatch {
        identity: ParsedIdentity {
            title: title.into(),
            season,
            episode: Some(ep),
            year: None,
            is_movie: false,
            raw_filename: format!("{title} - {ep:02}.mkv"),
            low_confidence: false,
        },
        external_id: "1429".into(),
        media_type: MediaType::Tv,
        display_title: title.into(),
        release_year: Some(2013),
        season_count: Some(4),
        episode_title: Some("To You, in 2000 Years".into()),
        confidence: 0.95,
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    source: PathBuf,
    library: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("downloads");
        let library = tmp.path().join("library");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&library).unwrap();
        Self {
            _tmp: tmp,
            source,
            library,
        }
    }

    fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    fn options(&self) -> OrganizeOptions {
        OrganizeOptions {
            library_root: self.library.clone(),
            ..OrganizeOptions::default()
        }
    }

    fn organizer(&self) -> Organizer {
        Organizer::new(self.options())
    }
}

fn target(result: &OperationResult) -> &Path {
    result.target_path.as_deref().unwrap()
}

#[tokio::test]
async fn movie_lands_in_title_year_directory() {
    let fx = Fixture::new();
    let src = fx.file("video.mkv", "movie");

    let result = fx.organizer().plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(target(&result), fx.library.join("Your Name (2016)/video.mkv"));
    assert!(!src.exists());
    assert_eq!(fs::read_to_string(target(&result)).unwrap(), "movie");
    assert_eq!(result.moves.len(), 1);
}

#[tokio::test]
async fn existing_target_gets_numbered_suffix() {
    let fx = Fixture::new();
    let dir = fx.library.join("Your Name (2016)");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("video.mkv"), "already here").unwrap();
    let src = fx.file("video.mkv", "incoming");

    let result = fx.organizer().plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(target(&result), dir.join("video (1).mkv"));
    assert_eq!(fs::read_to_string(dir.join("video.mkv")).unwrap(), "already here");
    assert_eq!(fs::read_to_string(dir.join("video (1).mkv")).unwrap(), "incoming");
}

#[tokio::test]
async fn overwrite_mode_replaces_existing_target() {
    let fx = Fixture::new();
    let dir = fx.library.join("Your Name (2016)");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("video.mkv"), "old").unwrap();
    let src = fx.file("video.mkv", "new");

    let organizer = Organizer::new(OrganizeOptions {
        conflict_mode: ConflictMode::Overwrite,
        ..fx.options()
    });
    let result = organizer.plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(target(&result), dir.join("video.mkv"));
    assert_eq!(fs::read_to_string(dir.join("video.mkv")).unwrap(), "new");
}

#[tokio::test]
async fn companion_keeps_language_suffix() {
    let fx = Fixture::new();
    let src = fx.file("video.mkv", "movie");
    let sub = fx.file("video.ko.srt", "자막");

    let result = fx.organizer().plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    let dir = fx.library.join("Your Name (2016)");
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.moved_companions, 1);
    assert!(dir.join("video.ko.srt").exists());
    assert!(!sub.exists());
}

#[tokio::test]
async fn companions_follow_a_suffixed_primary() {
    let fx = Fixture::new();
    let dir = fx.library.join("Your Name (2016)");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("video.mkv"), "first").unwrap();
    fs::write(dir.join("video.ko.srt"), "first sub").unwrap();
    let src = fx.file("video.mkv", "second");
    fx.file("video.ko.srt", "second sub");

    let result = fx.organizer().plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(target(&result), dir.join("video (1).mkv"));
    assert_eq!(fs::read_to_string(dir.join("video (1).ko.srt")).unwrap(), "second sub");
    assert_eq!(fs::read_to_string(dir.join("video.ko.srt")).unwrap(), "first sub");
}

#[tokio::test]
async fn rename_files_uses_canonical_names() {
    let fx = Fixture::new();
    let src = fx.file("[Grp] Attack on Titan - 01 [1080p].mkv", "ep");
    fx.file("[Grp] Attack on Titan - 01 [1080p].en.srt", "sub");

    let organizer = Organizer::new(OrganizeOptions {
        rename_files: true,
        ..fx.options()
    });
    let result = organizer.plan_and_move(&src, &episode("Attack on Titan", 1, 1)).await;

    let dir = fx.library.join("Attack on Titan (2013)/Season 1");
    assert_eq!(
        target(&result),
        dir.join("Attack on Titan - S01E01 - To You, in 2000 Years.mkv")
    );
    assert!(dir.join("Attack on Titan - S01E01 - To You, in 2000 Years.en.srt").exists());
}

#[tokio::test]
async fn two_sources_with_the_same_target_both_survive() {
    let fx = Fixture::new();
    let a = fx.file("a/video.mkv", "from a");
    let b = fx.file("b/video.mkv", "from b");
    let organizer = Arc::new(fx.organizer());
    let m = movie("Your Name", Some(2016));

    let (ra, rb) = tokio::join!(organizer.plan_and_move(&a, &m), organizer.plan_and_move(&b, &m));

    assert_eq!(ra.status, OperationStatus::Success);
    assert_eq!(rb.status, OperationStatus::Success);
    assert_ne!(target(&ra), target(&rb));
    let mut contents = vec![
        fs::read_to_string(target(&ra)).unwrap(),
        fs::read_to_string(target(&rb)).unwrap(),
    ];
    contents.sort();
    assert_eq!(contents, vec!["from a", "from b"]);
}

#[tokio::test]
async fn rerun_on_organized_file_is_a_skip() {
    let fx = Fixture::new();
    let src = fx.file("video.mkv", "movie");
    let organizer = fx.organizer();
    let m = movie("Your Name", Some(2016));

    let first = organizer.plan_and_move(&src, &m).await;
    let placed = target(&first).to_path_buf();
    let second = organizer.plan_and_move(&placed, &m).await;

    assert_eq!(second.status, OperationStatus::Skipped);
    assert_eq!(second.error_kind, None);
    assert_eq!(second.message.as_deref(), Some("already_organized"));
    assert!(placed.exists());
    assert!(!placed.with_file_name("video (1).mkv").exists());
}

#[tokio::test]
async fn exhausted_suffixes_fail_with_distinct_kind() {
    let fx = Fixture::new();
    let dir = fx.library.join("Your Name (2016)");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("video.mkv"), "0").unwrap();
    fs::write(dir.join("video (1).mkv"), "1").unwrap();
    fs::write(dir.join("video (2).mkv"), "2").unwrap();
    let src = fx.file("video.mkv", "new");

    let organizer = Organizer::new(OrganizeOptions {
        max_conflict_probe: 2,
        ..fx.options()
    });
    let result = organizer.plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::TargetConflictExhausted));
    assert!(src.exists());
}

#[tokio::test]
async fn companion_without_free_name_is_reported() {
    let fx = Fixture::new();
    let dir = fx.library.join("Your Name (2016)");
    fs::create_dir_all(&dir).unwrap();
    for name in ["video.ko.srt", "video.ko (1).srt", "video.ko (2).srt"] {
        fs::write(dir.join(name), "taken").unwrap();
    }
    let src = fx.file("video.mkv", "movie");
    let sub = fx.file("video.ko.srt", "자막");

    let organizer = Organizer::new(OrganizeOptions {
        max_conflict_probe: 2,
        ..fx.options()
    });
    let result = organizer.plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(target(&result), dir.join("video.mkv"));
    assert_eq!(result.moved_companions, 0);
    assert!(sub.exists());
    assert_eq!(result.companion_errors.len(), 1);
    assert_eq!(result.companion_errors[0].path, sub);
    assert_eq!(result.companion_errors[0].kind, ErrorKind::TargetConflictExhausted);

    let mut summary = BatchSummary::new(1);
    summary.record(&result, 10);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].path, sub);
    assert_eq!(summary.errors[0].kind, ErrorKind::TargetConflictExhausted);
}

#[tokio::test]
async fn insufficient_space_fails_before_moving() {
    let fx = Fixture::new();
    let src = fx.file("video.mkv", "movie");

    let organizer = fx.organizer().with_space_probe(Arc::new(|_: &Path| Some(1024)));
    let result = organizer.plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::InsufficientSpace));
    assert!(src.exists());
}

#[tokio::test]
async fn missing_source_is_reported() {
    let fx = Fixture::new();
    let result = fx
        .organizer()
        .plan_and_move(&fx.source.join("gone.mkv"), &movie("Your Name", Some(2016)))
        .await;
    assert_eq!(result.error_kind, Some(ErrorKind::SourceMissing));
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let fx = Fixture::new();
    let src = fx.file("video.mkv", "movie");
    fx.file("video.en.srt", "sub");

    let organizer = Organizer::new(OrganizeOptions {
        dry_run: true,
        ..fx.options()
    });
    let result = organizer.plan_and_move(&src, &movie("Your Name", Some(2016))).await;

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(target(&result), fx.library.join("Your Name (2016)/video.mkv"));
    assert!(result.moves.is_empty());
    assert!(src.exists());
    assert!(!fx.library.join("Your Name (2016)").exists());
}

#[tokio::test]
async fn undo_restores_original_layout() {
    let fx = Fixture::new();
    let src = fx.file("Show/Season 1/video.mkv", "movie");
    let sub = fx.file("Show/Season 1/video.srt", "sub");
    let organizer = fx.organizer();

    let result = organizer.plan_and_move(&src, &movie("Your Name", Some(2016))).await;
    assert_eq!(result.moves.len(), 2);
    let removed = cleanup_empty_dirs(vec![src.parent().unwrap().to_path_buf()], &[fx.source.clone()]).await;
    assert_eq!(removed, 2);

    let report = organizer.undo(&result.moves).await;
    assert_eq!(report.restored, 2);
    assert!(report.failures.is_empty());
    assert_eq!(fs::read_to_string(&src).unwrap(), "movie");
    assert_eq!(fs::read_to_string(&sub).unwrap(), "sub");

    let again = organizer.undo(&result.moves).await;
    assert_eq!(again.restored, 0);
    assert_eq!(again.failures.len(), 2);
    assert_eq!(again.failures[0].kind, ErrorKind::SourceMissing);
}
