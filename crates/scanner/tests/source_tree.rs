//! Scanning a realistic download folder through the public API.

use std::fs;

use mediasort_scanner::parser::SUBTITLE_EXTENSIONS;
use mediasort_scanner::subtitles::{CompanionRule, discover_companions};
use mediasort_scanner::walk::scan_and_parse;

fn allow_list() -> Vec<String> {
    SUBTITLE_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}

#[test]
fn download_folder_yields_identities_and_companions() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("Mushishi")).unwrap();
    for name in [
        "Mushishi/[Grp] Mushishi - 01 [720p].mkv",
        "Mushishi/[Grp] Mushishi - 01 [720p].en.srt",
        "Mushishi/[Grp] Mushishi - 02 [720p].mkv",
        "Your Name (2016).mp4",
        "Your Name (2016).ja.forced.ass",
        "Your Name (2016).nfo",
        "Thumbs.db",
    ] {
        fs::write(root.join(name), name).unwrap();
    }

    let scanned = scan_and_parse(root);
    let summary: Vec<(String, Option<u32>, Option<u16>)> = scanned
        .iter()
        .map(|s| (s.identity.title.clone(), s.identity.episode, s.identity.year))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Mushishi".to_string(), Some(1), None),
            ("Mushishi".to_string(), Some(2), None),
            ("Your Name".to_string(), None, Some(2016)),
        ]
    );

    let ep1 = discover_companions(&scanned[0].entry.path, &allow_list());
    assert_eq!(ep1.len(), 1);
    assert_eq!(ep1[0].rule, CompanionRule::LanguageSuffix);
    assert_eq!(ep1[0].language.as_deref(), Some("en"));

    // episode 2 has no subtitle of its own; episode 1's must not attach to it
    assert!(discover_companions(&scanned[1].entry.path, &allow_list()).is_empty());

    let movie = discover_companions(&scanned[2].entry.path, &allow_list());
    assert_eq!(movie.len(), 1);
    assert!(movie[0].forced);
    assert_eq!(movie[0].suffix, ".ja.forced");
}

#[test]
fn subtitles_alone_are_not_media() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("Show - 01.srt"), "x").unwrap();
    fs::write(tmp.path().join("Show - 01.ass"), "x").unwrap();
    assert!(scan_and_parse(tmp.path()).is_empty());
}
