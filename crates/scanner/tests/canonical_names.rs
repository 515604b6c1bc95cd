//! Canonical `Title SxxEyy` names round-trip through the parser exactly.

use mediasort_scanner::parse;

#[test]
fn canonical_forms_recover_title_season_episode() {
    let titles = ["Attack on Titan", "The Office", "Show Name", "Doctor Who", "Mob Psycho 100"];
    let separators = [" ", "."];
    let tags = ["", " [1080p]", ".720p.WEB-DL", " [Grp]", ".x265-GROUP"];

    for title in titles {
        for sep in separators {
            for (season, episode) in [(1u32, 1u32), (2, 5), (10, 112)] {
                for tag in tags {
                    let name = format!(
                        "{}{sep}S{season:02}E{episode:02}{tag}.mkv",
                        title.replace(' ', sep)
                    );
                    let p = parse(&name);
                    assert_eq!(p.title, title, "{name}");
                    assert_eq!(p.season, season, "{name}");
                    assert_eq!(p.episode, Some(episode), "{name}");
                    assert!(!p.is_movie, "{name}");
                }
            }
        }
    }
}

#[test]
fn pattern_priority_is_fixed() {
    // S/E form beats every other form present in the same name
    let p = parse("Show 3x04 Season 5 Episode 6 S01E02.mkv");
    assert_eq!((p.season, p.episode), (1, Some(2)));

    // NxM beats the wordy form
    let p = parse("Show Season 5 Episode 6 3x04.mkv");
    assert_eq!((p.season, p.episode), (3, Some(4)));

    // wordy form beats a combined block
    let p = parse("Show - 203 - Season 5 Episode 6.mkv");
    assert_eq!((p.season, p.episode), (5, Some(6)));

    // combined block beats a bare dash number
    let p = parse("Show - 07 - 203 - x.mkv");
    assert_eq!((p.season, p.episode), (2, Some(3)));
}

#[test]
fn trailing_number_has_lowest_priority() {
    // every other form wins over a closing number
    let p = parse("Show S02E03 12.mkv");
    assert_eq!((p.season, p.episode), (2, Some(3)));
    let p = parse("Show - 05 - 12.mkv");
    assert_eq!((p.season, p.episode), (1, Some(5)));
    let p = parse("Show Ep 04 12.mkv");
    assert_eq!((p.season, p.episode), (1, Some(4)));

    // alone it is the episode, and never part of the title
    for (raw, title, episode) in [
        ("Frieren 12.mkv", "Frieren", 12),
        ("[SubsPlease] Frieren 12 [1080p].mkv", "Frieren", 12),
        ("Attack.on.Titan.01.mkv", "Attack on Titan", 1),
        ("One Piece 1071 [720p].mkv", "One Piece 1071", 0),
    ] {
        let p = parse(raw);
        assert_eq!(p.title, title, "{raw}");
        let expected = (episode > 0).then_some(episode);
        assert_eq!(p.episode, expected, "{raw}");
    }
}
