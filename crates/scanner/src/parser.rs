//! Filename parser.
//!
//! Stages run in a fixed order and each one strips what it recognised from
//! the remainder handed to the next:
//!
//! 1. extension
//! 2. bracketed release-group / tag blocks (`[...]`, `{...}`, non-year `(...)`)
//! 3. resolution, codec, audio and source tokens
//! 4. season/episode, first matching pattern wins
//! 5. year, bracketed first, then a bare delimited year
//! 6. movie / special-edition keywords
//! 7. punctuation and whitespace collapse → title
//!
//! Pattern priority in stage 4 is part of the contract: an explicit
//! `S01E02` always beats `1x02`, which beats `Season 1 Episode 2`, then the
//! combined ` - 102 - ` block, then `E02`/`Ep 02`, then a bare ` - 02`,
//! and last a trailing number (`Frieren 12`).

use mediasort_core::ParsedIdentity;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

// Patterns to ignore
static IGNORE_NAMES: &[&str] = &[
    ".DS_Store",
    "Thumbs.db",
    "@eaDir",
    ".nfo",
    ".txt",
    ".jpg",
    ".jpeg",
    ".png",
    ".part",
    ".!qb",
];

pub static VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "flv", "webm", "ts", "m2ts", "mts", "mpg", "mpeg",
    "mpe", "mpv", "3gp", "3g2", "ogv", "vob", "mxf", "f4v", "asf", "rmvb",
];

pub static SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "idx", "smi", "vtt", "sup"];

static RE_TAG_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\{[^}]*\}|\([^)]*\)").unwrap());

static RE_YEAR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\(\[]\s*(?:19|20)\d{2}\s*[\)\]]$").unwrap());

static RE_QUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:480p|576p|720p|1080[pi]|2160p|4k|uhd|x26[45]|h\.?26[45]|hevc|avc|xvid|divx|10-?bit|8-?bit|hdr10\+?|hdr|aac(?:2\.0)?|e?ac3|dts(?:-hd)?|truehd|flac|opus|mp3|ddp?5\.1|5\.1|2\.0|blu-?ray|bdrip|brrip|bd|web-?dl|webrip|hdtv|dvdrip|remux|proper|repack)\b",
    )
    .unwrap()
});

/// Which stage-4 pattern recognised the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePattern {
    SeasonEpisode,
    CrossFormat,
    SeasonEpisodeWords,
    CombinedBlock,
    ExplicitEpisode,
    BareEpisode,
    /// `Frieren 12`: a 1-3 digit number closing the name. Four digits never
    /// match, so years are left for stage 5.
    TrailingNumber,
}

static EPISODE_PATTERNS: LazyLock<Vec<(EpisodePattern, Regex)>> = LazyLock::new(|| {
    vec![
        (
            EpisodePattern::SeasonEpisode,
            Regex::new(r"(?i)\bS(\d{1,2})\s*E(\d{1,3})(?:-?E\d{1,3})*\b").unwrap(),
        ),
        (
            EpisodePattern::CrossFormat,
            Regex::new(r"(?i)\b(\d{1,2})x(\d{2,3})\b").unwrap(),
        ),
        (
            EpisodePattern::SeasonEpisodeWords,
            Regex::new(r"(?i)\bSeason\s*(\d{1,2})\s*(?:Episode|Ep\.?)\s*(\d{1,3})\b").unwrap(),
        ),
        (
            EpisodePattern::CombinedBlock,
            Regex::new(r"-\s*(\d{1,2})(\d{2})\s*-").unwrap(),
        ),
        (
            EpisodePattern::ExplicitEpisode,
            Regex::new(r"(?i)\b(?:Episode|Ep|E)\s*\.?\s*(\d{1,3})(?:v\d+)?\b").unwrap(),
        ),
        (
            EpisodePattern::BareEpisode,
            Regex::new(r"(?:^|\s)-\s*(\d{1,3})(?:v\d+)?(?:\s|$)").unwrap(),
        ),
        (
            EpisodePattern::TrailingNumber,
            Regex::new(r"(?:^|[\s._])(\d{1,3})(?:v\d+)?[\s._-]*$").unwrap(),
        ),
    ]
});

static RE_YEAR_BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\(\[]\s*((?:19|20)\d{2})\s*[\)\]]").unwrap());

static RE_YEAR_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s._-])((?:19|20)\d{2})\b").unwrap());

static RE_MOVIE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:the\s+)?(?:movie|film|theatrical|gekijouban|ova|special)\b").unwrap()
});

static RE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[._\-\[\](){},;~+|]+").unwrap());

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Check if a filename should be ignored.
pub fn should_ignore(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    IGNORE_NAMES
        .iter()
        .any(|pat| lower == pat.to_lowercase() || lower.ends_with(&pat.to_lowercase()))
}

/// Check if a file has a video extension.
pub fn is_video_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

fn has_known_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&lower.as_str())
        || SUBTITLE_EXTENSIONS.contains(&lower.as_str())
        || matches!(lower.as_str(), "nfo" | "txt" | "part")
}

/// Replace separator runs with single spaces and trim.
fn clean_title(raw: &str) -> String {
    let spaced = RE_SEPARATORS.replace_all(raw, " ");
    RE_WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

fn cut(text: &str, start: usize, end: usize) -> String {
    format!("{} {}", &text[..start], &text[end..])
}

struct EpisodeHit {
    pattern: EpisodePattern,
    season: Option<u32>,
    episode: u32,
    start: usize,
    end: usize,
}

fn find_episode(rem: &str) -> Option<EpisodeHit> {
    for (kind, re) in EPISODE_PATTERNS.iter() {
        for caps in re.captures_iter(rem) {
            let Some(whole) = caps.get(0) else { continue };
            if *kind == EpisodePattern::TrailingNumber
                && clean_title(&rem[..whole.start()]).is_empty()
            {
                // the number is the whole title ("24", "100")
                continue;
            }
            let (season, episode) = if caps.len() == 3 {
                let season: u32 = caps[1].parse().ok()?;
                let episode: u32 = caps[2].parse().ok()?;
                if *kind == EpisodePattern::CombinedBlock {
                    // "- 2016 -" is a year, not season 20 episode 16
                    let combined: u32 = format!("{}{}", &caps[1], &caps[2]).parse().ok()?;
                    if (1900..=2099).contains(&combined) {
                        continue;
                    }
                }
                (Some(season), episode)
            } else {
                (None, caps[1].parse().ok()?)
            };
            return Some(EpisodeHit {
                pattern: *kind,
                season,
                episode,
                start: whole.start(),
                end: whole.end(),
            });
        }
    }
    None
}

/// `keep_title` refuses a bare year that is the only thing left in `text`.
fn find_year(text: &str, keep_title: bool) -> Option<(u16, usize, usize)> {
    if let Some(caps) = RE_YEAR_BRACKETED.captures(text) {
        let whole = caps.get(0)?;
        return Some((caps[1].parse().ok()?, whole.start(), whole.end()));
    }
    // Last bare year wins: "Blade.Runner.2049.2017" is a 2017 release.
    let caps = RE_YEAR_BARE.captures_iter(text).last()?;
    let year = caps.get(1)?;
    let without = cut(text, year.start(), year.end());
    if keep_title && clean_title(&without).is_empty() {
        // The number is the whole title ("1917", "2012").
        return None;
    }
    Some((year.as_str().parse().ok()?, year.start(), year.end()))
}

/// Parse a raw filename (or path) into an identity guess.
///
/// Total: any input yields a [`ParsedIdentity`]. Input the parser cannot make
/// sense of comes back with the raw stem as title and `low_confidence` set.
pub fn parse(raw: &str) -> ParsedIdentity {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw);

    // 1. extension
    let stem = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && has_known_extension(ext) => stem,
        _ => name,
    };

    // 2. tag blocks; a bracketed year survives for stage 5
    let mut rem = RE_TAG_BLOCK
        .replace_all(stem, |caps: &regex::Captures| {
            if RE_YEAR_ONLY.is_match(&caps[0]) {
                caps[0].to_string()
            } else {
                " ".to_string()
            }
        })
        .into_owned();

    // 3. quality/codec tokens
    rem = RE_QUALITY.replace_all(&rem, " ").into_owned();

    // 4. season/episode; text after the match is never part of the title
    let mut season = None;
    let mut episode = None;
    let mut tail = String::new();
    if let Some(hit) = find_episode(&rem) {
        debug!(raw, pattern = ?hit.pattern, "episode pattern matched");
        season = hit.season;
        episode = Some(hit.episode);
        let head = rem[..hit.start].to_string();
        let after = rem[hit.end..].to_string();
        if clean_title(&head).is_empty() {
            rem = after;
        } else {
            rem = head;
            tail = after;
        }
    }

    // 5. year, searched in the title part first and then past the episode
    let mut year = None;
    if let Some((y, start, end)) = find_year(&rem, true) {
        year = Some(y);
        rem = cut(&rem, start, end);
    } else if let Some((y, _, _)) = find_year(&tail, false) {
        year = Some(y);
    }

    // 6. movie keywords
    let is_movie = RE_MOVIE_KEYWORD.is_match(&rem);
    if is_movie {
        let stripped = RE_MOVIE_KEYWORD.replace_all(&rem, " ").into_owned();
        if !clean_title(&stripped).is_empty() {
            rem = stripped;
        }
    }

    // 7. title
    let title = clean_title(&rem);
    if title.is_empty() || !title.chars().any(char::is_alphanumeric) {
        let fallback = [clean_title(stem), stem.trim().to_string(), raw.trim().to_string()]
            .into_iter()
            .find(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        warn!(raw, title = %fallback, "low-confidence parse, using raw stem as title");
        let mut identity = ParsedIdentity::fallback(raw, fallback);
        identity.year = year;
        if !is_movie {
            identity.episode = episode;
            identity.season = season.unwrap_or(1);
        }
        return identity;
    }

    ParsedIdentity {
        title,
        season: if is_movie { 1 } else { season.unwrap_or(1) },
        episode: if is_movie { None } else { episode },
        year,
        is_movie,
        raw_filename: raw.to_string(),
        low_confidence: false,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
