//! Target path construction.
//!
//! The directory template is split on `/` before substitution so a title
//! can never introduce extra directory levels. Each rendered component is
//! sanitized and capped at `max_name_len` bytes; empty `()`/`[]` left behind
//! by a missing year are dropped. A title that sanitizes to nothing becomes
//! `"Unknown"`.

use std::path::Path;
use std::sync::LazyLock;

use mediasort_core::{MediaType, ResolvedMatch};
use regex::{Captures, Regex};

const UNKNOWN: &str = "Unknown";

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(title|year|type|season)(?::(\d+))?\}").unwrap());

static RE_EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)|\[\s*\]").unwrap());

static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Make `raw` safe as a single path component.
pub fn sanitize_component(raw: &str, max_len: usize) -> String {
    let options = sanitize_filename::Options {
        windows: true,
        truncate: false,
        replacement: "",
    };
    let cleaned = sanitize_filename::sanitize_with_options(raw, options);
    let cleaned = RE_EMPTY_BRACKETS.replace_all(&cleaned, "");
    let cleaned = RE_SPACES.replace_all(cleaned.trim(), " ");

    truncate_bytes(&cleaned, max_len)
        .trim_start_matches(['.', ' '])
        .trim_end_matches(['.', ' '])
        .to_string()
}

fn title_of(m: &ResolvedMatch, max_len: usize) -> String {
    let title = sanitize_component(&m.display_title, max_len);
    if title.is_empty() {
        UNKNOWN.to_string()
    } else {
        title
    }
}

fn year_of(m: &ResolvedMatch) -> Option<u16> {
    m.release_year.or(m.identity.year)
}

fn substitute(segment: &str, title: &str, m: &ResolvedMatch) -> String {
    RE_PLACEHOLDER
        .replace_all(segment, |caps: &Captures| match &caps[1] {
            "title" => title.to_string(),
            "year" => year_of(m).map(|y| y.to_string()).unwrap_or_default(),
            "type" => m.media_type.label().to_string(),
            "season" => {
                let width = caps.get(2).and_then(|w| w.as_str().parse().ok()).unwrap_or(0);
                format!("{:0width$}", m.identity.season)
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Directory components under the library root, season directory included.
pub fn render_dirs(
    path_template: &str,
    season_template: &str,
    m: &ResolvedMatch,
    max_len: usize,
) -> Vec<String> {
    let title = title_of(m, max_len);

    let mut dirs: Vec<String> = path_template
        .split(['/', '\\'])
        .map(|segment| sanitize_component(&substitute(segment, &title, m), max_len))
        .filter(|segment| !segment.is_empty())
        .collect();
    if dirs.is_empty() {
        dirs.push(title.clone());
    }

    if is_series(m) {
        let season = if m.identity.season == 0 {
            "Specials".to_string()
        } else {
            sanitize_component(&substitute(season_template, &title, m), max_len)
        };
        if !season.is_empty() {
            dirs.push(season);
        }
    }
    dirs
}

fn is_series(m: &ResolvedMatch) -> bool {
    m.media_type == MediaType::Tv && !m.identity.is_movie
}

/// Canonical stem used when renaming is enabled. `None` when the match
/// does not carry enough to name the file (a series without an episode).
pub fn canonical_stem(m: &ResolvedMatch, max_len: usize) -> Option<String> {
    let title = title_of(m, max_len);
    let stem = if is_series(m) {
        let episode = m.identity.episode?;
        let mut stem = format!("{title} - S{:02}E{episode:02}", m.identity.season);
        if let Some(ep_title) = m.episode_title.as_deref().filter(|t| !t.trim().is_empty()) {
            stem.push_str(" - ");
            stem.push_str(ep_title);
        }
        stem
    } else {
        match year_of(m) {
            Some(year) => format!("{title} ({year})"),
            None => title,
        }
    };
    Some(stem)
}

/// File name for the primary file at its target.
pub fn primary_file_name(source: &Path, m: &ResolvedMatch, rename: bool, max_len: usize) -> Option<String> {
    let original = source.file_name()?.to_string_lossy().into_owned();
    if !rename {
        return Some(original);
    }

    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    let Some(stem) = canonical_stem(m, max_len) else {
        return Some(original);
    };
    let stem = sanitize_component(&stem, max_len.saturating_sub(ext.len()));
    if stem.is_empty() {
        return Some(original);
    }
    Some(format!("{stem}{ext}"))
}
