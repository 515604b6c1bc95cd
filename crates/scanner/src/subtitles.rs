//! Companion (sidecar subtitle) discovery.
//!
//! Siblings of a media file in its *source* directory are companions when
//! their extension is on the allow-list and their stem matches the media
//! stem under one of three rules:
//!
//! - `Movie.srt`                          exact stem
//! - `Movie.en.srt`, `Movie.en.forced.srt` stem plus language/marker segments
//! - `Movie.1080p.srt`, `Mov.srt`          one stem contains the other at a word boundary
//!
//! Marker segments: `forced`, `sdh`/`hi`/`cc`. A language is any ISO 639-1
//! code or a 3-letter segment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which rule tied a companion to its primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanionRule {
    Exact,
    LanguageSuffix,
    Contains,
}

/// A discovered companion file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub path: PathBuf,
    pub rule: CompanionRule,
    pub language: Option<String>,
    pub forced: bool,
    /// Hearing impaired / SDH.
    pub sdh: bool,
    /// Segment between the media stem and the extension (`".ko"`,
    /// `".en.forced"`), kept when the primary file is renamed.
    pub suffix: String,
}

impl Companion {
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// ISO 639-1 two-letter language codes (common subset for validation).
const LANG_CODES: &[&str] = &[
    "aa", "ab", "af", "ak", "am", "an", "ar", "as", "av", "ay", "az", "ba", "be", "bg", "bh",
    "bi", "bm", "bn", "bo", "br", "bs", "ca", "ce", "ch", "co", "cr", "cs", "cu", "cv", "cy",
    "da", "de", "dv", "dz", "ee", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi", "fj",
    "fo", "fr", "fy", "ga", "gd", "gl", "gn", "gu", "gv", "ha", "he", "hi", "ho", "hr", "ht",
    "hu", "hy", "hz", "ia", "id", "ie", "ig", "ii", "ik", "in", "io", "is", "it", "iu", "ja",
    "jv", "ka", "kg", "ki", "kj", "kk", "kl", "km", "kn", "ko", "kr", "ks", "ku", "kv", "kw",
    "ky", "la", "lb", "lg", "li", "ln", "lo", "lt", "lu", "lv", "mg", "mh", "mi", "mk", "ml",
    "mn", "mr", "ms", "mt", "my", "na", "nb", "nd", "ne", "ng", "nl", "nn", "no", "nr", "nv",
    "ny", "oc", "oj", "om", "or", "os", "pa", "pi", "pl", "ps", "pt", "qu", "rm", "rn", "ro",
    "ru", "rw", "sa", "sc", "sd", "se", "sg", "si", "sk", "sl", "sm", "sn", "so", "sq", "sr",
    "ss", "st", "su", "sv", "sw", "ta", "te", "tg", "th", "ti", "tk", "tl", "tn", "to", "tr",
    "ts", "tt", "tw", "ty", "ug", "uk", "ur", "uz", "ve", "vi", "vo", "wa", "wo", "xh", "yi",
    "yo", "za", "zh", "zu",
    // common non-ISO tags seen in release names
    "jp", "kr", "cn", "tw",
];

fn is_lang_code(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    LANG_CODES.contains(&lower.as_str())
        || (lower.len() == 3 && lower.chars().all(|c| c.is_ascii_alphabetic()))
}

fn is_marker(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "forced" | "sdh" | "hi" | "cc"
    )
}

/// Parse language/forced/SDH markers out of the dot-separated segments in
/// `extra` (e.g. `".en.forced"`).
fn parse_sub_markers(extra: &str) -> (Option<String>, bool, bool) {
    let mut language = None;
    let mut forced = false;
    let mut sdh = false;

    for part in extra.split(['.', '_', '-', ' ']).filter(|s| !s.is_empty()) {
        let lower = part.to_ascii_lowercase();
        if lower == "forced" {
            forced = true;
        } else if lower == "sdh" || lower == "cc" || (lower == "hi" && language.is_some()) {
            sdh = true;
        } else if is_lang_code(part) && language.is_none() {
            language = Some(lower);
        }
    }

    (language, forced, sdh)
}

/// `needle` occurs in `hay` with no alphanumeric character on either side.
fn contains_at_boundary(hay: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let hay_l = hay.to_lowercase();
    let needle_l = needle.to_lowercase();
    hay_l.match_indices(&needle_l).any(|(start, m)| {
        let before = hay_l[..start].chars().next_back();
        let after = hay_l[start + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Match a candidate stem against the media stem.
fn classify(media_stem: &str, sub_stem: &str) -> Option<(CompanionRule, String)> {
    if sub_stem == media_stem {
        return Some((CompanionRule::Exact, String::new()));
    }

    if let Some(extra) = sub_stem.strip_prefix(media_stem) {
        if extra.starts_with('.') {
            let segments: Vec<&str> = extra.split('.').filter(|s| !s.is_empty()).collect();
            if !segments.is_empty()
                && segments.iter().all(|s| is_lang_code(s) || is_marker(s))
                && segments.iter().any(|s| is_lang_code(s))
            {
                return Some((CompanionRule::LanguageSuffix, extra.to_string()));
            }
        }
    }

    if contains_at_boundary(sub_stem, media_stem) {
        let suffix = sub_stem
            .strip_prefix(media_stem)
            .map(str::to_string)
            .unwrap_or_default();
        return Some((CompanionRule::Contains, suffix));
    }
    if contains_at_boundary(media_stem, sub_stem) {
        return Some((CompanionRule::Contains, String::new()));
    }
    None
}

/// Discover companion files for a media file, restricted to `allowed_exts`
/// (lowercase, no dot). Sorted by path; never includes the media file itself.
pub fn discover_companions(media_path: &Path, allowed_exts: &[String]) -> Vec<Companion> {
    let parent = match media_path.parent() {
        Some(p) => p,
        None => return Vec::new(),
    };

    let media_stem = match media_path.file_stem().and_then(|s| s.to_str()) {
        Some(s) => s.to_string(),
        None => return Vec::new(),
    };

    let entries = match std::fs::read_dir(parent) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut results = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path == media_path || !path.is_file() {
            continue;
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(e) => e.to_ascii_lowercase(),
            None => continue,
        };
        if !allowed_exts.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            continue;
        }

        let sub_stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };

        let Some((rule, suffix)) = classify(&media_stem, &sub_stem) else {
            continue;
        };

        let extra = sub_stem.strip_prefix(&media_stem).unwrap_or(&sub_stem);
        let (language, forced, sdh) = if rule == CompanionRule::Exact {
            (None, false, false)
        } else {
            parse_sub_markers(extra)
        };

        debug!(media = %media_path.display(), companion = %path.display(), ?rule, "companion found");
        results.push(Companion {
            path,
            rule,
            language,
            forced,
            sdh,
            suffix,
        });
    }

    results.sort_by(|a, b| a.path.cmp(&b.path));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts() -> Vec<String> {
        crate::parser::SUBTITLE_EXTENSIONS
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn classify_rules() {
        assert_eq!(classify("video", "video"), Some((CompanionRule::Exact, String::new())));
        assert_eq!(
            classify("video", "video.ko"),
            Some((CompanionRule::LanguageSuffix, ".ko".into()))
        );
        assert_eq!(
            classify("video", "video.en.forced"),
            Some((CompanionRule::LanguageSuffix, ".en.forced".into()))
        );
        assert_eq!(
            classify("video", "video.1080p"),
            Some((CompanionRule::Contains, ".1080p".into()))
        );
        assert_eq!(
            classify("[Grp] Show - 01 [1080p]", "Show - 01"),
            Some((CompanionRule::Contains, String::new()))
        );
        assert_eq!(classify("Show - 01", "Show - 010"), None);
        assert_eq!(classify("video", "other"), None);
    }

    #[test]
    fn parse_markers() {
        assert_eq!(parse_sub_markers(".en"), (Some("en".into()), false, false));
        assert_eq!(parse_sub_markers(".en.forced"), (Some("en".into()), true, false));
        assert_eq!(parse_sub_markers(".en.sdh"), (Some("en".into()), false, true));
        assert_eq!(parse_sub_markers(""), (None, false, false));
    }

    #[test]
    fn discovers_companions_in_source_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();

        let media = dir.join("video.mkv");
        fs::write(&media, "fake video").unwrap();
        fs::write(dir.join("video.ko.srt"), "ko").unwrap();
        fs::write(dir.join("video.srt"), "plain").unwrap();
        fs::write(dir.join("video.en.forced.ass"), "forced").unwrap();
        fs::write(dir.join("video.nfo"), "not allowed").unwrap();
        fs::write(dir.join("other.en.srt"), "not ours").unwrap();

        let found = discover_companions(&media, &exts());
        let names: Vec<_> = found
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["video.en.forced.ass", "video.ko.srt", "video.srt"]);

        let ko = &found[1];
        assert_eq!(ko.rule, CompanionRule::LanguageSuffix);
        assert_eq!(ko.language.as_deref(), Some("ko"));
        assert_eq!(ko.suffix, ".ko");
        assert_eq!(ko.extension(), Some("srt"));

        assert!(found[0].forced);
        assert_eq!(found[2].rule, CompanionRule::Exact);
    }

    #[test]
    fn allow_list_is_respected() {
        let tmp = tempfile::tempdir().unwrap();
        let media = tmp.path().join("video.mkv");
        fs::write(&media, "v").unwrap();
        fs::write(tmp.path().join("video.srt"), "s").unwrap();
        fs::write(tmp.path().join("video.ass"), "a").unwrap();

        let found = discover_companions(&media, &["ass".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extension(), Some("ass"));
    }
}
