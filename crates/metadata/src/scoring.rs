//! Candidate scoring.
//!
//! `score = similarity * w_sim + class_bonus + popularity_bonus`, clamped to
//! `[0, 1]`. Similarity is the better of the candidate's display and
//! original titles. The class bonus is awarded once when the candidate's
//! genres intersect the expected set or its media type matches what the
//! filename implies. Popularity contributes linearly up to a cap.

use std::collections::HashSet;

use mediasort_core::{MediaType, ParsedIdentity};
use serde::{Deserialize, Serialize};

use crate::provider::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub class_bonus: f64,
    pub popularity_bonus: f64,
    /// Popularity at which the full popularity bonus is reached.
    pub popularity_scale: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.8,
            class_bonus: 0.1,
            popularity_bonus: 0.1,
            popularity_scale: 100.0,
        }
    }
}

/// A supported candidate with its score and original provider position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub media_type: MediaType,
    pub score: f64,
    pub rank: usize,
}

/// Lowercase, replace punctuation with spaces, collapse whitespace.
fn normalize_for_match(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity of two titles in `[0, 1]`: the better of a token-sorted edit
/// ratio and token-set overlap, so reordered or abbreviated titles still
/// score. Symmetric.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_match(a);
    let b = normalize_for_match(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let mut ta: Vec<&str> = a.split(' ').collect();
    let mut tb: Vec<&str> = b.split(' ').collect();
    ta.sort_unstable();
    tb.sort_unstable();
    let sorted = strsim::normalized_levenshtein(&ta.join(" "), &tb.join(" "));

    let sa: HashSet<&str> = ta.into_iter().collect();
    let sb: HashSet<&str> = tb.into_iter().collect();
    let union = sa.union(&sb).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        sa.intersection(&sb).count() as f64 / union as f64
    };

    sorted.max(jaccard)
}

pub fn score(
    identity: &ParsedIdentity,
    candidate: &Candidate,
    media_type: MediaType,
    weights: &ScoringWeights,
    expected_genres: &[u32],
) -> f64 {
    let mut similarity = title_similarity(&identity.title, &candidate.title);
    if let Some(original) = &candidate.original_title {
        similarity = similarity.max(title_similarity(&identity.title, original));
    }

    let genre_hit = candidate.genre_ids.iter().any(|g| expected_genres.contains(g));
    let type_hit = identity.expected_media_type() == Some(media_type);
    let class = if genre_hit || type_hit {
        weights.class_bonus
    } else {
        0.0
    };

    let popularity = if weights.popularity_scale > 0.0 {
        (candidate.popularity / weights.popularity_scale).clamp(0.0, 1.0) * weights.popularity_bonus
    } else {
        0.0
    };

    (similarity * weights.similarity + class + popularity).clamp(0.0, 1.0)
}

/// Score and order candidates: score descending, then newer release year,
/// then the provider's own order. Unsupported media types are dropped.
pub fn rank(
    identity: &ParsedIdentity,
    candidates: Vec<Candidate>,
    weights: &ScoringWeights,
    expected_genres: &[u32],
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .enumerate()
        .filter_map(|(rank, candidate)| {
            let media_type = MediaType::from_provider(&candidate.media_type)?;
            let score = score(identity, &candidate, media_type, weights, expected_genres);
            Some(ScoredCandidate {
                candidate,
                media_type,
                score,
                rank,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.candidate.year.cmp(&a.candidate.year))
            .then_with(|| a.rank.cmp(&b.rank))
    });
    scored
}
