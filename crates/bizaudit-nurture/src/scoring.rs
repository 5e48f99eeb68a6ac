//! Deterministic lead scoring and tagging.
//!
//! score = min(100, 50 + size weight + source weight + 20 if the challenge
//! text is longer than 50 characters). Interactions add a fixed increment and
//! the total is re-clamped to 100.

use std::collections::BTreeSet;

use crate::lead::CompanySize;

pub const BASE_SCORE: u32 = 50;
pub const SCORE_CAP: u32 = 100;
pub const LONG_CHALLENGE_BONUS: u32 = 20;
const LONG_CHALLENGE_CHARS: usize = 50;

pub fn size_weight(size: CompanySize) -> u32 {
    match size {
        CompanySize::Startup => 60,
        CompanySize::Small => 75,
        CompanySize::Medium => 85,
        CompanySize::Large => 95,
    }
}

pub fn source_weight(source: &str) -> u32 {
    match source {
        "free_audit" => 80,
        "referral" => 90,
        "demo_request" => 85,
        "website" => 60,
        "social_media" => 50,
        "newsletter" => 40,
        _ => 30,
    }
}

pub fn initial_score(size: CompanySize, source: &str, challenges: &str) -> u32 {
    let bonus = if challenges.chars().count() > LONG_CHALLENGE_CHARS {
        LONG_CHALLENGE_BONUS
    } else {
        0
    };
    (BASE_SCORE + size_weight(size) + source_weight(source) + bonus).min(SCORE_CAP)
}

/// Score increment for an interaction type.
pub fn interaction_delta(kind: &str) -> u32 {
    match kind {
        "open" => 5,
        "click" => 10,
        "demo-request" => 20,
        _ => 0,
    }
}

pub fn apply_interaction(score: u32, kind: &str) -> u32 {
    score.saturating_add(interaction_delta(kind)).min(SCORE_CAP)
}

/// Challenge keywords and the tag each one adds.
const KEYWORD_TAGS: &[(&str, &str)] = &[
    ("marketing", "marketing"),
    ("social", "social-media"),
    ("seo", "seo"),
    ("website", "web-presence"),
    ("sales", "sales"),
    ("lead", "sales"),
    ("cash flow", "finance"),
    ("accounting", "finance"),
    ("budget", "finance"),
    ("hiring", "operations"),
    ("staff", "operations"),
    ("inventory", "operations"),
    ("customer", "customer-experience"),
    ("review", "customer-experience"),
];

/// Tags from size, source and challenge keywords.
pub fn initial_tags(size: CompanySize, source: &str, challenges: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    tags.insert(format!("size:{}", size.as_str()));
    tags.insert(format!("source:{source}"));
    if matches!(size, CompanySize::Medium | CompanySize::Large) {
        tags.insert("high-value".to_string());
    }

    let text = challenges.to_lowercase();
    for (keyword, tag) in KEYWORD_TAGS {
        if text.contains(keyword) {
            tags.insert((*tag).to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_audit_small_is_capped() {
        // 50 + 75 + 80 = 205 → 100
        assert_eq!(initial_score(CompanySize::Small, "free_audit", ""), 100);
    }

    #[test]
    fn test_every_combination_is_capped() {
        for size in [CompanySize::Startup, CompanySize::Small, CompanySize::Medium, CompanySize::Large] {
            for source in ["free_audit", "referral", "newsletter", "billboard"] {
                assert!(initial_score(size, source, &"x".repeat(80)) <= SCORE_CAP);
            }
        }
    }

    #[test]
    fn test_weights() {
        assert_eq!(size_weight(CompanySize::Large), 95);
        assert_eq!(source_weight("referral"), 90);
        assert_eq!(source_weight("podcast"), 30);
    }

    #[test]
    fn test_interactions_reclamp() {
        assert_eq!(apply_interaction(60, "open"), 65);
        assert_eq!(apply_interaction(60, "click"), 70);
        assert_eq!(apply_interaction(60, "demo-request"), 80);
        assert_eq!(apply_interaction(60, "unsubscribe"), 60);
        assert_eq!(apply_interaction(95, "demo-request"), 100);
        assert_eq!(apply_interaction(100, "click"), 100);
    }

    #[test]
    fn test_tags() {
        let tags = initial_tags(
            CompanySize::Large,
            "referral",
            "Our social media marketing is weak and cash flow is tight",
        );
        for expected in ["size:large", "source:referral", "high-value", "social-media", "marketing", "finance"] {
            assert!(tags.contains(expected), "missing {expected}");
        }
        assert!(!tags.contains("seo"));
    }
}
