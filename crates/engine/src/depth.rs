//! Depth-score parsing.
//!
//! The scoring rubric lives in the depth-analysis prompt; this parser only
//! reads the answer back. It is deliberately tolerant: a missing or
//! malformed score is treated as insufficient with score 0, so a confused
//! model routes the writer to a follow-up question instead of failing the
//! turn.

use std::sync::OnceLock;

use regex::Regex;

use loom_domain::session::{DepthAssessment, DepthClass};

fn score_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*score\s*:\s*([0-9]+(?:\.[0-9]+)?)").expect("static pattern")
    })
}

/// Parse the model's depth reply into an assessment, classifying against
/// the configured threshold.
pub fn parse_depth(raw: &str, threshold: f32) -> DepthAssessment {
    let score = score_pattern()
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|s| s.clamp(0.0, 5.0))
        .unwrap_or(0.0);

    let classification = if score >= threshold {
        DepthClass::Sufficient
    } else {
        DepthClass::Insufficient
    };

    DepthAssessment {
        score,
        classification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_score_and_classifies_against_threshold() {
        let raw = "SCORE: 4.3\nCLASSIFICATION: sufficient";
        let depth = parse_depth(raw, 3.0);
        assert!((depth.score - 4.3).abs() < f32::EPSILON);
        assert_eq!(depth.classification, DepthClass::Sufficient);
    }

    #[test]
    fn low_score_is_insufficient() {
        let depth = parse_depth("SCORE: 2.1\nCLASSIFICATION: insufficient", 3.0);
        assert!((depth.score - 2.1).abs() < f32::EPSILON);
        assert_eq!(depth.classification, DepthClass::Insufficient);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(
            parse_depth("SCORE: 3.0", 3.0).classification,
            DepthClass::Sufficient
        );
    }

    #[test]
    fn score_drives_routing_even_when_the_token_disagrees() {
        // The numeric score is authoritative; the classification token is
        // advisory model output.
        let depth = parse_depth("SCORE: 1.0\nCLASSIFICATION: sufficient", 3.0);
        assert_eq!(depth.classification, DepthClass::Insufficient);
    }

    #[test]
    fn missing_score_degrades_to_zero() {
        let depth = parse_depth("this idea is wonderful", 3.0);
        assert_eq!(depth.score, 0.0);
        assert_eq!(depth.classification, DepthClass::Insufficient);
    }

    #[test]
    fn malformed_score_degrades_to_zero() {
        let depth = parse_depth("SCORE: plenty", 3.0);
        assert_eq!(depth.score, 0.0);
        assert_eq!(depth.classification, DepthClass::Insufficient);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        assert_eq!(parse_depth("SCORE: 11.0", 3.0).score, 5.0);
    }

    #[test]
    fn score_found_anywhere_in_the_reply() {
        let raw = "Here is my judgment.\n\nscore: 3.5\nclassification: sufficient\n";
        assert!((parse_depth(raw, 3.0).score - 3.5).abs() < f32::EPSILON);
    }
}
