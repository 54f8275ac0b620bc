//! Exactly-three candidate extraction.
//!
//! Hook and CTA generation share a hard shape contract: the model must
//! produce three lines matching `HOOK N: <title> - <body>` (or `CTA N:`).
//! Anything short of three parseable candidates is a failed attempt; the
//! engine reissues the request a bounded number of times and then fails
//! the turn rather than accepting a short list.

use std::sync::OnceLock;

use regex::Regex;

use loom_domain::session::Candidate;

/// Which candidate family a generation turn is extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Hook,
    Cta,
}

impl CandidateKind {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateKind::Hook => "HOOK",
            CandidateKind::Cta => "CTA",
        }
    }
}

fn hook_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*HOOK\s*([123])\s*:\s*(.+)$").expect("static pattern"))
}

fn cta_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*CTA\s*([123])\s*:\s*(.+)$").expect("static pattern"))
}

/// Extract candidates from one model reply, in slot order 1..3.
///
/// A line without the ` - ` title/body separator is skipped; duplicate
/// slot numbers keep the first occurrence. The result has exactly three
/// entries only when all three slots parsed.
pub fn parse_candidates(kind: CandidateKind, raw: &str) -> Vec<Candidate> {
    let pattern = match kind {
        CandidateKind::Hook => hook_pattern(),
        CandidateKind::Cta => cta_pattern(),
    };

    let mut slots: [Option<Candidate>; 3] = [None, None, None];
    for captures in pattern.captures_iter(raw) {
        let slot = captures[1].parse::<usize>().expect("pattern digit") - 1;
        if slots[slot].is_some() {
            continue;
        }
        let rest = captures[2].trim();
        let Some((title, body)) = rest.split_once(" - ") else {
            continue;
        };
        let (title, body) = (title.trim(), body.trim());
        if title.is_empty() || body.is_empty() {
            continue;
        }
        slots[slot] = Some(Candidate {
            title: title.to_owned(),
            body: body.to_owned(),
        });
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_HOOKS: &str = "\
HOOK 1: The Return - Coming home after eight years away.
HOOK 2: The Place - Scott's Addition rewires its evenings.
HOOK 3: The Stakes - What a city owes the people who build in it.";

    #[test]
    fn parses_exactly_three_hooks() {
        let candidates = parse_candidates(CandidateKind::Hook, THREE_HOOKS);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].title, "The Return");
        assert_eq!(candidates[2].body, "What a city owes the people who build in it.");
    }

    #[test]
    fn chatter_around_the_list_is_ignored() {
        let raw = format!("Sure! Here are your options:\n\n{THREE_HOOKS}\n\nLet me know!");
        assert_eq!(parse_candidates(CandidateKind::Hook, &raw).len(), 3);
    }

    #[test]
    fn two_hooks_is_a_short_list() {
        let raw = "\
HOOK 1: The Return - Coming home.
HOOK 2: The Place - The neighborhood at dusk.";
        assert_eq!(parse_candidates(CandidateKind::Hook, raw).len(), 2);
    }

    #[test]
    fn missing_separator_drops_the_line() {
        let raw = "\
HOOK 1: The Return - Coming home.
HOOK 2: no separator on this one
HOOK 3: The Stakes - What the city owes.";
        let candidates = parse_candidates(CandidateKind::Hook, raw);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].title, "The Stakes");
    }

    #[test]
    fn duplicate_slots_keep_the_first() {
        let raw = "\
HOOK 1: First - one.
HOOK 1: Second - two.
HOOK 2: Third - three.
HOOK 3: Fourth - four.";
        let candidates = parse_candidates(CandidateKind::Hook, raw);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].title, "First");
    }

    #[test]
    fn hooks_do_not_match_cta_lines() {
        assert!(parse_candidates(CandidateKind::Cta, THREE_HOOKS).is_empty());
    }

    #[test]
    fn parses_ctas_with_their_own_label() {
        let raw = "\
CTA 1: Visit - Walk the neighborhood this weekend.
CTA 2: Join - Show up to the next meetup.
CTA 3: Build - Host something of your own.";
        let candidates = parse_candidates(CandidateKind::Cta, raw);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[1].title, "Join");
    }

    #[test]
    fn body_may_contain_further_dashes() {
        let raw = "HOOK 1: Title - body - with - dashes.\nHOOK 2: B - b.\nHOOK 3: C - c.";
        let candidates = parse_candidates(CandidateKind::Hook, raw);
        assert_eq!(candidates[0].body, "body - with - dashes.");
    }
}
