use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output styles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The closed set of output-length profiles. Each style fixes the LLM
/// token budget for final assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStyle {
    ShortPost,
    LongPost,
    BlogPost,
}

impl StoryStyle {
    pub const ALL: [StoryStyle; 3] = [
        StoryStyle::ShortPost,
        StoryStyle::LongPost,
        StoryStyle::BlogPost,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            StoryStyle::ShortPost => "short_post",
            StoryStyle::LongPost => "long_post",
            StoryStyle::BlogPost => "blog_post",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoryStyle::ShortPost => "Short post",
            StoryStyle::LongPost => "Long post",
            StoryStyle::BlogPost => "Blog post",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StoryStyle::ShortPost => "A tight social-length story, a few paragraphs at most",
            StoryStyle::LongPost => "A fuller narrative post with room for scene-setting",
            StoryStyle::BlogPost => "A complete blog-length piece with full arc and detail",
        }
    }

    /// Token cap applied to the final-assembly completion call.
    pub fn max_tokens(&self) -> u32 {
        match self {
            StoryStyle::ShortPost => 1024,
            StoryStyle::LongPost => 2048,
            StoryStyle::BlogPost => 4096,
        }
    }
}

impl std::fmt::Display for StoryStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_budgets_match_the_style_table() {
        assert_eq!(StoryStyle::ShortPost.max_tokens(), 1024);
        assert_eq!(StoryStyle::LongPost.max_tokens(), 2048);
        assert_eq!(StoryStyle::BlogPost.max_tokens(), 4096);
    }

    #[test]
    fn styles_round_trip_through_serde() {
        for style in StoryStyle::ALL {
            let json = serde_json::to_string(&style).unwrap();
            assert_eq!(json, format!("\"{}\"", style.id()));
            let back: StoryStyle = serde_json::from_str(&json).unwrap();
            assert_eq!(back, style);
        }
    }

    #[test]
    fn unknown_style_is_rejected() {
        assert!(serde_json::from_str::<StoryStyle>("\"haiku\"").is_err());
    }
}
