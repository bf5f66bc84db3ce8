//! Lenient parsing of the JSON-mode generation replies.
//!
//! Models wrap JSON in code fences or add prose around it often enough that
//! a strict parse loses useful output. Unparseable text yields empty results.

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// What insight extraction pulled out of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    #[serde(default)]
    pub motivations: Vec<String>,
    #[serde(default)]
    pub key_moments: Vec<String>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.motivations.is_empty() && self.key_moments.is_empty()
    }

    /// Trimmed motivations at least `min_len` characters long.
    pub fn usable_motivations(&self, min_len: usize) -> impl Iterator<Item = &str> {
        self.motivations
            .iter()
            .map(|m| m.trim())
            .filter(move |m| m.chars().count() >= min_len)
    }
}

#[derive(Debug, Deserialize)]
struct MilestoneSuggestions {
    #[serde(default)]
    milestones: Vec<String>,
}

/// Try a direct parse, then the outermost `{...}` slice.
fn parse_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<T>(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<T>(&trimmed[start..=end]).ok()
}

pub fn parse_insights(text: &str) -> Insights {
    match parse_object::<Insights>(text) {
        Some(insights) => insights,
        None => {
            tracing::debug!("Could not parse insights response: {}", text.trim());
            Insights::default()
        }
    }
}

/// Milestone titles from `{"milestones": [...]}` or a bare string array.
/// Blank titles are dropped.
pub fn parse_milestone_titles(text: &str) -> Vec<String> {
    let titles = if let Some(parsed) = parse_object::<MilestoneSuggestions>(text) {
        parsed.milestones
    } else {
        let trimmed = text.trim();
        match (trimmed.find('['), trimmed.rfind(']')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<Vec<String>>(&trimmed[start..=end]).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    };

    titles
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_insights() {
        let json = r#"{"motivations": ["Stay healthy for my kids"], "keyMoments": ["Ran first 5k"]}"#;
        let insights = parse_insights(json);
        assert_eq!(insights.motivations, vec!["Stay healthy for my kids"]);
        assert_eq!(insights.key_moments, vec!["Ran first 5k"]);
    }

    #[test]
    fn test_parse_fenced_insights() {
        let text = "```json\n{\"motivations\": [\"Feel confident\"]}\n```";
        let insights = parse_insights(text);
        assert_eq!(insights.motivations, vec!["Feel confident"]);
        assert!(insights.key_moments.is_empty());
    }

    #[test]
    fn test_garbage_insights_are_empty() {
        assert!(parse_insights("Sorry, I can't help with that.").is_empty());
        assert!(parse_insights("} nonsense {").is_empty());
    }

    #[test]
    fn test_usable_motivations_filters_short() {
        let insights = Insights {
            motivations: vec!["ok".into(), "  Be a role model  ".into(), "".into()],
            key_moments: vec![],
        };
        let kept: Vec<&str> = insights.usable_motivations(3).collect();
        assert_eq!(kept, vec!["Be a role model"]);
    }

    #[test]
    fn test_parse_milestone_object() {
        let json = r#"{"milestones": ["Run 2k", " ", "Run 5k"]}"#;
        assert_eq!(parse_milestone_titles(json), vec!["Run 2k", "Run 5k"]);
    }

    #[test]
    fn test_parse_milestone_bare_array() {
        let text = "Here you go:\n[\"Buy shoes\", \"Join a club\"]";
        assert_eq!(parse_milestone_titles(text), vec!["Buy shoes", "Join a club"]);
    }

    #[test]
    fn test_parse_milestone_garbage() {
        assert!(parse_milestone_titles("no json here").is_empty());
    }
}
