//! Prompt text and fallback strings for the Miles persona.

use miles_core::{Conversation, Goal, Motivation};
use std::fmt::Write;

pub const PERSONA: &str = r#"You are Miles, an AI coach.
Your job is to help the user reach their goals through supportive, personal coaching.

Personality:
- Supportive and encouraging: celebrate effort and wins of any size, and encourage during setbacks.
- Empathetic: acknowledge feelings and validate them without getting sentimental.
- Optimistic: keep a hopeful view of the user's goals and reframe setbacks as learning.
- Friendly: warm, slightly informal, like a trusted friend. Never robotic.
- Patient and non-judgmental, whatever the user's progress.
- Curious: ask relevant questions about goals, progress and well-being.
- Respectful of boundaries: don't ask for personal details the coaching doesn't need.

Style:
- Clear, simple, positive language with contractions ("you're", "let's").
- No jargon or clinical terms. Light humor only, never sarcasm.
- Keep replies short (under 100 tokens when possible).

Boundaries:
- You are not a therapist, and not a financial, medical or legal advisor.
- You are not a general knowledge source outside coaching.
- Never promise what you can't deliver.

Always ground your replies in the user's stored goals and motivations. Never invent goals or facts about the user."#;

pub const WELCOME_MESSAGE: &str = "Hi there! I'm Miles, your personal AI coach. I'm here to help you achieve your goals and provide the support you need along the way. How can I assist you today?";

// ============================================================================
// Fallbacks
// ============================================================================

pub const FALLBACK_OFFLINE_REPLY: &str = "I'm here to help you achieve your goals! However, I'm currently experiencing some technical difficulties. Please try again in a moment.";

pub const FALLBACK_ERROR_REPLY: &str =
    "I apologize, but I'm experiencing some technical difficulties. Please try again in a moment.";

pub const FALLBACK_EMPTY_REPLY: &str =
    "I apologize, but I'm unable to provide a response at the moment.";

pub const FALLBACK_TIP: &str =
    "Remember that progress isn't always linear. Celebrate your effort today!";

pub const FALLBACK_EMPTY_TIP: &str = "Keep pushing forward. Every small step counts!";

pub const FALLBACK_MILESTONES: [&str; 4] = [
    "Start with a small daily habit",
    "Track progress weekly",
    "Increase difficulty gradually",
    "Celebrate first major achievement",
];

pub fn fallback_milestones() -> Vec<String> {
    FALLBACK_MILESTONES.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Builders
// ============================================================================

/// Persona plus the user's goals and motivations as plain text.
pub fn chat_system_prompt(goals: &[Goal], motivations: &[Motivation]) -> String {
    let mut prompt = PERSONA.to_string();

    if !goals.is_empty() {
        prompt.push_str("\n\nUser Goals:");
        for goal in goals {
            let _ = write!(prompt, "\n- {} (Progress: {}%)", goal.title, goal.progress);
            if !goal.milestones.is_empty() {
                prompt.push_str("\n  Milestones:");
                for m in &goal.milestones {
                    if m.completed {
                        let _ = write!(prompt, "\n  - {} (Completed)", m.title);
                    } else {
                        let _ = write!(prompt, "\n  - {} (Progress: {}%)", m.title, m.progress);
                    }
                }
            }
        }
    }

    if !motivations.is_empty() {
        prompt.push_str("\n\nUser Motivations:");
        for m in motivations {
            let _ = write!(prompt, "\n- {}", m.text);
        }
    }

    prompt
}

pub fn insights_prompt(conversation: &Conversation) -> String {
    let transcript = conversation
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Analyze the following conversation between a user and Miles (AI coach).
Extract:
1. The user's motivations (what drives them)
2. Key moments (significant achievements, challenges, or insights)

Keep each extracted item concise (under 10 words).
Return one JSON object with two arrays: "motivations" and "keyMoments".

Conversation:
{}"#,
        transcript
    )
}

pub fn milestones_prompt(title: &str, description: Option<&str>) -> String {
    let description = description
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!("\nDescription: {}", d))
        .unwrap_or_default();
    format!(
        r#"Generate 3-5 specific, measurable milestones for this goal:
Goal: {}{}

Milestones should be:
1. Progressive (building toward the main goal)
2. Specific and measurable
3. Achievable in 1-2 weeks each

Return a JSON object of the form {{"milestones": ["..."]}}. Each milestone title should be 3-8 words."#,
        title, description
    )
}

pub fn tip_prompt(goals: &[Goal], mood: Option<&str>) -> String {
    let mut prompt = String::from("Generate a short, personalized coaching tip for a user.");
    if !goals.is_empty() {
        prompt.push_str("\nThe user has the following goals:");
        for g in goals {
            let _ = write!(prompt, "\n- {} (Progress: {}%)", g.title, g.progress);
        }
    }
    if let Some(mood) = mood.filter(|m| !m.trim().is_empty()) {
        let _ = write!(prompt, "\nThe user's recent mood: {}", mood);
    }
    prompt.push_str(
        "\n\nThe tip should be:\n1. Motivational but practical\n2. Brief (30-50 words)\n3. Specific to their goals if provided\n4. In keeping with Miles' supportive coaching persona\n\nReturn only the tip text.",
    );
    prompt
}
