//! Student-facing summaries of content items.

use std::collections::HashMap;

use crate::ai::GenerativeClient;
use crate::models::{truncate_bytes, ContentItem, LearningPreference};

pub const NO_SUMMARY: &str = "No summary available.";

/// The item's metadata as the text to be summarized.
pub fn content_info(item: &ContentItem) -> String {
    let mut info = format!(
        "Title: {}\nSubject: {}\nDifficulty: {}\nType: {}\n",
        item.title, item.subject, item.difficulty, item.content_type
    );
    if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
        info.push_str(&format!("Description: {}\n", description));
    }
    if !item.tags.is_empty() {
        info.push_str(&format!("Tags: {}\n", item.tag_names().join(", ")));
    }
    info
}

/// Audience phrase; `pref` is only passed for students.
pub fn instruction(pref: Option<&LearningPreference>) -> String {
    let Some(pref) = pref else {
        return "for a student".to_string();
    };
    let mut text = format!(
        "for a {} student",
        pref.grade_level.as_deref().unwrap_or("student")
    );
    if let Some(style) = pref.learning_style {
        text.push_str(&format!(" with a {} learning style", style));
    }
    text
}

/// Description cut to 200 bytes, with `...` when it was longer.
pub fn fallback_summary(item: &ContentItem) -> Option<String> {
    let description = item.description.as_deref().filter(|d| !d.is_empty())?;
    let truncated = truncate_bytes(description, 200);
    if truncated.len() < description.len() {
        Some(format!("{}...", truncated))
    } else {
        Some(truncated.to_string())
    }
}

pub async fn summarize_item(
    ai: &dyn GenerativeClient,
    item: &ContentItem,
    pref: Option<&LearningPreference>,
) -> Option<String> {
    if let Some(summary) = ai.summarize(&content_info(item), &instruction(pref)).await {
        return Some(summary);
    }
    tracing::info!(content_id = item.id, "AI summarization unavailable, using fallback");
    fallback_summary(item)
}

/// Summaries keyed by item id. Items without any summary map to `None`.
pub async fn batch_summarize(
    ai: &dyn GenerativeClient,
    items: &[ContentItem],
    pref: Option<&LearningPreference>,
) -> HashMap<i64, Option<String>> {
    let mut summaries = HashMap::with_capacity(items.len());
    for item in items {
        summaries.insert(item.id, summarize_item(ai, item, pref).await);
    }
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{DisabledClient, GeminiClient, OpenAIClient};
    use crate::config::ProviderConfig;
    use crate::models::{ContentType, Difficulty, LearningStyle, TagRef};
    use httpmock::prelude::*;
    use serde_json::json;

    fn item(description: Option<&str>) -> ContentItem {
        ContentItem {
            id: 4,
            title: "Photosynthesis".into(),
            description: description.map(str::to_string),
            content_type: ContentType::Video,
            url: None,
            file_path: None,
            subject: "Science".into(),
            difficulty: Difficulty::Beginner,
            created_by: None,
            creator: None,
            tags: vec![TagRef { id: 1, name: "plants".into() }, TagRef { id: 2, name: "energy".into() }],
            created_at: 0,
            updated_at: 0,
        }
    }

    fn pref(grade: Option<&str>, style: Option<LearningStyle>) -> LearningPreference {
        LearningPreference {
            id: 1,
            user_id: 1,
            grade_level: grade.map(str::to_string),
            subjects: vec![],
            preferred_difficulty: None,
            learning_style: style,
            goals: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_content_info() {
        let info = content_info(&item(Some("How plants eat")));
        assert_eq!(
            info,
            "Title: Photosynthesis\nSubject: Science\nDifficulty: Beginner\nType: video\nDescription: How plants eat\nTags: plants, energy\n"
        );
    }

    #[test]
    fn test_instruction_variants() {
        assert_eq!(instruction(None), "for a student");
        assert_eq!(instruction(Some(&pref(None, None))), "for a student student");
        assert_eq!(
            instruction(Some(&pref(Some("Grade 7"), Some(LearningStyle::Visual)))),
            "for a Grade 7 student with a visual learning style"
        );
    }

    #[test]
    fn test_fallback_truncates_on_char_boundary() {
        assert_eq!(fallback_summary(&item(None)), None);
        assert_eq!(fallback_summary(&item(Some("short"))).as_deref(), Some("short"));
        let long = "é".repeat(150);
        let summary = fallback_summary(&item(Some(&long))).unwrap();
        assert!(summary.ends_with("..."));
        assert_eq!(summary.len(), 200 + 3);
    }

    #[tokio::test]
    async fn test_disabled_client_falls_back() {
        let summaries = batch_summarize(
            &DisabledClient,
            &[item(Some("How plants eat")), ContentItem { id: 5, ..item(None) }],
            None,
        )
        .await;
        assert_eq!(summaries[&4].as_deref(), Some("How plants eat"));
        assert_eq!(summaries[&5], None);
    }

    #[tokio::test]
    async fn test_ai_summary_preferred() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST).body_includes("for a student");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "Plants turn light into food." } }]
                }));
            })
            .await;
        let config = ProviderConfig {
            base_url: server.base_url(),
            model: "gpt-test".into(),
            timeout_secs: 5,
        };
        let client = OpenAIClient::new(&config, Some("k".into())).unwrap();
        let summary = summarize_item(&client, &item(Some("desc")), None).await;
        assert_eq!(summary.as_deref(), Some("Plants turn light into food."));
    }

    #[tokio::test]
    async fn test_empty_ai_summary_falls_back_to_description() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST);
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "" }] } }]
                }));
            })
            .await;
        let config = ProviderConfig {
            base_url: server.base_url(),
            model: "gemini-test".into(),
            timeout_secs: 5,
        };
        let client = GeminiClient::new(&config, Some("k".into())).unwrap();
        let summary = summarize_item(&client, &item(Some("A real description")), None).await;
        assert_eq!(summary.as_deref(), Some("A real description"));
    }
}
