//! Chat assistant.
//!
//! A reply is built in three stages:
//!
//! 1. **Keywords.** Subject, difficulty and type keywords are pulled from the
//!    message and used to pick up to five relevant library items.
//! 2. **AI reply.** The AI client is asked for a reply with a system context
//!    (role, student profile, library items, external-resource rules) and the
//!    stored conversation. Library items mentioned in the reply become the
//!    suggestions, and URLs and known platforms become external suggestions.
//! 3. **Fallback.** Without an AI reply, a deterministic reply is chosen. That
//!    is a contextual answer when there is history (names, greetings and so
//!    on), otherwise a subject or generic line. The relevant items are
//!    suggested as they are.
//!
//! The user message and the reply are stored after the reply is computed, so
//! the current message never appears in its own history.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::LazyLock;

use crate::ai::{ChatTurn, GenerativeClient};
use crate::content::{query_items, ItemQuery};
use crate::db::now_ts;
use crate::interactions::interacted_ids;
use crate::models::{
    parse_column, truncate_bytes, ChatRole, ContentItem, ContentType, ConversationMessage,
    Difficulty, LearningPreference, Role, User,
};
use crate::preferences::find_preferences;

const RELEVANT_LIMIT: i64 = 5;

const QUOTA_NOTE: &str = "⚠️ Note: AI-powered responses are currently unavailable (quota limit reached). Using basic response mode. ";

const SUBJECT_TERMS: &[(&str, &str, &[&str])] = &[
    (
        "math",
        "Mathematics",
        &["math", "mathematics", "algebra", "geometry", "calculus", "fraction", "fractions", "equation", "equations"],
    ),
    (
        "science",
        "Science",
        &["science", "biology", "chemistry", "physics", "experiment", "experiments", "lab", "laboratory"],
    ),
    (
        "english",
        "English",
        &["english", "reading", "writing", "grammar", "literature", "essay", "essays", "vocabulary"],
    ),
    (
        "history",
        "History",
        &["history", "historical", "past", "ancient", "civilization", "war", "wars"],
    ),
    ("art", "Art", &["art", "drawing", "painting", "creative", "design"]),
];

/// Known platforms: (lower-case name searched in the reply, display name, URL).
const PLATFORMS: &[(&str, &str, &str)] = &[
    ("khan academy", "Khan Academy", "https://www.khanacademy.org"),
    ("coursera", "Coursera", "https://www.coursera.org"),
    ("edx", "edX", "https://www.edx.org"),
    ("youtube", "YouTube", "https://www.youtube.com"),
    ("google scholar", "Google Scholar", "https://scholar.google.com"),
];

/// Compile a built-in pattern; a broken one degrades to a never-matching regex.
fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| {
        tracing::error!(pattern, error = %e, "invalid built-in pattern");
        Regex::new(r"$^").expect("fallback regex compiles")
    })
}

static URL_RE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)https?://[^\s)]+"));
static SENTENCE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| re(r"[.!?]\s+"));
static TITLE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"\[([^\]]+)\]\("),
        re(r"(?i)(?:title|resource|check out|visit|see|explore):\s*([^\n.]+)"),
        re(r"(?:^|\n)\s*[-*]\s*([^\n.]+?)(?:\s*[-–—]|$)"),
    ]
});
static TOPIC_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(math|mathematics|algebra|calculus|geometry)\b",
        r"(?i)\b(science|biology|chemistry|physics)\b",
        r"(?i)\b(programming|coding|computer science|software)\b",
        r"(?i)\b(history|social studies|geography)\b",
        r"(?i)\b(language|english|literature|writing)\b",
    ]
    .into_iter()
    .map(re)
    .collect()
});

static NAME_QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\b(who are you|your name|introduce)\b"));
static NAME_RECALL_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\b(tell me|what is|remember|do you know)\b.*\b(my name|name)\b"));
static COMMUNICATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(communication|speaking|writing|presentation|public speaking)\b")
});
static SUGGESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\b(suggest|recommend|topic|subject|what should|what can)\b"));
static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(hello|hi|hey|greetings|good morning|good afternoon|good evening)\b")
});
static MY_NAME_RE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bmy name is (.+?)(?:\.|$|\s)"));

// ============ Keywords ============

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords {
    /// Subject keys (`math`, `science`, ...) in detection order.
    pub subjects: Vec<&'static str>,
    pub difficulty: Option<Difficulty>,
    pub content_type: Option<ContentType>,
}

impl Keywords {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.difficulty.is_none() && self.content_type.is_none()
    }

    /// Library subject names for the detected subject keys.
    pub fn subject_names(&self) -> Vec<String> {
        self.subjects
            .iter()
            .filter_map(|key| SUBJECT_TERMS.iter().find(|(k, _, _)| k == key))
            .map(|(_, name, _)| name.to_string())
            .collect()
    }
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

pub fn extract_keywords(message: &str) -> Keywords {
    let message = message.to_lowercase();

    let subjects = SUBJECT_TERMS
        .iter()
        .filter(|(_, _, terms)| contains_any(&message, terms))
        .map(|(key, _, _)| *key)
        .collect();

    let difficulty = if contains_any(&message, &["beginner", "easy", "basic"]) {
        Some(Difficulty::Beginner)
    } else if contains_any(&message, &["intermediate", "medium"]) {
        Some(Difficulty::Intermediate)
    } else if contains_any(&message, &["advanced", "hard", "difficult"]) {
        Some(Difficulty::Advanced)
    } else {
        None
    };

    let content_type = if contains_any(&message, &["video", "watch"]) {
        Some(ContentType::Video)
    } else if contains_any(&message, &["pdf", "document", "read"]) {
        Some(ContentType::Pdf)
    } else if contains_any(&message, &["quiz", "test", "practice"]) {
        Some(ContentType::Quiz)
    } else {
        None
    };

    Keywords {
        subjects,
        difficulty,
        content_type,
    }
}

/// Up to five library items matching the keywords, falling back to the
/// user's preferred difficulty and subjects where the message names none.
pub async fn find_relevant(
    pool: &SqlitePool,
    keywords: &Keywords,
    user: &User,
    pref: Option<&LearningPreference>,
) -> Result<Vec<ContentItem>> {
    let mut query = ItemQuery {
        subjects: keywords.subject_names(),
        limit: Some(RELEVANT_LIMIT),
        ..Default::default()
    };

    if let Some(difficulty) = keywords
        .difficulty
        .or_else(|| pref.and_then(|p| p.preferred_difficulty))
    {
        query.difficulties.push(difficulty);
    }
    query.types.extend(keywords.content_type);

    if query.subjects.is_empty() {
        if let Some(pref) = pref {
            query.subjects = pref.subjects.clone();
        }
    }

    if user.role == Role::Student {
        query.exclude_ids = interacted_ids(pool, user.id).await?;
    }

    query_items(pool, &query).await
}

// ============ Conversation store ============

fn message_from_row(row: &SqliteRow) -> Result<ConversationMessage> {
    let role: String = row.get("role");
    let ids: Option<String> = row.get("suggested_content_ids");
    Ok(ConversationMessage {
        id: row.get("id"),
        user_id: row.get("user_id"),
        role: parse_column(&role)?,
        message: row.get("message"),
        suggested_content_ids: ids
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .context("Invalid suggested_content_ids column")?,
        created_at: row.get("created_at"),
    })
}

const MESSAGE_SELECT: &str = "SELECT id, user_id, role, message, suggested_content_ids, created_at \
     FROM assistant_conversations WHERE user_id = ? ORDER BY created_at ASC, id ASC";

/// Every stored message for the user, oldest first.
pub async fn list_history(pool: &SqlitePool, user_id: i64) -> Result<Vec<ConversationMessage>> {
    let rows = sqlx::query(MESSAGE_SELECT)
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(message_from_row).collect()
}

/// The first `2 * pairs` messages, oldest first, used as model context.
pub async fn history(pool: &SqlitePool, user_id: i64, pairs: i64) -> Result<Vec<ConversationMessage>> {
    let rows = sqlx::query(&format!("{} LIMIT ?", MESSAGE_SELECT))
        .bind(user_id)
        .bind(pairs * 2)
        .fetch_all(pool)
        .await?;
    rows.iter().map(message_from_row).collect()
}

pub async fn store_message(
    pool: &SqlitePool,
    user_id: i64,
    role: ChatRole,
    message: &str,
    suggested_content_ids: Option<&[i64]>,
) -> Result<i64> {
    let now = now_ts();
    let ids = suggested_content_ids.map(serde_json::to_string).transpose()?;
    let id = sqlx::query_scalar(
        "INSERT INTO assistant_conversations \
         (user_id, role, message, suggested_content_ids, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user_id)
    .bind(role.as_str())
    .bind(message)
    .bind(ids)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn clear_history(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM assistant_conversations WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ============ AI reply ============

pub fn system_context(
    role: Role,
    pref: Option<&LearningPreference>,
    relevant: &[ContentItem],
) -> String {
    let mut ctx =
        String::from("You are EduNexus JPENHS, an AI learning assistant for students and teachers.\n\n");

    if role == Role::Student {
        ctx.push_str(
            "Your role: Help students learn by answering questions clearly and concisely at an age-appropriate level. \
             Encourage understanding and optionally reference learning resources from our library.\n\n",
        );
        if let Some(pref) = pref {
            ctx.push_str(&pref.profile_text("Student Profile"));
        }
    } else {
        ctx.push_str(
            "Your role: Help teachers by suggesting teaching strategies and useful content items for their students.\n\n",
        );
    }

    if relevant.is_empty() {
        ctx.push_str("Note: No relevant resources found in our library for this query.\n\n");
    } else {
        ctx.push_str("Here are some relevant resources from our library:\n");
        for item in relevant {
            ctx.push_str(&format!(
                "- ID: {}, Title: {}, Subject: {}, Difficulty: {}, Type: {}, Description: {}, Tags: {}\n",
                item.id,
                item.title,
                item.subject,
                item.difficulty,
                item.content_type,
                truncate_bytes(item.description.as_deref().unwrap_or_default(), 200),
                item.tag_list(),
            ));
        }
        ctx.push_str("\nWhen you suggest resources, reference these items by their ID and title.\n\n");
    }

    ctx.push_str(
        "\n\nIMPORTANT INSTRUCTIONS:\n\
         1. If relevant resources exist in our library above, prioritize suggesting those by their ID and title.\n\
         2. If no relevant resources exist in our library, or if the user needs additional external resources, you MUST suggest high-quality Google-based educational resources.\n\
         3. When suggesting external resources, provide:\n   \
         - The resource title/name\n   \
         - A brief description (1-2 sentences)\n   \
         - The full URL (must be a valid, accessible link)\n   \
         - Why it's relevant to the user's query\n\
         4. Format external suggestions clearly in your response, using markdown links if appropriate.\n\
         5. You can suggest resources from: Khan Academy, Coursera, edX, YouTube Education, Google Scholar, educational websites, official documentation, etc.\n\
         6. Always provide helpful, accurate, and educational resources that align with the user's learning goals.\n\n\
         Provide a helpful, clear response. Include both library resources (if available) and external Google-based resources (when needed or when library resources are insufficient).",
    );
    ctx
}

/// Relevant items whose id or title appears in the reply, or all of them if
/// none do.
pub fn suggested_from_reply(reply: &str, relevant: &[ContentItem]) -> Vec<ContentItem> {
    let lower = reply.to_lowercase();
    let mentioned: Vec<ContentItem> = relevant
        .iter()
        .filter(|item| {
            lower.contains(&item.id.to_string()) || lower.contains(&item.title.to_lowercase())
        })
        .cloned()
        .collect();
    if mentioned.is_empty() {
        relevant.to_vec()
    } else {
        mentioned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalSuggestion {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn title_from_context(context: &str) -> Option<String> {
    TITLE_RES.iter().find_map(|pattern| {
        let title = pattern.captures(context)?.get(1)?.as_str().trim();
        (title.len() > 5 && title.len() < 100).then(|| title.to_string())
    })
}

fn description_from_context(context: &str) -> Option<String> {
    SENTENCE_SPLIT_RE
        .split(context)
        .map(str::trim)
        .find(|s| s.len() > 20 && s.len() < 200)
        .map(str::to_string)
}

fn topic_near(lower_reply: &str, pos: usize) -> Option<String> {
    let start = ceil_boundary(lower_reply, pos.saturating_sub(50));
    let end = floor_boundary(lower_reply, start + 100);
    let context = &lower_reply[start..end];

    TOPIC_RES.iter().find_map(|pattern| {
        let topic = pattern.captures(context)?.get(1)?.as_str().to_lowercase();
        let mut chars = topic.chars();
        chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect::<String>())
    })
}

/// URLs in the reply, plus known education platforms mentioned by name.
pub fn extract_external_suggestions(reply: &str) -> Vec<ExternalSuggestion> {
    let mut suggestions: Vec<ExternalSuggestion> = Vec::new();

    for m in URL_RE.find_iter(reply) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
        let start = ceil_boundary(reply, m.start().saturating_sub(200));
        let context = &reply[start..m.start()];
        suggestions.push(ExternalSuggestion {
            title: title_from_context(context).unwrap_or_else(|| "External Resource".to_string()),
            url: url.to_string(),
            description: description_from_context(context),
        });
    }

    let lower = reply.to_lowercase();
    for (needle, name, base_url) in PLATFORMS {
        let Some(pos) = lower.find(needle) else {
            continue;
        };
        let already = suggestions
            .iter()
            .any(|s| s.url.to_lowercase().contains(base_url));
        if already {
            continue;
        }
        let topic = topic_near(&lower, pos);
        suggestions.push(ExternalSuggestion {
            title: match &topic {
                Some(topic) => format!("{} - {}", name, topic),
                None => name.to_string(),
            },
            url: base_url.to_string(),
            description: Some(match &topic {
                Some(topic) => format!("Explore {} for educational resources on {}", name, topic),
                None => format!("Explore {} for educational resources", name),
            }),
        });
    }

    let mut unique: Vec<ExternalSuggestion> = Vec::with_capacity(suggestions.len());
    for s in suggestions {
        if !unique.contains(&s) {
            unique.push(s);
        }
    }
    unique
}

// ============ Fallback reply ============

fn remembered_name(history: &[ConversationMessage]) -> Option<String> {
    history
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .find_map(|m| Some(MY_NAME_RE.captures(&m.message)?.get(1)?.as_str().trim().to_string()))
}

/// Reply to conversational messages (names, greetings, requests for ideas).
/// Only used once a conversation exists.
pub fn contextual_reply(message: &str, history: &[ConversationMessage], role: Role) -> Option<String> {
    if history.is_empty() {
        return None;
    }

    if NAME_QUESTION_RE.is_match(message) {
        return Some(match remembered_name(history) {
            Some(name) => format!(
                "Hello {}! I'm EduNexus JPENHS, your AI learning assistant. How can I help you with your studies today?",
                name
            ),
            None => "I'm EduNexus JPENHS, your AI learning assistant. I'm here to help you with your learning journey. What would you like to learn about today?".to_string(),
        });
    }

    if NAME_RECALL_RE.is_match(message) {
        return Some(match remembered_name(history) {
            Some(name) => format!(
                "Yes, I remember! Your name is {}. How can I assist you today, {}?",
                name, name
            ),
            None => "I don't think you've told me your name yet. What's your name?".to_string(),
        });
    }

    if role == Role::Student && COMMUNICATION_RE.is_match(message) {
        return Some("Great! Improving communication skills is important. I can suggest resources on public speaking, writing, and presentation skills. Would you like me to recommend some learning materials?".to_string());
    }

    if role == Role::Student && SUGGESTION_RE.is_match(message) {
        return Some("I'd be happy to suggest topics! Based on your learning preferences, I can recommend resources in various subjects. What area are you most interested in exploring?".to_string());
    }

    if GREETING_RE.is_match(message) {
        let greeting = match remembered_name(history) {
            Some(name) => format!("Hello {}! ", name),
            None => "Hello! ".to_string(),
        };
        return Some(format!(
            "{}I'm EduNexus JPENHS, your AI learning assistant. How can I help you today?",
            greeting
        ));
    }

    None
}

pub fn fallback_reply(
    message: &str,
    keywords: &Keywords,
    role: Role,
    pref: Option<&LearningPreference>,
    history: &[ConversationMessage],
) -> String {
    if let Some(reply) = contextual_reply(message, history, role) {
        return reply;
    }

    let teacher = role == Role::Teacher;
    if keywords.is_empty() {
        return if teacher {
            "I'm here to help you find resources for your students. Could you tell me what subject or topic you're looking for?"
        } else {
            "I'm here to help you learn! Could you tell me what subject or topic you're interested in?"
        }
        .to_string();
    }

    let audience = if teacher {
        "might help your students:"
    } else {
        "might help:"
    };
    let mut reply = match keywords.subjects.first() {
        Some(subject) => {
            let mut chars = subject.chars();
            let subject: String = chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
            format!(
                "It looks like you're asking about {}. Here are some resources that {}",
                subject, audience
            )
        }
        None => format!("Based on your question, here are some resources that {}", audience),
    };

    if pref.is_some_and(|p| p.preferred_difficulty.is_some()) {
        reply.push_str(" I've filtered these to match your preferred difficulty level.");
    }
    reply
}

// ============ Entry points ============

#[derive(Debug, Clone)]
pub struct AssistantReply {
    pub reply: String,
    pub suggestions: Vec<ContentItem>,
    pub external_suggestions: Vec<ExternalSuggestion>,
}

/// Compute a reply without storing anything.
pub async fn reply(
    pool: &SqlitePool,
    ai: &dyn GenerativeClient,
    user: &User,
    message: &str,
    history_pairs: i64,
) -> Result<AssistantReply> {
    let pref = find_preferences(pool, user.id).await?;
    let keywords = extract_keywords(message);
    let relevant = find_relevant(pool, &keywords, user, pref.as_ref()).await?;
    let history = history(pool, user.id, history_pairs).await?;

    let system = system_context(user.role, pref.as_ref(), &relevant);
    let turns: Vec<ChatTurn> = history
        .iter()
        .map(|m| ChatTurn {
            role: m.role.into(),
            text: m.message.clone(),
        })
        .collect();

    if let Some(ai_reply) = ai.generate_with_history(&system, &turns, message).await {
        return Ok(AssistantReply {
            suggestions: suggested_from_reply(&ai_reply, &relevant),
            external_suggestions: extract_external_suggestions(&ai_reply),
            reply: ai_reply,
        });
    }

    tracing::info!(
        user_id = user.id,
        message_length = message.len(),
        "AI reply unavailable, using fallback reply"
    );

    let mut text = fallback_reply(message, &keywords, user.role, pref.as_ref(), &history);
    if ai.has_api_key() {
        text = format!("{}{}", QUOTA_NOTE, text);
    }
    Ok(AssistantReply {
        reply: text,
        suggestions: relevant,
        external_suggestions: Vec::new(),
    })
}

/// Reply to a chat message and store both sides of the exchange.
pub async fn chat(
    pool: &SqlitePool,
    ai: &dyn GenerativeClient,
    user: &User,
    message: &str,
    history_pairs: i64,
) -> Result<AssistantReply> {
    let answer = reply(pool, ai, user, message, history_pairs).await?;

    store_message(pool, user.id, ChatRole::User, message, None).await?;
    let ids: Vec<i64> = answer.suggestions.iter().map(|i| i.id).collect();
    store_message(
        pool,
        user.id,
        ChatRole::Assistant,
        &answer.reply,
        (!ids.is_empty()).then_some(ids.as_slice()),
    )
    .await?;

    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{DisabledClient, GeminiClient};
    use crate::config::ProviderConfig;
    use crate::content::{create_content, NewContent};
    use crate::migrate::memory_pool;
    use crate::preferences::{update_preferences, PreferenceUpdate};
    use crate::users::seed_default_users;
    use httpmock::prelude::*;
    use serde_json::json;

    fn msg(role: ChatRole, text: &str) -> ConversationMessage {
        ConversationMessage {
            id: 0,
            user_id: 1,
            role,
            message: text.to_string(),
            suggested_content_ids: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_extract_keywords() {
        let kw = extract_keywords("Can I get an EASY video about algebra and cells in biology?");
        assert_eq!(kw.subjects, vec!["math", "science"]);
        assert_eq!(kw.difficulty, Some(Difficulty::Beginner));
        assert_eq!(kw.content_type, Some(ContentType::Video));
        assert_eq!(kw.subject_names(), vec!["Mathematics", "Science"]);

        let kw = extract_keywords("something hard to read");
        assert!(kw.subjects.is_empty());
        assert_eq!(kw.difficulty, Some(Difficulty::Advanced));
        assert_eq!(kw.content_type, Some(ContentType::Pdf));

        assert!(extract_keywords("hello there").is_empty());
    }

    #[test]
    fn test_external_suggestions_from_markdown() {
        let reply = "Here are some resources:\n\
            - [Khan Academy Algebra](https://www.khanacademy.org/math/algebra). Great practice problems for every level.\n";
        let suggestions = extract_external_suggestions(reply);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "Khan Academy Algebra");
        assert_eq!(suggestions[0].url, "https://www.khanacademy.org/math/algebra");
    }

    #[test]
    fn test_external_suggestions_trim_and_fallback_title() {
        let suggestions = extract_external_suggestions("Go to https://example.org/x).");
        assert_eq!(suggestions[0].url, "https://example.org/x");
        assert_eq!(suggestions[0].title, "External Resource");
        assert_eq!(suggestions[0].description, None);
    }

    #[test]
    fn test_platform_mentions_get_topic() {
        let suggestions =
            extract_external_suggestions("For chemistry, Coursera has excellent free courses.");
        assert_eq!(
            suggestions,
            vec![ExternalSuggestion {
                title: "Coursera - Chemistry".into(),
                url: "https://www.coursera.org".into(),
                description: Some("Explore Coursera for educational resources on Chemistry".into()),
            }]
        );

        let suggestions = extract_external_suggestions("Try YouTube and also YouTube again.");
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].title, "YouTube");
    }

    #[test]
    fn test_contextual_replies() {
        let history = vec![
            msg(ChatRole::User, "Hi, my name is Ana. Nice to meet you"),
            msg(ChatRole::Assistant, "Hello!"),
        ];
        assert_eq!(
            contextual_reply("what is your name?", &history, Role::Student).unwrap(),
            "Hello Ana! I'm EduNexus JPENHS, your AI learning assistant. How can I help you with your studies today?"
        );
        assert_eq!(
            contextual_reply("do you remember my name", &history, Role::Student).unwrap(),
            "Yes, I remember! Your name is Ana. How can I assist you today, Ana?"
        );
        assert!(contextual_reply("public speaking tips", &history, Role::Student)
            .unwrap()
            .starts_with("Great! Improving communication skills"));
        assert_eq!(contextual_reply("public speaking tips", &history, Role::Teacher), None);
        assert!(contextual_reply("hey", &history, Role::Teacher)
            .unwrap()
            .starts_with("Hello Ana! I'm EduNexus JPENHS"));
        assert_eq!(contextual_reply("hey", &[], Role::Student), None);
    }

    #[test]
    fn test_fallback_reply_wording() {
        let kw = extract_keywords("geometry please");
        assert_eq!(
            fallback_reply("geometry please", &kw, Role::Teacher, None, &[]),
            "It looks like you're asking about Math. Here are some resources that might help your students:"
        );
        let kw = extract_keywords("a quiz");
        assert_eq!(
            fallback_reply("a quiz", &kw, Role::Student, None, &[]),
            "Based on your question, here are some resources that might help:"
        );
        let kw = extract_keywords("anything");
        assert_eq!(
            fallback_reply("anything", &kw, Role::Student, None, &[]),
            "I'm here to help you learn! Could you tell me what subject or topic you're interested in?"
        );
    }

    #[test]
    fn test_suggested_from_reply() {
        let item = |id: i64, title: &str| ContentItem {
            id,
            title: title.into(),
            description: None,
            content_type: ContentType::Link,
            url: None,
            file_path: None,
            subject: "Science".into(),
            difficulty: Difficulty::Beginner,
            created_by: None,
            creator: None,
            tags: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let relevant = vec![item(7, "Cell Biology"), item(8, "Ecosystems")];
        let picked = suggested_from_reply("Start with cell biology.", &relevant);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, 7);
        assert_eq!(suggested_from_reply("No match here", &relevant).len(), 2);
    }

    fn science_video(title: &str) -> NewContent {
        NewContent {
            title: title.into(),
            description: Some("Watch and learn".into()),
            content_type: ContentType::Video,
            url: Some("https://example.com/v".into()),
            subject: "Science".into(),
            difficulty: Difficulty::Beginner,
            tag_ids: vec![],
            upload_ext: None,
        }
    }

    #[tokio::test]
    async fn test_chat_fallback_stores_exchange() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let (student, teacher) = (&users[1], &users[2]);
        let item = create_content(&pool, &science_video("Cells 101"), teacher.id, None).await.unwrap();
        update_preferences(
            &pool,
            student.id,
            &PreferenceUpdate {
                preferred_difficulty: Some(Difficulty::Beginner),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let answer = chat(&pool, &DisabledClient, student, "Any biology videos?", 10).await.unwrap();
        assert_eq!(
            answer.reply,
            "It looks like you're asking about Science. Here are some resources that might help: I've filtered these to match your preferred difficulty level."
        );
        assert_eq!(answer.suggestions.len(), 1);
        assert_eq!(answer.suggestions[0].id, item.id);
        assert!(answer.external_suggestions.is_empty());

        let stored = list_history(&pool, student.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, ChatRole::User);
        assert_eq!(stored[0].suggested_content_ids, None);
        assert_eq!(stored[1].suggested_content_ids, Some(vec![item.id]));

        let follow_up = chat(&pool, &DisabledClient, student, "hello", 10).await.unwrap();
        assert!(follow_up.reply.starts_with("Hello! I'm EduNexus JPENHS"));

        assert_eq!(clear_history(&pool, student.id).await.unwrap(), 4);
        assert!(list_history(&pool, student.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_window_is_oldest_pairs() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        for i in 0..6 {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            store_message(&pool, users[1].id, role, &format!("m{i}"), None).await.unwrap();
        }
        let window = history(&pool, users[1].id, 2).await.unwrap();
        let texts: Vec<&str> = window.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_ai_reply_with_quota_note_on_failure() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST);
                then.status(429).body("quota");
            })
            .await;
        let config = ProviderConfig {
            base_url: server.base_url(),
            model: "gemini-test".into(),
            timeout_secs: 5,
        };
        let client = GeminiClient::new(&config, Some("key".into())).unwrap();

        let answer = reply(&pool, &client, &users[2], "hmm", 10).await.unwrap();
        assert!(answer.reply.starts_with(QUOTA_NOTE));
        assert!(answer.reply.ends_with("what subject or topic you're looking for?"));
    }

    #[tokio::test]
    async fn test_empty_ai_reply_uses_fallback() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
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
        let client = GeminiClient::new(&config, Some("key".into())).unwrap();

        let answer = reply(&pool, &client, &users[2], "hmm", 10).await.unwrap();
        assert!(answer.reply.starts_with(QUOTA_NOTE));
        assert!(answer.reply.len() > QUOTA_NOTE.len());
        assert!(answer.external_suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_ai_reply_extracts_suggestions() {
        let pool = memory_pool().await;
        let users = seed_default_users(&pool).await.unwrap();
        let item = create_content(&pool, &science_video("Cells 101"), users[2].id, None).await.unwrap();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST).body_includes("Cells 101");
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{
                        "text": "Watch Cells 101 first. Then visit: Biology Basics https://www.khanacademy.org/science/biology"
                    }] } }]
                }));
            })
            .await;
        let config = ProviderConfig {
            base_url: server.base_url(),
            model: "gemini-test".into(),
            timeout_secs: 5,
        };
        let client = GeminiClient::new(&config, Some("key".into())).unwrap();

        let answer = reply(&pool, &client, &users[1], "science video", 10).await.unwrap();
        assert_eq!(answer.suggestions[0].id, item.id);
        assert_eq!(answer.external_suggestions.len(), 1);
        assert_eq!(answer.external_suggestions[0].title, "Biology Basics");
        assert_eq!(
            answer.external_suggestions[0].url,
            "https://www.khanacademy.org/science/biology"
        );
    }
}
