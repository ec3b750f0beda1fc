//! Core data models shared by the stores, the recommender and the HTTP layer.
//!
//! Rows are loaded into plain structs with unix-second timestamps; the
//! `*Resource` types are their JSON shapes with ISO-8601 timestamps.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::format_ts_iso;
use crate::uploads;

/// Declares a closed string enumeration stored as TEXT and serialized as the
/// same string.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(anyhow!(concat!("invalid ", stringify!($name), ": '{}'"), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Account role; each role gets its own route group.
    Role {
        Student => "student",
        Teacher => "teacher",
        Admin => "admin",
    }
);

string_enum!(
    ContentType {
        Video => "video",
        Pdf => "pdf",
        Link => "link",
        Quiz => "quiz",
        Document => "document",
        Presentation => "presentation",
        Spreadsheet => "spreadsheet",
    }
);

string_enum!(
    Difficulty {
        Beginner => "Beginner",
        Intermediate => "Intermediate",
        Advanced => "Advanced",
    }
);

string_enum!(
    LearningStyle {
        Visual => "visual",
        Reading => "reading",
        Practice => "practice",
        Mixed => "mixed",
    }
);

string_enum!(
    ActionType {
        Viewed => "viewed",
        Saved => "saved",
        Completed => "completed",
    }
);

string_enum!(
    /// Author of a stored assistant conversation message.
    ChatRole {
        User => "user",
        Assistant => "assistant",
    }
);

impl ContentType {
    /// Link and quiz items always point at an external URL; every other type
    /// may carry an uploaded file instead.
    pub fn requires_url(&self) -> bool {
        matches!(self, ContentType::Link | ContentType::Quiz)
    }
}

/// Parse a TEXT column into one of the string enums.
pub fn parse_column<T: FromStr<Err = anyhow::Error>>(value: &str) -> Result<T> {
    value.parse()
}

/// Parse a nullable TEXT column.
pub fn parse_optional_column<T: FromStr<Err = anyhow::Error>>(
    value: Option<String>,
) -> Result<Option<T>> {
    value.as_deref().map(str::parse).transpose()
}

// ============ Users ============

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub google_id: Option<String>,
    pub avatar: Option<String>,
    pub email_verified_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Public JSON shape of a user. Password hashes and tokens never leave the store.
#[derive(Debug, Clone, Serialize)]
pub struct UserResource {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub email_verified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&User> for UserResource {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            avatar: user.avatar.clone(),
            email_verified_at: user.email_verified_at.map(format_ts_iso),
            created_at: format_ts_iso(user.created_at),
            updated_at: format_ts_iso(user.updated_at),
        }
    }
}

// ============ Content ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Creator {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content_type: ContentType,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub subject: String,
    pub difficulty: Difficulty,
    pub created_by: Option<i64>,
    pub creator: Option<Creator>,
    pub tags: Vec<TagRef>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ContentItem {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Comma-separated tag names, or `None` for prompts.
    pub fn tag_list(&self) -> String {
        if self.tags.is_empty() {
            "None".to_string()
        } else {
            self.tag_names().join(", ")
        }
    }
}

/// JSON shape of a content item as returned by every content endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ContentItemResource {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    pub subject: String,
    pub difficulty: Difficulty,
    pub creator: Option<Creator>,
    pub tags: Vec<TagRef>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
}

impl From<&ContentItem> for ContentItemResource {
    fn from(item: &ContentItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            description: item.description.clone(),
            content_type: item.content_type,
            url: item.url.clone(),
            file_path: item.file_path.clone(),
            file_url: item.file_path.as_deref().map(uploads::file_url),
            subject: item.subject.clone(),
            difficulty: item.difficulty,
            creator: item.creator.clone(),
            tags: item.tags.clone(),
            created_at: format_ts_iso(item.created_at),
            updated_at: format_ts_iso(item.updated_at),
            ai_summary: None,
        }
    }
}

impl ContentItemResource {
    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.ai_summary = summary;
        self
    }
}

pub fn resources(items: &[ContentItem]) -> Vec<ContentItemResource> {
    items.iter().map(ContentItemResource::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentTag {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

// ============ Preferences ============

#[derive(Debug, Clone, Serialize)]
pub struct LearningPreference {
    pub id: i64,
    pub user_id: i64,
    pub grade_level: Option<String>,
    pub subjects: Vec<String>,
    pub preferred_difficulty: Option<Difficulty>,
    pub learning_style: Option<LearningStyle>,
    pub goals: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LearningPreference {
    pub fn has_subject(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }

    /// Profile block shared by the recommendation and assistant prompts.
    pub fn profile_text(&self, heading: &str) -> String {
        let not_set = "Not specified";
        let subjects = if self.subjects.is_empty() {
            not_set.to_string()
        } else {
            self.subjects.join(", ")
        };
        format!(
            "{}:\n- Grade Level: {}\n- Subjects: {}\n- Preferred Difficulty: {}\n- Learning Style: {}\n- Goals: {}\n\n",
            heading,
            self.grade_level.as_deref().unwrap_or(not_set),
            subjects,
            self.preferred_difficulty.map(|d| d.as_str()).unwrap_or(not_set),
            self.learning_style.map(|s| s.as_str()).unwrap_or(not_set),
            self.goals.as_deref().unwrap_or(not_set),
        )
    }
}

// ============ Assistant ============

#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub id: i64,
    pub user_id: i64,
    pub role: ChatRole,
    pub message: String,
    pub suggested_content_ids: Option<Vec<i64>>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessageResource {
    pub id: i64,
    pub role: ChatRole,
    pub message: String,
    pub suggested_content_ids: Option<Vec<i64>>,
    pub created_at: String,
}

impl From<&ConversationMessage> for ConversationMessageResource {
    fn from(m: &ConversationMessage) -> Self {
        Self {
            id: m.id,
            role: m.role,
            message: m.message.clone(),
            suggested_content_ids: m.suggested_content_ids.clone(),
            created_at: format_ts_iso(m.created_at),
        }
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
pub fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip_through_text() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), *ct);
        }
        assert!("Expert".parse::<Difficulty>().is_err());
        assert_eq!("Beginner".parse::<Difficulty>().unwrap(), Difficulty::Beginner);
    }

    #[test]
    fn test_enum_serializes_as_stored_text() {
        assert_eq!(serde_json::to_string(&Difficulty::Advanced).unwrap(), "\"Advanced\"");
        assert_eq!(serde_json::to_string(&Role::Teacher).unwrap(), "\"teacher\"");
    }

    #[test]
    fn test_requires_url() {
        assert!(ContentType::Link.requires_url());
        assert!(ContentType::Quiz.requires_url());
        assert!(!ContentType::Video.requires_url());
        assert!(!ContentType::Spreadsheet.requires_url());
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundary() {
        assert_eq!(truncate_bytes("hello", 10), "hello");
        assert_eq!(truncate_bytes("hello", 3), "hel");
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_bytes("aé", 2), "a");
    }

    #[test]
    fn test_profile_text_defaults() {
        let pref = LearningPreference {
            id: 1,
            user_id: 1,
            grade_level: None,
            subjects: vec![],
            preferred_difficulty: Some(Difficulty::Beginner),
            learning_style: None,
            goals: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let text = pref.profile_text("Student Profile");
        assert!(text.starts_with("Student Profile:\n"));
        assert!(text.contains("- Subjects: Not specified"));
        assert!(text.contains("- Preferred Difficulty: Beginner"));
    }
}
