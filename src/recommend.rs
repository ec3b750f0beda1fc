//! Rule-based content recommendations.
//!
//! Ranking works in four steps:
//!
//! 1. **Candidates:** items in the preferred subjects at the preferred
//!    difficulty. The filter is relaxed step by step (subject only, then
//!    difficulty only, then everything) until something matches.
//! 2. **Score:** each candidate starts at 1.0 and gains linear boosts.
//!    Subject match adds 2.0, difficulty match adds 1.5, and learning-style fit
//!    and goal keywords add their own boosts.
//! 3. **Down-rank:** items the student already interacted with are multiplied
//!    by 0.3.
//! 4. **Annotate:** the top ten carry a rule-based reason. The AI client may
//!    replace that reason with a personalized one.
//!
//! A student without a preference row gets the ten newest items.

use anyhow::Result;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

use crate::ai::GenerativeClient;
use crate::content::{query_items, ItemQuery};
use crate::interactions::interacted_ids;
use crate::models::{truncate_bytes, ContentItem, ContentType, LearningPreference, LearningStyle};
use crate::preferences::find_preferences;

pub const MAX_RECOMMENDATIONS: usize = 10;
pub const DEFAULT_REASON: &str = "Recommended based on your preferences";
const POPULAR_REASON: &str = "Recommended based on popular content in your area";
const INTERACTED_FACTOR: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub item: ContentItem,
    pub score: f64,
    pub reason: String,
}

pub fn style_boost(style: LearningStyle, content_type: ContentType) -> f64 {
    match (style, content_type) {
        (LearningStyle::Visual, ContentType::Video) => 1.0,
        (LearningStyle::Reading, ContentType::Pdf | ContentType::Link) => 1.0,
        (LearningStyle::Practice, ContentType::Quiz) => 1.0,
        (LearningStyle::Mixed, _) => 0.5,
        _ => 0.0,
    }
}

fn style_clause(style: LearningStyle, content_type: ContentType) -> Option<&'static str> {
    match (style, content_type) {
        (LearningStyle::Visual, ContentType::Video) => Some("is a video, perfect for visual learners"),
        (LearningStyle::Reading, ContentType::Pdf | ContentType::Link) => {
            Some("is great for reading-based learning")
        }
        (LearningStyle::Practice, ContentType::Quiz) => Some("is a quiz, ideal for hands-on practice"),
        _ => None,
    }
}

/// Keyword overlap between the goals text and the item's title, description
/// and tags.
pub fn goal_boost(goals: &str, item: &ContentItem) -> f64 {
    let goals = goals.to_lowercase();
    let text = format!(
        "{} {}",
        item.title,
        item.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    let matches = goals
        .split(' ')
        .filter(|kw| kw.len() > 3 && text.contains(kw))
        .count();
    let mut boost = (matches as f64 * 0.5).min(2.0);

    for tag in &item.tags {
        if goals.contains(&tag.name.to_lowercase()) {
            boost += 0.5;
        }
    }
    boost
}

/// Score before the interaction down-rank.
pub fn score_item(item: &ContentItem, pref: &LearningPreference) -> f64 {
    let mut score = 1.0;
    if pref.has_subject(&item.subject) {
        score += 2.0;
    }
    if pref.preferred_difficulty == Some(item.difficulty) {
        score += 1.5;
    }
    if let Some(style) = pref.learning_style {
        score += style_boost(style, item.content_type);
    }
    if let Some(goals) = pref.goals.as_deref() {
        score += goal_boost(goals, item);
    }
    score
}

pub fn rule_reason(item: &ContentItem, pref: &LearningPreference) -> String {
    let mut clauses = Vec::new();
    if pref.has_subject(&item.subject) {
        clauses.push(format!("matches your interest in {}", item.subject));
    }
    if pref.preferred_difficulty == Some(item.difficulty) {
        clauses.push(format!(
            "matches your preferred difficulty level ({})",
            item.difficulty
        ));
    }
    if let Some(clause) = pref
        .learning_style
        .and_then(|style| style_clause(style, item.content_type))
    {
        clauses.push(clause.to_string());
    }

    if clauses.is_empty() {
        POPULAR_REASON.to_string()
    } else {
        format!("Recommended because it {}", clauses.join(" and "))
    }
}

/// Score, down-rank and keep the best `MAX_RECOMMENDATIONS`. Ties keep
/// candidate order.
pub fn rank(
    candidates: Vec<ContentItem>,
    pref: &LearningPreference,
    interacted: &HashSet<i64>,
) -> Vec<Recommendation> {
    let mut scored: Vec<Recommendation> = candidates
        .into_iter()
        .map(|item| {
            let mut score = score_item(&item, pref);
            if interacted.contains(&item.id) {
                score *= INTERACTED_FACTOR;
            }
            let reason = rule_reason(&item, pref);
            Recommendation { item, score, reason }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(MAX_RECOMMENDATIONS);
    scored
}

async fn candidates(pool: &SqlitePool, pref: &LearningPreference) -> Result<Vec<ContentItem>> {
    let subjects = pref.subjects.clone();
    let difficulties: Vec<_> = pref.preferred_difficulty.into_iter().collect();

    let strict = query_items(
        pool,
        &ItemQuery {
            subjects: subjects.clone(),
            difficulties: difficulties.clone(),
            ..Default::default()
        },
    )
    .await?;
    if !strict.is_empty() {
        return Ok(strict);
    }

    tracing::info!(
        user_id = pref.user_id,
        subjects = ?pref.subjects,
        difficulty = ?pref.preferred_difficulty,
        "No items found with strict filters, relaxing criteria"
    );

    let by_subject = query_items(
        pool,
        &ItemQuery {
            subjects,
            ..Default::default()
        },
    )
    .await?;
    if !by_subject.is_empty() {
        return Ok(by_subject);
    }

    if !difficulties.is_empty() {
        let by_difficulty = query_items(
            pool,
            &ItemQuery {
                difficulties,
                ..Default::default()
            },
        )
        .await?;
        if !by_difficulty.is_empty() {
            return Ok(by_difficulty);
        }
    }

    tracing::info!("No items found with relaxed filters, returning all content");
    query_items(pool, &ItemQuery::default()).await
}

pub fn annotation_prompt(pref: &LearningPreference, recs: &[Recommendation]) -> String {
    let mut prompt = String::from(
        "You are a recommendation engine for an educational app called EduNexus. \
         For each content item below, provide a short, personalized explanation (1-2 sentences) \
         explaining why this specific content would be beneficial for this student.\n\n",
    );
    prompt.push_str(&pref.profile_text("Student Profile"));
    prompt.push_str("Candidate Content Items:\n");

    for (i, rec) in recs.iter().enumerate() {
        let item = &rec.item;
        prompt.push_str(&format!(
            "{}. ID: {}, Title: {}, Subject: {}, Difficulty: {}, Type: {}, Description: {}, Tags: {}\n",
            i + 1,
            item.id,
            item.title,
            item.subject,
            item.difficulty,
            item.content_type,
            truncate_bytes(item.description.as_deref().unwrap_or_default(), 150),
            item.tag_list(),
        ));
    }

    prompt.push('\n');
    prompt.push_str(
        "Respond with a JSON array where each entry has: { \"id\": <content_id>, \"reason\": \"<short explanation for this specific student>\" }\n",
    );
    prompt.push_str(
        "Make the reasons natural, encouraging, and specific to the student's profile. \
         Focus on how the content aligns with their learning style, difficulty preference, and goals.",
    );
    prompt
}

/// `id → reason` from an annotation reply. Entries without both keys are skipped.
pub fn reasons_from_json(value: &Value) -> HashMap<i64, String> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_i64()?;
            let reason = entry.get("reason")?.as_str()?;
            Some((id, reason.to_string()))
        })
        .collect()
}

async fn annotate(ai: &dyn GenerativeClient, pref: &LearningPreference, recs: &mut [Recommendation]) {
    let prompt = annotation_prompt(pref, recs);
    let schema = json!([{ "id": 0, "reason": "string" }]);

    let Some(reply) = ai.generate_json(&prompt, &schema).await else {
        tracing::info!(user_id = pref.user_id, "AI annotation failed, using fallback reasons");
        return;
    };

    let reasons = reasons_from_json(&reply);
    for rec in recs.iter_mut() {
        if let Some(reason) = reasons.get(&rec.item.id) {
            rec.reason = reason.clone();
        }
    }
}

/// Ranked recommendations for `user_id`, best first.
pub async fn recommend(
    pool: &SqlitePool,
    ai: &dyn GenerativeClient,
    user_id: i64,
) -> Result<Vec<Recommendation>> {
    let Some(pref) = find_preferences(pool, user_id).await? else {
        let newest = query_items(
            pool,
            &ItemQuery {
                newest_first: true,
                limit: Some(MAX_RECOMMENDATIONS as i64),
                ..Default::default()
            },
        )
        .await?;
        return Ok(newest
            .into_iter()
            .map(|item| Recommendation {
                item,
                score: 1.0,
                reason: DEFAULT_REASON.to_string(),
            })
            .collect());
    };

    let interacted: HashSet<i64> = interacted_ids(pool, user_id).await?.into_iter().collect();
    let mut recs = rank(candidates(pool, &pref).await?, &pref, &interacted);

    if recs.is_empty() {
        tracing::warn!(user_id, "No recommendations available for user");
        return Ok(recs);
    }

    annotate(ai, &pref, &mut recs).await;
    Ok(recs)
}
