//! Content items: filtered listing, lookup, create/update/delete with tag sync,
//! and request validation for the teacher endpoints.
//!
//! Items are always loaded with their creator name and tags. Listing order is
//! newest first; candidate queries used by the recommender and the assistant
//! keep insertion (id) order unless asked otherwise.

use anyhow::Result;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::db::now_ts;
use crate::error::ApiError;
use crate::models::{
    parse_column, ContentItem, ContentType, Creator, Difficulty, TagRef,
};
use crate::pagination::{Page, PageMeta, PageRequest};
use crate::uploads::{self, PendingUpload};
use crate::validate::Input;

const ITEM_SELECT: &str = "SELECT c.id, c.title, c.description, c.type, c.url, c.file_path, \
    c.subject, c.difficulty, c.created_by, c.created_at, c.updated_at, u.name AS creator_name \
    FROM content_items c LEFT JOIN users u ON u.id = c.created_by";

fn item_from_row(row: &SqliteRow) -> Result<ContentItem> {
    let content_type: String = row.get("type");
    let difficulty: String = row.get("difficulty");
    let created_by: Option<i64> = row.get("created_by");
    let creator_name: Option<String> = row.get("creator_name");

    Ok(ContentItem {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        content_type: parse_column(&content_type)?,
        url: row.get("url"),
        file_path: row.get("file_path"),
        subject: row.get("subject"),
        difficulty: parse_column(&difficulty)?,
        created_by,
        creator: created_by
            .zip(creator_name)
            .map(|(id, name)| Creator { id, name }),
        tags: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Fill in `tags` for every item with a single query.
async fn load_tags(pool: &SqlitePool, items: &mut [ContentItem]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT it.content_item_id, t.id, t.name FROM content_item_tag it \
         JOIN content_tags t ON t.id = it.content_tag_id WHERE it.content_item_id IN (",
    );
    let mut ids = qb.separated(", ");
    for item in items.iter() {
        ids.push_bind(item.id);
    }
    ids.push_unseparated(")");
    qb.push(" ORDER BY t.id");

    let mut by_item: HashMap<i64, Vec<TagRef>> = HashMap::new();
    for row in qb.build().fetch_all(pool).await? {
        by_item
            .entry(row.get("content_item_id"))
            .or_default()
            .push(TagRef {
                id: row.get("id"),
                name: row.get("name"),
            });
    }

    for item in items.iter_mut() {
        item.tags = by_item.remove(&item.id).unwrap_or_default();
    }
    Ok(())
}

async fn fetch_items(pool: &SqlitePool, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<ContentItem>> {
    let rows = qb.build().fetch_all(pool).await?;
    let mut items = rows.iter().map(item_from_row).collect::<Result<Vec<_>>>()?;
    load_tags(pool, &mut items).await?;
    Ok(items)
}

pub async fn get_content(pool: &SqlitePool, id: i64) -> Result<Option<ContentItem>> {
    let mut qb = QueryBuilder::<Sqlite>::new(ITEM_SELECT);
    qb.push(" WHERE c.id = ").push_bind(id);
    Ok(fetch_items(pool, qb).await?.into_iter().next())
}

pub async fn content_exists(pool: &SqlitePool, id: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_items WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Load items by id, returned in the order of `ids`. Missing ids are skipped.
pub async fn get_content_many(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<ContentItem>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(ITEM_SELECT);
    qb.push(" WHERE c.id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
    sep.push_unseparated(")");

    let mut by_id: HashMap<i64, ContentItem> = fetch_items(pool, qb)
        .await?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

// ============ Listing ============

/// Filters shared by the content list endpoints.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    /// LIKE match on title, description or subject.
    pub search: Option<String>,
    pub subject: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub content_type: Option<ContentType>,
    /// LIKE match on any attached tag name.
    pub tag: Option<String>,
    pub created_by: Option<i64>,
}

impl ContentFilter {
    /// Parse list query parameters. Unknown difficulty or type values are a
    /// validation error; unparseable `page` / `per_page` fall back to defaults.
    pub fn from_query(
        params: &HashMap<String, String>,
        allow_per_page: bool,
    ) -> Result<(Self, PageRequest), ApiError> {
        let map: Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut input = Input::new(map);

        let filter = ContentFilter {
            search: input.optional_str("search", 255),
            subject: input.optional_str("subject", 255),
            difficulty: input.optional_enum("difficulty"),
            content_type: input.optional_enum("type"),
            tag: input.optional_str("tag", 255),
            created_by: params.get("creator_id").and_then(|v| v.trim().parse().ok()),
        };
        input.finish()?;

        let page = params.get("page").and_then(|v| v.trim().parse().ok());
        let per_page = if allow_per_page {
            params.get("per_page").and_then(|v| v.trim().parse().ok())
        } else {
            None
        };
        Ok((filter, PageRequest::new(page, per_page)))
    }
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a ContentFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(search) = filter.search.as_deref() {
        let pattern = format!("%{}%", search);
        qb.push(" AND (c.title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.description LIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.subject LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(subject) = filter.subject.as_deref() {
        qb.push(" AND c.subject = ").push_bind(subject);
    }
    if let Some(difficulty) = filter.difficulty {
        qb.push(" AND c.difficulty = ").push_bind(difficulty.as_str());
    }
    if let Some(content_type) = filter.content_type {
        qb.push(" AND c.type = ").push_bind(content_type.as_str());
    }
    if let Some(tag) = filter.tag.as_deref() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM content_item_tag it JOIN content_tags t ON t.id = it.content_tag_id \
             WHERE it.content_item_id = c.id AND t.name LIKE ",
        )
        .push_bind(format!("%{}%", tag))
        .push(")");
    }
    if let Some(created_by) = filter.created_by {
        qb.push(" AND c.created_by = ").push_bind(created_by);
    }
}

/// One page of items matching `filter`, newest first.
pub async fn list_content(
    pool: &SqlitePool,
    filter: &ContentFilter,
    page: PageRequest,
) -> Result<Page<ContentItem>> {
    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM content_items c");
    push_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(ITEM_SELECT);
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ")
        .push_bind(page.per_page)
        .push(" OFFSET ")
        .push_bind(page.offset());

    Ok(Page {
        data: fetch_items(pool, qb).await?,
        meta: PageMeta::new(page, total),
    })
}

/// Set-membership query used to pick recommendation and assistant candidates.
/// Empty lists do not filter.
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    pub subjects: Vec<String>,
    pub difficulties: Vec<Difficulty>,
    pub types: Vec<ContentType>,
    pub exclude_ids: Vec<i64>,
    pub newest_first: bool,
    pub limit: Option<i64>,
}

pub async fn query_items(pool: &SqlitePool, query: &ItemQuery) -> Result<Vec<ContentItem>> {
    let mut qb = QueryBuilder::<Sqlite>::new(ITEM_SELECT);
    qb.push(" WHERE 1 = 1");

    if !query.subjects.is_empty() {
        qb.push(" AND c.subject IN (");
        let mut sep = qb.separated(", ");
        for subject in &query.subjects {
            sep.push_bind(subject.as_str());
        }
        sep.push_unseparated(")");
    }
    if !query.difficulties.is_empty() {
        qb.push(" AND c.difficulty IN (");
        let mut sep = qb.separated(", ");
        for difficulty in &query.difficulties {
            sep.push_bind(difficulty.as_str());
        }
        sep.push_unseparated(")");
    }
    if !query.types.is_empty() {
        qb.push(" AND c.type IN (");
        let mut sep = qb.separated(", ");
        for content_type in &query.types {
            sep.push_bind(content_type.as_str());
        }
        sep.push_unseparated(")");
    }
    if !query.exclude_ids.is_empty() {
        qb.push(" AND c.id NOT IN (");
        let mut sep = qb.separated(", ");
        for id in &query.exclude_ids {
            sep.push_bind(*id);
        }
        sep.push_unseparated(")");
    }

    if query.newest_first {
        qb.push(" ORDER BY c.created_at DESC, c.id DESC");
    } else {
        qb.push(" ORDER BY c.id ASC");
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }

    fetch_items(pool, qb).await
}

// ============ Validation ============

/// Validated fields for a new item.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub title: String,
    pub description: Option<String>,
    pub content_type: ContentType,
    pub url: Option<String>,
    pub subject: String,
    pub difficulty: Difficulty,
    pub tag_ids: Vec<i64>,
    /// Extension of an accepted upload; the caller stores the file.
    pub upload_ext: Option<String>,
}

/// Validated partial update. `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct ContentPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub content_type: Option<ContentType>,
    pub url: Option<String>,
    pub subject: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub tag_ids: Option<Vec<i64>>,
    pub upload_ext: Option<String>,
    pub file_path: Option<String>,
}

/// Report every tag id that does not exist, keyed `tags.{index}`.
async fn check_tags_exist(pool: &SqlitePool, ids: &[i64], errors: &mut Input) -> Result<()> {
    for (i, id) in ids.iter().enumerate() {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_tags WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        if exists == 0 {
            let key = format!("tags.{}", i);
            errors.error(&key, format!("The selected {} is invalid.", key));
        }
    }
    Ok(())
}

fn check_file(
    input: &mut Input,
    content_type: Option<ContentType>,
    upload: Option<&PendingUpload>,
    max_bytes: usize,
) -> Option<String> {
    let (content_type, upload) = (content_type?, upload?);
    match uploads::check_upload(content_type, upload, max_bytes) {
        Ok(ext) => Some(ext),
        Err(message) => {
            input.error("file", message);
            None
        }
    }
}

pub async fn validate_new_content(
    pool: &SqlitePool,
    fields: Map<String, Value>,
    upload: Option<&PendingUpload>,
    max_upload_bytes: usize,
) -> Result<NewContent, ApiError> {
    let mut input = Input::new(fields);

    let title = input.required_str("title", 255);
    let description = input.optional_str("description", usize::MAX);
    let content_type = input.required_enum::<ContentType>("type");
    let subject = input.required_str("subject", 255);
    let difficulty = input.required_enum::<Difficulty>("difficulty");

    let url = match content_type {
        Some(ct) if ct.requires_url() => input.required_url("url", 500),
        _ => input.optional_url("url", 500),
    };

    if let Some(ct) = content_type {
        if !ct.requires_url() && !input.filled("url") && upload.is_none() {
            let message = format!("Either URL or file upload is required for {} content.", ct);
            input.error("url", message.clone());
            input.error("file", message);
        }
    }

    let upload_ext = check_file(&mut input, content_type, upload, max_upload_bytes);
    let tag_ids = input.id_list("tags").unwrap_or_default();
    check_tags_exist(pool, &tag_ids, &mut input).await?;

    match (title, content_type, subject, difficulty) {
        (Some(title), Some(content_type), Some(subject), Some(difficulty))
            if input.errors().is_empty() =>
        {
            Ok(NewContent {
                title,
                description,
                content_type,
                url,
                subject,
                difficulty,
                tag_ids,
                upload_ext,
            })
        }
        _ => Err(ApiError::Validation(input.into_errors())),
    }
}

/// Validate a partial update against the stored item. Fields are checked only
/// when present; an explicit null for a required field is an error.
pub async fn validate_content_patch(
    pool: &SqlitePool,
    existing: &ContentItem,
    fields: Map<String, Value>,
    upload: Option<&PendingUpload>,
    max_upload_bytes: usize,
) -> Result<ContentPatch, ApiError> {
    let mut input = Input::new(fields);
    let mut patch = ContentPatch::default();

    if input.has("title") {
        patch.title = input.required_str("title", 255);
    }
    if input.has("description") {
        patch.description = Some(input.optional_str("description", usize::MAX));
    }
    if input.has("type") {
        patch.content_type = input.required_enum("type");
    }
    if input.has("url") {
        patch.url = input.required_url("url", 500);
    }
    if input.has("subject") {
        patch.subject = input.required_str("subject", 255);
    }
    if input.has("difficulty") {
        patch.difficulty = input.required_enum("difficulty");
    }

    let effective_type = if input.has("type") {
        patch.content_type
    } else {
        Some(existing.content_type)
    };
    if let Some(ct) = effective_type {
        if ct.requires_url()
            && existing.url.is_none()
            && !input.has("url")
            && !input.has_error("type")
        {
            input.error("url", "The url field is required.");
        }
    }

    patch.upload_ext = check_file(&mut input, effective_type, upload, max_upload_bytes);
    patch.tag_ids = input.id_list("tags");
    if let Some(ids) = &patch.tag_ids {
        check_tags_exist(pool, ids, &mut input).await?;
    }

    input.finish()?;
    Ok(patch)
}

// ============ Mutations ============

async fn sync_tags(conn: &mut SqliteConnection, item_id: i64, tag_ids: &[i64]) -> Result<()> {
    sqlx::query("DELETE FROM content_item_tag WHERE content_item_id = ?")
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    for tag_id in tag_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO content_item_tag (content_item_id, content_tag_id) VALUES (?, ?)",
        )
        .bind(item_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn create_content(
    pool: &SqlitePool,
    new: &NewContent,
    created_by: i64,
    file_path: Option<&str>,
) -> Result<ContentItem> {
    let now = now_ts();
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO content_items
            (title, description, type, url, file_path, subject, difficulty, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&new.title)
    .bind(new.description.as_deref())
    .bind(new.content_type.as_str())
    .bind(new.url.as_deref())
    .bind(file_path)
    .bind(&new.subject)
    .bind(new.difficulty.as_str())
    .bind(created_by)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sync_tags(&mut tx, id, &new.tag_ids).await?;
    tx.commit().await?;

    tracing::info!(content_id = id, created_by, "created content item");
    get_content(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("content item {} vanished after insert", id))
}

/// Apply a patch. Returns the updated item, or `None` if it does not exist.
pub async fn update_content(
    pool: &SqlitePool,
    id: i64,
    patch: &ContentPatch,
) -> Result<Option<ContentItem>> {
    let mut tx = pool.begin().await?;

    let (set_description, description) = match &patch.description {
        Some(value) => (true, value.as_deref()),
        None => (false, None),
    };

    let result = sqlx::query(
        r#"
        UPDATE content_items SET
            title = COALESCE(?, title),
            description = CASE WHEN ? THEN ? ELSE description END,
            type = COALESCE(?, type),
            url = COALESCE(?, url),
            file_path = COALESCE(?, file_path),
            subject = COALESCE(?, subject),
            difficulty = COALESCE(?, difficulty),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(patch.title.as_deref())
    .bind(set_description)
    .bind(description)
    .bind(patch.content_type.map(|t| t.as_str()))
    .bind(patch.url.as_deref())
    .bind(patch.file_path.as_deref())
    .bind(patch.subject.as_deref())
    .bind(patch.difficulty.map(|d| d.as_str()))
    .bind(now_ts())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    if let Some(tag_ids) = &patch.tag_ids {
        sync_tags(&mut tx, id, tag_ids).await?;
    }
    tx.commit().await?;

    get_content(pool, id).await
}

/// Delete an item and return it so the caller can clean up its file.
pub async fn delete_content(pool: &SqlitePool, id: i64) -> Result<Option<ContentItem>> {
    let Some(item) = get_content(pool, id).await? else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM content_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    tracing::info!(content_id = id, "deleted content item");
    Ok(Some(item))
}
