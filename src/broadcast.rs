//! Site announcements. Append-only.

use crate::constants::{
    truncate_chars, BROADCAST_LIMIT, MAX_BROADCAST_CONTENT_LENGTH, MAX_BROADCAST_TITLE_LENGTH,
    SYSTEM_AUTHOR,
};
use crate::db::Store;
use crate::error::ForumError;
use crate::orm::broadcasts;
use crate::post;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBroadcast {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastView {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub author: String,
}

/// Title and content are both required. Overlong input is cut, not refused.
pub async fn publish(
    store: &Store,
    input: &NewBroadcast,
    created_by: Option<i32>,
) -> Result<broadcasts::Model, ForumError> {
    let title = input.title.as_deref().unwrap_or("").trim();
    let content = input.content.as_deref().unwrap_or("").trim();
    if title.is_empty() || content.is_empty() {
        return Err(ForumError::validation("title and content required"));
    }

    let write = store.begin_write().await?;
    let model = broadcasts::ActiveModel {
        title: Set(truncate_chars(title, MAX_BROADCAST_TITLE_LENGTH)),
        content: Set(truncate_chars(content, MAX_BROADCAST_CONTENT_LENGTH)),
        created_by: Set(created_by),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(write.txn())
    .await?;
    write.commit().await?;

    log::info!("Broadcast {} published", model.id);
    Ok(model)
}

/// Newest first.
pub async fn list<C: ConnectionTrait>(conn: &C) -> Result<Vec<BroadcastView>, ForumError> {
    let rows = broadcasts::Entity::find()
        .order_by_desc(broadcasts::Column::Id)
        .limit(BROADCAST_LIMIT)
        .all(conn)
        .await?;

    let names = post::usernames(conn, rows.iter().filter_map(|b| b.created_by)).await?;
    Ok(rows
        .into_iter()
        .map(|b| BroadcastView {
            author: b
                .created_by
                .and_then(|id| names.get(&id).cloned())
                .unwrap_or_else(|| SYSTEM_AUTHOR.to_string()),
            id: b.id,
            title: b.title,
            content: b.content,
            created_at: b.created_at,
        })
        .collect())
}
