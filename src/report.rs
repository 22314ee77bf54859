//! Post reports and threshold auto-hiding.
//!
//! A logged-in reporter is identified by account. Anyone else is identified
//! by IP, matched against every earlier report from that address, signed in
//! or not. The post's `report_count` is always recounted from the report
//! rows rather than incremented.

use crate::constants::{
    truncate_chars, ANONYMOUS_USERNAME, MAX_REPORT_REASON_LENGTH, REPORT_LIST_LIMIT,
    REPORT_PREVIEW_LENGTH,
};
use crate::db::Store;
use crate::error::ForumError;
use crate::orm::posts::PostStatus;
use crate::orm::{posts, reports};
use crate::post;
use crate::user;
use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    entity::*, query::*, ActiveValue::Set, Condition, ConnectionTrait, PaginatorTrait,
};
use serde::Serialize;
use std::collections::HashMap;

/// Who is reporting.
#[derive(Debug, Clone)]
pub struct Reporter {
    pub user_id: Option<i32>,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub accepted: bool,
    /// This identity already reported the post. Nothing was changed.
    pub duplicate: bool,
    pub auto_hidden: bool,
    pub report_count: u64,
    /// Author of the reported post, for callers that punish on report.
    #[serde(skip)]
    pub post_author_id: Option<i32>,
}

/// Trim and cap a free-text reason. Blank becomes None.
pub fn normalize_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| truncate_chars(r, MAX_REPORT_REASON_LENGTH))
}

/// File a report against an approved post.
///
/// Reaching `hide_threshold` live reports hides the post in the same unit
/// that recorded the report. A threshold of 0 disables auto-hiding. Banning
/// the author is left to the caller.
pub async fn report_post(
    store: &Store,
    post_id: i32,
    reporter: &Reporter,
    reason: Option<&str>,
    hide_threshold: u64,
) -> Result<ReportOutcome, ForumError> {
    let reason = normalize_reason(reason);

    let write = store.begin_write().await?;
    if let Some(uid) = reporter.user_id {
        user::ensure_active(write.txn(), uid).await?;
    }
    let target = post::find_approved(write.txn(), post_id).await?;

    let same_identity = match reporter.user_id {
        Some(uid) => Condition::all().add(reports::Column::ReporterUserId.eq(uid)),
        None => Condition::all().add(reports::Column::ReporterIp.eq(reporter.ip.as_str())),
    };
    let existing = reports::Entity::find()
        .filter(reports::Column::PostId.eq(post_id))
        .filter(same_identity)
        .one(write.txn())
        .await?;
    if existing.is_some() {
        return Ok(ReportOutcome {
            accepted: false,
            duplicate: true,
            auto_hidden: false,
            report_count: target.report_count.max(0) as u64,
            post_author_id: target.user_id,
        });
    }

    reports::ActiveModel {
        post_id: Set(post_id),
        reporter_user_id: Set(reporter.user_id),
        reporter_ip: Set(reporter.ip.clone()),
        reason: Set(reason),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(write.txn())
    .await?;

    let count = reports::Entity::find()
        .filter(reports::Column::PostId.eq(post_id))
        .count(write.txn())
        .await?;

    // The post was read as approved under the write lock, so it still is.
    let auto_hidden = hide_threshold > 0 && count >= hide_threshold;
    let author_id = target.user_id;
    let mut active: posts::ActiveModel = target.into();
    active.report_count = Set(i32::try_from(count).unwrap_or(i32::MAX));
    if auto_hidden {
        active.status = Set(PostStatus::Hidden);
    }
    active.update(write.txn()).await?;
    write.commit().await?;

    if auto_hidden {
        log::info!(
            "Post {} hidden automatically after {} reports",
            post_id,
            count
        );
    }

    Ok(ReportOutcome {
        accepted: true,
        duplicate: false,
        auto_hidden,
        report_count: count,
        post_author_id: author_id,
    })
}

/// A report as shown to the admin. Post fields are None once the post is deleted.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: i32,
    pub post_id: i32,
    pub reason: Option<String>,
    pub reporter_ip: String,
    pub reporter_username: String,
    pub post_status: Option<PostStatus>,
    pub total_reports: Option<i32>,
    pub post_preview: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Newest first.
pub async fn list_reports<C: ConnectionTrait>(conn: &C) -> Result<Vec<ReportView>, ForumError> {
    let rows = reports::Entity::find()
        .order_by_desc(reports::Column::Id)
        .limit(REPORT_LIST_LIMIT)
        .all(conn)
        .await?;

    let mut post_ids: Vec<i32> = rows.iter().map(|r| r.post_id).collect();
    post_ids.sort_unstable();
    post_ids.dedup();
    let targets: HashMap<i32, posts::Model> = if post_ids.is_empty() {
        HashMap::new()
    } else {
        posts::Entity::find()
            .filter(posts::Column::Id.is_in(post_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    let names = post::usernames(conn, rows.iter().filter_map(|r| r.reporter_user_id)).await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let target = targets.get(&r.post_id);
            ReportView {
                reporter_username: r
                    .reporter_user_id
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string()),
                post_status: target.map(|p| p.status),
                total_reports: target.map(|p| p.report_count),
                post_preview: target.map(|p| truncate_chars(&p.content, REPORT_PREVIEW_LENGTH)),
                id: r.id,
                post_id: r.post_id,
                reason: r.reason,
                reporter_ip: r.reporter_ip,
                created_at: r.created_at,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_reason() {
        assert_eq!(normalize_reason(None), None);
        assert_eq!(normalize_reason(Some("   ")), None);
        assert_eq!(normalize_reason(Some(" spam ")), Some("spam".to_string()));

        let long = "r".repeat(200);
        assert_eq!(
            normalize_reason(Some(&long)).unwrap().chars().count(),
            MAX_REPORT_REASON_LENGTH
        );
    }
}
