//! Post lifecycle: submission, moderation transitions, comments, votes and
//! the read-only listings built on top of them.
//!
//! Only approved posts are visible outside the admin queue. Deletion removes
//! the row; comments, votes and reports stay behind as records.

use crate::classifier::Verdict;
use crate::constants::{
    truncate_chars, ANONYMOUS_USERNAME, BAN_REASON_MAX_HITS, COMMENT_LIMIT, HOT_LIMIT,
    MAX_TAG_LENGTH, SEARCH_LIMIT, TOPIC_LIMIT,
};
use crate::db::Store;
use crate::error::ForumError;
use crate::orm::posts::{Category, PostStatus};
use crate::orm::{comments, post_votes, posts, users};
use crate::sensitive::SensitiveWords;
use crate::user;
use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::{Expr, Func, LikeExpr, OnConflict, Query};
use sea_orm::{entity::*, query::*, ActiveValue::Set, Condition, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw post submission body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPost {
    pub content: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
}

/// A submission that passed input validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PostSubmission {
    pub content: String,
    pub category: Category,
    pub tag: Option<String>,
}

impl PostSubmission {
    /// Trim and check a submission. Tags are truncated rather than rejected.
    pub fn from_input(input: &NewPost, max_content_length: usize) -> Result<Self, ForumError> {
        let content = input.content.as_deref().unwrap_or("").trim();
        if content.is_empty() {
            return Err(ForumError::validation("content required"));
        }
        if content.chars().count() > max_content_length {
            return Err(ForumError::Validation(format!(
                "content too long (max {})",
                max_content_length
            )));
        }

        let category = match input.category.as_deref().map(str::trim) {
            None | Some("") => Category::General,
            Some(raw) => Category::parse(&raw.to_lowercase())
                .ok_or_else(|| ForumError::validation("invalid category"))?,
        };

        let tag = input
            .tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| truncate_chars(t, MAX_TAG_LENGTH));

        Ok(Self {
            content: content.to_owned(),
            category,
            tag,
        })
    }

    /// Sensitive words found in the content or tag.
    pub fn scan(&self, words: &SensitiveWords) -> Vec<String> {
        words.scan(&[Some(self.content.as_str()), self.tag.as_deref()])
    }
}

/// Submission-time moderation settings.
#[derive(Debug, Clone, Copy)]
pub struct SubmitPolicy<'a> {
    pub auto_ban_on_sensitive: bool,
    pub super_admin: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPost {
    pub id: i32,
    pub status: PostStatus,
    pub flagged: bool,
    pub sensitive_hits: Vec<String>,
}

/// Store a new post as pending or flagged.
///
/// An authenticated author whose submission hits the word list is banned
/// instead, when the policy says so, and no post is created. A classifier
/// verdict only matters when the word scan is clean.
pub async fn create_post(
    store: &Store,
    words: &SensitiveWords,
    submission: &PostSubmission,
    author_id: Option<i32>,
    policy: SubmitPolicy<'_>,
    verdict: Option<&Verdict>,
) -> Result<CreatedPost, ForumError> {
    let hits = submission.scan(words);

    let write = store.begin_write().await?;
    if let Some(uid) = author_id {
        user::ensure_active(write.txn(), uid).await?;
    }

    if !hits.is_empty() && policy.auto_ban_on_sensitive {
        if let Some(uid) = author_id {
            let quoted: Vec<&str> = hits
                .iter()
                .take(BAN_REASON_MAX_HITS)
                .map(String::as_str)
                .collect();
            let reason = format!("sensitive content: {}", quoted.join(", "));
            let account_banned = user::ban_in(write.txn(), policy.super_admin, uid, &reason).await?;
            write.commit().await?;

            log::warn!(
                "Blocked post with sensitive content: user_id={} hits={} banned={}",
                uid,
                hits.len(),
                account_banned
            );
            return Err(ForumError::ContentBanned {
                hits,
                account_banned,
            });
        }
    }

    let (status, review_note) = if !hits.is_empty() {
        (PostStatus::Flagged, None)
    } else {
        match verdict {
            Some(v) if !v.is_safe => (PostStatus::Flagged, Some(format!("ai: {}", v.reason))),
            _ => (PostStatus::Pending, None),
        }
    };

    let post = posts::ActiveModel {
        user_id: Set(author_id),
        category: Set(submission.category),
        content: Set(submission.content.clone()),
        tag: Set(submission.tag.clone()),
        sensitive_hits: Set((!hits.is_empty()).then(|| hits.join(","))),
        review_note: Set(review_note),
        status: Set(status),
        report_count: Set(0),
        created_at: Set(Utc::now().naive_utc()),
        approved_at: Set(None),
        ..Default::default()
    }
    .insert(write.txn())
    .await?;
    write.commit().await?;

    log::debug!("Post {} created with status {}", post.id, status.as_str());
    Ok(CreatedPost {
        id: post.id,
        status,
        flagged: status == PostStatus::Flagged,
        sensitive_hits: hits,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Approve,
    Hide,
    Delete,
}

impl ModerationAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "approve" => Some(Self::Approve),
            "hide" => Some(Self::Hide),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// States this action may leave from. Delete applies to any post.
    fn allowed_from(&self) -> &'static [PostStatus] {
        match self {
            Self::Approve => &[PostStatus::Pending, PostStatus::Flagged],
            Self::Hide => &[PostStatus::Pending, PostStatus::Flagged, PostStatus::Approved],
            Self::Delete => &[
                PostStatus::Pending,
                PostStatus::Flagged,
                PostStatus::Approved,
                PostStatus::Hidden,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub post_id: i32,
    pub action: ModerationAction,
    /// Set on delete when the author existed and was not protected.
    pub author_banned: bool,
}

/// Apply an admin decision. Deleting a post bans its author in the same unit.
pub async fn moderate(
    store: &Store,
    post_id: i32,
    action: ModerationAction,
    super_admin: &str,
) -> Result<ModerationOutcome, ForumError> {
    let write = store.begin_write().await?;
    let post = posts::Entity::find_by_id(post_id)
        .one(write.txn())
        .await?
        .ok_or_else(ForumError::post_not_found)?;

    if !action.allowed_from().contains(&post.status) {
        return Err(ForumError::Validation(format!(
            "cannot {} a {} post",
            match action {
                ModerationAction::Approve => "approve",
                ModerationAction::Hide => "hide",
                ModerationAction::Delete => "delete",
            },
            post.status.as_str()
        )));
    }

    let mut author_banned = false;
    match action {
        ModerationAction::Approve => {
            let mut active: posts::ActiveModel = post.into();
            active.status = Set(PostStatus::Approved);
            active.approved_at = Set(Some(Utc::now().naive_utc()));
            active.update(write.txn()).await?;
        }
        ModerationAction::Hide => {
            let mut active: posts::ActiveModel = post.into();
            active.status = Set(PostStatus::Hidden);
            active.update(write.txn()).await?;
        }
        ModerationAction::Delete => {
            let author_id = post.user_id;
            posts::Entity::delete_by_id(post_id)
                .exec(write.txn())
                .await?;
            if let Some(uid) = author_id {
                let reason = format!("post deleted by admin #{}", post_id);
                author_banned = user::ban_in(write.txn(), super_admin, uid, &reason).await?;
            }
        }
    }
    write.commit().await?;

    log::info!("Moderation: post_id={} action={:?}", post_id, action);
    Ok(ModerationOutcome {
        post_id,
        action,
        author_banned,
    })
}

/// Fetch a post that is currently approved, or fail without revealing
/// whether it exists.
pub async fn find_approved<C: ConnectionTrait>(
    conn: &C,
    post_id: i32,
) -> Result<posts::Model, ForumError> {
    posts::Entity::find_by_id(post_id)
        .filter(posts::Column::Status.eq(PostStatus::Approved))
        .one(conn)
        .await?
        .ok_or_else(|| ForumError::not_found("post not found or not approved"))
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i32,
    pub post_id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub username: String,
}

pub async fn add_comment(
    store: &Store,
    post_id: i32,
    user_id: i32,
    content: &str,
    max_comment_length: usize,
) -> Result<comments::Model, ForumError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ForumError::validation("comment required"));
    }
    if content.chars().count() > max_comment_length {
        return Err(ForumError::Validation(format!(
            "comment too long (max {})",
            max_comment_length
        )));
    }

    let write = store.begin_write().await?;
    user::ensure_active(write.txn(), user_id).await?;
    find_approved(write.txn(), post_id).await?;

    let comment = comments::ActiveModel {
        post_id: Set(post_id),
        user_id: Set(user_id),
        content: Set(content.to_owned()),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(write.txn())
    .await?;
    write.commit().await?;

    Ok(comment)
}

/// Oldest first.
pub async fn list_comments<C: ConnectionTrait>(
    conn: &C,
    post_id: i32,
) -> Result<Vec<CommentView>, ForumError> {
    find_approved(conn, post_id).await?;

    let rows = comments::Entity::find()
        .filter(comments::Column::PostId.eq(post_id))
        .order_by_asc(comments::Column::Id)
        .limit(COMMENT_LIMIT)
        .all(conn)
        .await?;

    let names = usernames(conn, rows.iter().map(|c| c.user_id)).await?;
    Ok(rows
        .into_iter()
        .map(|c| CommentView {
            username: display_name(&names, Some(c.user_id)),
            id: c.id,
            post_id: c.post_id,
            content: c.content,
            created_at: c.created_at,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    /// True when an earlier vote was overwritten.
    pub updated: bool,
}

/// Record `value` (+1 or -1) as this user's vote, replacing any earlier one.
pub async fn cast_vote(
    store: &Store,
    post_id: i32,
    user_id: i32,
    value: i32,
) -> Result<VoteOutcome, ForumError> {
    if value != 1 && value != -1 {
        return Err(ForumError::validation("vote value must be 1 or -1"));
    }

    let write = store.begin_write().await?;
    user::ensure_active(write.txn(), user_id).await?;
    find_approved(write.txn(), post_id).await?;

    let existing = post_votes::Entity::find_by_id((post_id, user_id))
        .one(write.txn())
        .await?;

    let now = Utc::now().naive_utc();
    post_votes::Entity::insert(post_votes::ActiveModel {
        post_id: Set(post_id),
        user_id: Set(user_id),
        value: Set(value),
        created_at: Set(now),
        updated_at: Set(now),
    })
    .on_conflict(
        OnConflict::columns([post_votes::Column::PostId, post_votes::Column::UserId])
            .update_columns([post_votes::Column::Value, post_votes::Column::UpdatedAt])
            .to_owned(),
    )
    .exec_without_returning(write.txn())
    .await?;
    write.commit().await?;

    Ok(VoteOutcome {
        updated: existing.is_some(),
    })
}

/// `comments*3 + votes*4 + reports*2`, where votes is the net score.
pub fn hot_score(comment_count: u64, vote_score: i64, report_count: i32) -> i64 {
    comment_count as i64 * 3 + vote_score * 4 + i64::from(report_count) * 2
}

/// A post as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: i32,
    pub category: Category,
    pub content: String,
    pub tag: Option<String>,
    pub status: PostStatus,
    pub report_count: i32,
    pub created_at: NaiveDateTime,
    pub approved_at: Option<NaiveDateTime>,
    pub username: String,
    pub comment_count: u64,
    pub like_count: u64,
    pub dislike_count: u64,
    pub vote_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot_score: Option<i64>,
    // Admin listings only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_hits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    Admin,
}

fn display_name(names: &HashMap<i32, String>, user_id: Option<i32>) -> String {
    user_id
        .and_then(|id| names.get(&id).cloned())
        .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string())
}

pub(crate) async fn usernames<C, I>(conn: &C, ids: I) -> Result<HashMap<i32, String>, DbErr>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i32>,
{
    let mut ids: Vec<i32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    Ok(users::Entity::find()
        .filter(users::Column::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect())
}

/// Attach author names, comment counts and vote tallies.
pub async fn to_views<C: ConnectionTrait>(
    conn: &C,
    rows: Vec<posts::Model>,
    audience: Audience,
) -> Result<Vec<PostView>, DbErr> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|p| p.id).collect();

    let names = usernames(conn, rows.iter().filter_map(|p| p.user_id)).await?;

    let comment_counts: HashMap<i32, i64> = comments::Entity::find()
        .select_only()
        .column(comments::Column::PostId)
        .column_as(Expr::col(comments::Column::Id).count(), "count")
        .filter(comments::Column::PostId.is_in(ids.clone()))
        .group_by(comments::Column::PostId)
        .into_tuple::<(i32, i64)>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    // (likes, dislikes) per post
    let mut tallies: HashMap<i32, (u64, u64)> = HashMap::new();
    for vote in post_votes::Entity::find()
        .filter(post_votes::Column::PostId.is_in(ids))
        .all(conn)
        .await?
    {
        let tally = tallies.entry(vote.post_id).or_default();
        if vote.value > 0 {
            tally.0 += 1;
        } else if vote.value < 0 {
            tally.1 += 1;
        }
    }

    Ok(rows
        .into_iter()
        .map(|p| {
            let (like_count, dislike_count) = tallies.get(&p.id).copied().unwrap_or_default();
            let admin = audience == Audience::Admin;
            PostView {
                username: display_name(&names, p.user_id),
                comment_count: comment_counts.get(&p.id).copied().unwrap_or(0).max(0) as u64,
                like_count,
                dislike_count,
                vote_score: like_count as i64 - dislike_count as i64,
                hot_score: None,
                sensitive_hits: if admin { p.sensitive_hits } else { None },
                review_note: if admin { p.review_note } else { None },
                id: p.id,
                category: p.category,
                content: p.content,
                tag: p.tag,
                status: p.status,
                report_count: p.report_count,
                created_at: p.created_at,
                approved_at: p.approved_at,
            }
        })
        .collect())
}

/// Newest first.
pub async fn list_by_status<C: ConnectionTrait>(
    conn: &C,
    status: PostStatus,
    limit: u64,
    audience: Audience,
) -> Result<Vec<PostView>, ForumError> {
    let rows = posts::Entity::find()
        .filter(posts::Column::Status.eq(status))
        .order_by_desc(posts::Column::Id)
        .limit(limit)
        .all(conn)
        .await?;
    Ok(to_views(conn, rows, audience).await?)
}

/// Public feed: approved posts, newest first.
pub async fn list_approved<C: ConnectionTrait>(
    conn: &C,
    limit: u64,
) -> Result<Vec<PostView>, ForumError> {
    list_by_status(conn, PostStatus::Approved, limit, Audience::Public).await
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Case-insensitive substring search over approved posts: content, tag,
/// category, author name and comment text. A blank query matches nothing.
pub async fn search<C: ConnectionTrait>(conn: &C, q: &str) -> Result<Vec<PostView>, ForumError> {
    let q = q.trim().to_lowercase();
    if q.is_empty() {
        return Ok(Vec::new());
    }
    let pattern = format!("%{}%", escape_like(&q));
    let like = || LikeExpr::new(pattern.clone()).escape('\\');

    let authors = Query::select()
        .column(users::Column::Id)
        .from(users::Entity)
        .and_where(Expr::col(users::Column::UsernameKey).like(like()))
        .to_owned();
    let commented = Query::select()
        .column(comments::Column::PostId)
        .from(comments::Entity)
        .and_where(Expr::expr(Func::lower(Expr::col(comments::Column::Content))).like(like()))
        .to_owned();

    let rows = posts::Entity::find()
        .filter(posts::Column::Status.eq(PostStatus::Approved))
        .filter(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col(posts::Column::Content))).like(like()))
                .add(Expr::expr(Func::lower(Expr::col(posts::Column::Tag))).like(like()))
                .add(Expr::col(posts::Column::Category).like(like()))
                .add(posts::Column::UserId.in_subquery(authors))
                .add(posts::Column::Id.in_subquery(commented)),
        )
        .order_by_desc(posts::Column::Id)
        .limit(SEARCH_LIMIT)
        .all(conn)
        .await?;

    Ok(to_views(conn, rows, Audience::Public).await?)
}

/// Approved posts whose tag equals `tag` case-insensitively. Returns the
/// normalized tag alongside the posts.
pub async fn list_by_tag<C: ConnectionTrait>(
    conn: &C,
    tag: &str,
) -> Result<(String, Vec<PostView>), ForumError> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return Err(ForumError::validation("tag required"));
    }

    let rows = posts::Entity::find()
        .filter(posts::Column::Status.eq(PostStatus::Approved))
        .filter(Expr::expr(Func::lower(Expr::col(posts::Column::Tag))).eq(tag.as_str()))
        .order_by_desc(posts::Column::Id)
        .limit(TOPIC_LIMIT)
        .all(conn)
        .await?;

    let views = to_views(conn, rows, Audience::Public).await?;
    Ok((tag, views))
}

/// Approved posts ranked by hot score, ties to the newer post.
pub async fn hot<C: ConnectionTrait>(conn: &C) -> Result<Vec<PostView>, ForumError> {
    let rows = posts::Entity::find()
        .filter(posts::Column::Status.eq(PostStatus::Approved))
        .all(conn)
        .await?;

    let mut views = to_views(conn, rows, Audience::Public).await?;
    for view in views.iter_mut() {
        view.hot_score = Some(hot_score(
            view.comment_count,
            view.vote_score,
            view.report_count,
        ));
    }
    views.sort_by(|a, b| b.hot_score.cmp(&a.hot_score).then(b.id.cmp(&a.id)));
    views.truncate(HOT_LIMIT);

    Ok(views)
}
