//! Credential store: registration, password verification and bans.

use crate::db::Store;
use crate::error::ForumError;
use crate::orm::users;
use crate::session;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ActiveValue::Set, ConnectionTrait, DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,24}$").expect("username pattern is valid"));

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct NewUser {
    #[validate(regex(
        path = "USERNAME_RE",
        message = "username must be 3-24 chars: letters, numbers, underscore"
    ))]
    pub username: String,
    #[validate(length(min = 8, message = "password must be at least 8 chars"))]
    pub password: String,
}

/// Public view of an account. Never carries the digest.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
}

impl From<&users::Model> for UserView {
    fn from(user: &users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
            is_banned: user.is_banned,
            ban_reason: user.ban_reason.clone(),
        }
    }
}

fn hash_password(password: &str) -> Result<String, ForumError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ForumError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, digest: &str) -> bool {
    match PasswordHash::new(digest) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password digest is unreadable: {}", e);
            false
        }
    }
}

/// True if `username` names the protected super-admin, ignoring case.
/// An empty `super_admin` protects nobody.
pub fn is_protected(username: &str, super_admin: &str) -> bool {
    !super_admin.is_empty() && username.to_lowercase() == super_admin.to_lowercase()
}

/// Create an account. Usernames are unique case-insensitively.
///
/// `admin_usernames` holds lower-cased names granted `is_admin` on creation.
pub async fn register(
    store: &Store,
    admin_usernames: &HashSet<String>,
    form: &NewUser,
) -> Result<users::Model, ForumError> {
    let form = NewUser {
        username: form.username.trim().to_owned(),
        password: form.password.clone(),
    };
    form.validate()?;

    let key = form.username.to_lowercase();
    // Hash before taking the write lock.
    let digest = hash_password(&form.password)?;

    let write = store.begin_write().await?;
    let existing = users::Entity::find()
        .filter(users::Column::UsernameKey.eq(key.as_str()))
        .one(write.txn())
        .await?;
    if existing.is_some() {
        return Err(ForumError::Conflict("username already exists".to_string()));
    }

    let user = users::ActiveModel {
        username: Set(form.username.clone()),
        username_key: Set(key.clone()),
        password_digest: Set(digest),
        is_admin: Set(admin_usernames.contains(&key)),
        is_banned: Set(false),
        ban_reason: Set(None),
        banned_at: Set(None),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(write.txn())
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ForumError::Conflict("username already exists".to_string())
        }
        _ => ForumError::Database(e),
    })?;
    write.commit().await?;

    log::info!("New user registered: user_id={}", user.id);
    Ok(user)
}

/// Verify credentials. A banned account still authenticates here; session
/// issuance is where the ban is enforced.
pub async fn authenticate<C: ConnectionTrait>(
    conn: &C,
    username: &str,
    password: &str,
) -> Result<users::Model, ForumError> {
    let invalid = || ForumError::Unauthorized("invalid username or password".to_string());

    let user = users::Entity::find()
        .filter(users::Column::UsernameKey.eq(username.trim().to_lowercase()))
        .one(conn)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(password, &user.password_digest) {
        log::debug!("Login failed: bad password for user_id={}", user.id);
        return Err(invalid());
    }

    Ok(user)
}

/// Message returned to a banned account on every write path.
pub fn ban_message(reason: Option<&str>) -> String {
    format!(
        "account banned: {}",
        reason.unwrap_or(crate::constants::DEFAULT_BAN_REASON)
    )
}

/// Fail with `Forbidden` if the account is banned, `Unauthorized` if it is gone.
pub async fn ensure_active<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<(), ForumError> {
    match find_by_id(conn, user_id).await? {
        None => Err(ForumError::Unauthorized("login required".to_string())),
        Some(user) if user.is_banned => {
            Err(ForumError::Forbidden(ban_message(user.ban_reason.as_deref())))
        }
        Some(_) => Ok(()),
    }
}

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find_by_id(user_id).one(conn).await
}

/// Ban a user and revoke every session they hold, as one unit.
///
/// Returns false when the user does not exist or is the protected super-admin.
pub async fn ban(
    store: &Store,
    super_admin: &str,
    user_id: i32,
    reason: &str,
) -> Result<bool, ForumError> {
    let write = store.begin_write().await?;
    let banned = ban_in(write.txn(), super_admin, user_id, reason).await?;
    write.commit().await?;
    Ok(banned)
}

/// [`ban`] inside an already open write transaction.
pub async fn ban_in<C: ConnectionTrait>(
    conn: &C,
    super_admin: &str,
    user_id: i32,
    reason: &str,
) -> Result<bool, DbErr> {
    let user = match find_by_id(conn, user_id).await? {
        Some(user) => user,
        None => return Ok(false),
    };

    if is_protected(&user.username, super_admin) {
        log::warn!(
            "Ignored ban of protected account: user_id={} reason={}",
            user_id,
            reason
        );
        return Ok(false);
    }

    let mut active: users::ActiveModel = user.into();
    active.is_banned = Set(true);
    active.ban_reason = Set(Some(reason.to_owned()));
    active.banned_at = Set(Some(Utc::now().naive_utc()));
    active.update(conn).await?;

    let revoked = session::revoke_all(conn, user_id).await?;
    log::warn!(
        "User banned: user_id={} reason={} sessions_revoked={}",
        user_id,
        reason,
        revoked
    );

    Ok(true)
}

/// Lift a ban. Returns false for an unknown user.
pub async fn unban(store: &Store, user_id: i32) -> Result<bool, ForumError> {
    let write = store.begin_write().await?;
    let res = users::Entity::update_many()
        .col_expr(users::Column::IsBanned, Expr::value(false))
        .col_expr(users::Column::BanReason, Expr::value(Option::<String>::None))
        .col_expr(
            users::Column::BannedAt,
            Expr::value(Option::<chrono::NaiveDateTime>::None),
        )
        .filter(users::Column::Id.eq(user_id))
        .exec(write.txn())
        .await?;
    write.commit().await?;

    if res.rows_affected > 0 {
        log::info!("User unbanned: user_id={}", user_id);
    }
    Ok(res.rows_affected > 0)
}
