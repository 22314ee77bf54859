//! Server-side sessions backing the login cookie.
//!
//! Expiry is enforced when a token is resolved. There is no sweeper; expired
//! rows are purged in bulk by the next resolve call.

use crate::db::Store;
use crate::orm::{sessions, users};
use chrono::{NaiveDateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{entity::*, query::*, ActiveValue::Set, ConnectionTrait, DbErr};

/// 43 alphanumeric characters, a little over 256 bits.
const TOKEN_LENGTH: usize = 43;

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Create a session for `user_id` expiring `ttl` from now.
pub async fn issue(store: &Store, user_id: i32, ttl: chrono::Duration) -> Result<String, DbErr> {
    let token = generate_token();
    let now = Utc::now().naive_utc();

    let write = store.begin_write().await?;
    sessions::ActiveModel {
        token: Set(token.clone()),
        user_id: Set(user_id),
        expires_at: Set(now + ttl),
        created_at: Set(now),
    }
    .insert(write.txn())
    .await?;
    write.commit().await?;

    Ok(token)
}

/// Return the user owning `token`, if it exists and has not expired.
///
/// Every expired session is purged first, not only this one. The write lock
/// is taken only when there is something to purge, so requests carrying a
/// live cookie do not queue behind writers.
pub async fn resolve(store: &Store, token: &str) -> Result<Option<users::Model>, DbErr> {
    let now = Utc::now().naive_utc();

    let expired = sessions::Entity::find()
        .filter(sessions::Column::ExpiresAt.lte(now))
        .one(store.conn())
        .await?;
    if expired.is_some() {
        purge_expired(store, now).await?;
    }

    let found = sessions::Entity::find_by_id(token.to_owned())
        .filter(sessions::Column::ExpiresAt.gt(now))
        .find_also_related(users::Entity)
        .one(store.conn())
        .await?;

    Ok(found.and_then(|(_, user)| user))
}

async fn purge_expired(store: &Store, now: NaiveDateTime) -> Result<(), DbErr> {
    let write = store.begin_write().await?;
    let purged = sessions::Entity::delete_many()
        .filter(sessions::Column::ExpiresAt.lte(now))
        .exec(write.txn())
        .await?;
    write.commit().await?;

    if purged.rows_affected > 0 {
        log::debug!("Purged {} expired sessions", purged.rows_affected);
    }
    Ok(())
}

pub async fn revoke(store: &Store, token: &str) -> Result<(), DbErr> {
    let write = store.begin_write().await?;
    sessions::Entity::delete_by_id(token.to_owned())
        .exec(write.txn())
        .await?;
    write.commit().await
}

/// Delete every session of `user_id`. Runs on the caller's connection so a
/// ban and its revocation commit together.
pub async fn revoke_all<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<u64, DbErr> {
    let res = sessions::Entity::delete_many()
        .filter(sessions::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(res.rows_affected)
}
