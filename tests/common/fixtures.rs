//! Test fixtures for creating test data
#![allow(dead_code)]

use treehole::db::Store;
use treehole::error::ForumError;
use treehole::orm::users;
use treehole::post::{self, ModerationAction, NewPost, PostSubmission, SubmitPolicy};
use treehole::sensitive::SensitiveWords;
use treehole::user::{self, NewUser};

/// Create a test user with known credentials
pub async fn create_test_user(
    store: &Store,
    username: &str,
    password: &str,
) -> Result<users::Model, ForumError> {
    let form = NewUser {
        username: username.to_string(),
        password: password.to_string(),
    };
    user::register(store, &Default::default(), &form).await
}

pub fn policy(super_admin: &str) -> SubmitPolicy<'_> {
    SubmitPolicy {
        auto_ban_on_sensitive: true,
        super_admin,
    }
}

pub fn submission(content: &str, tag: Option<&str>) -> PostSubmission {
    PostSubmission::from_input(
        &NewPost {
            content: Some(content.to_string()),
            category: None,
            tag: tag.map(str::to_string),
        },
        500,
    )
    .expect("fixture submission should be valid")
}

/// Create a post and approve it. Returns the post id.
pub async fn create_approved_post(
    store: &Store,
    author_id: Option<i32>,
    content: &str,
    tag: Option<&str>,
) -> Result<i32, ForumError> {
    let words = SensitiveWords::default();
    let created = post::create_post(
        store,
        &words,
        &submission(content, tag),
        author_id,
        policy(super::SUPER_ADMIN),
        None,
    )
    .await?;
    post::moderate(store, created.id, ModerationAction::Approve, super::SUPER_ADMIN).await?;
    Ok(created.id)
}
