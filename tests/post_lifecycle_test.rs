mod common;

use common::database::{setup_file_store, setup_test_store};
use common::fixtures::{create_approved_post, create_test_user, policy, submission};
use common::SUPER_ADMIN;
use treehole::classifier::Verdict;
use treehole::error::ForumError;
use treehole::orm::posts::PostStatus;
use treehole::orm::{post_votes, posts};
use treehole::post::{self, Audience, ModerationAction};
use treehole::report::{self, Reporter};
use treehole::sensitive::SensitiveWords;
use treehole::session;
use treehole::user;
use futures::future::join_all;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

fn words() -> SensitiveWords {
    SensitiveWords::new(["forbidden", "spamword1"])
}

#[actix_rt::test]
async fn test_clean_post_is_pending() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();

    let created = post::create_post(
        &store,
        &words(),
        &submission("hello", None),
        Some(alice.id),
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap();

    assert_eq!(created.status, PostStatus::Pending);
    assert!(!created.flagged);
    assert!(created.sensitive_hits.is_empty());

    // Not public until approved
    assert!(post::list_approved(store.conn(), 20).await.unwrap().is_empty());
}

#[actix_rt::test]
async fn test_sensitive_post_bans_authenticated_author() {
    let store = setup_test_store().await.unwrap();
    let mallory = create_test_user(&store, "mallory", "password123").await.unwrap();

    let err = post::create_post(
        &store,
        &words(),
        &submission("this is FORBIDDEN talk", Some("spamword1")),
        Some(mallory.id),
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap_err();

    match err {
        ForumError::ContentBanned {
            hits,
            account_banned,
        } => {
            assert_eq!(hits, vec!["forbidden".to_string(), "spamword1".to_string()]);
            assert!(account_banned);
        }
        other => panic!("expected ContentBanned, got {:?}", other),
    }

    assert_eq!(posts::Entity::find().count(store.conn()).await.unwrap(), 0);
    let mallory = user::find_by_id(store.conn(), mallory.id).await.unwrap().unwrap();
    assert!(mallory.is_banned);
    assert_eq!(
        mallory.ban_reason.as_deref(),
        Some("sensitive content: forbidden, spamword1")
    );
}

#[actix_rt::test]
async fn test_sensitive_post_from_super_admin_is_refused_without_ban() {
    let store = setup_test_store().await.unwrap();
    let root = create_test_user(&store, "SignupBook", "password123").await.unwrap();
    let token = session::issue(&store, root.id, chrono::Duration::days(1))
        .await
        .unwrap();

    let err = post::create_post(
        &store,
        &words(),
        &submission("forbidden words", None),
        Some(root.id),
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        ForumError::ContentBanned {
            account_banned: false,
            ..
        }
    ));
    assert_eq!(err.to_string(), "post blocked due to sensitive content");
    assert_eq!(posts::Entity::find().count(store.conn()).await.unwrap(), 0);

    let root = user::find_by_id(store.conn(), root.id).await.unwrap().unwrap();
    assert!(!root.is_banned);
    assert!(session::resolve(&store, &token).await.unwrap().is_some());
}

#[actix_rt::test]
async fn test_sensitive_post_is_flagged_for_anonymous_or_without_auto_ban() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();

    let anonymous = post::create_post(
        &store,
        &words(),
        &submission("forbidden", None),
        None,
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap();
    assert_eq!(anonymous.status, PostStatus::Flagged);
    assert_eq!(anonymous.sensitive_hits, vec!["forbidden".to_string()]);

    let lenient = post::SubmitPolicy {
        auto_ban_on_sensitive: false,
        super_admin: SUPER_ADMIN,
    };
    let flagged = post::create_post(
        &store,
        &words(),
        &submission("forbidden", None),
        Some(alice.id),
        lenient,
        None,
    )
    .await
    .unwrap();
    assert!(flagged.flagged);

    let alice = user::find_by_id(store.conn(), alice.id).await.unwrap().unwrap();
    assert!(!alice.is_banned);

    let queue = post::list_by_status(store.conn(), PostStatus::Flagged, 20, Audience::Admin)
        .await
        .unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].sensitive_hits.as_deref(), Some("forbidden"));
}

#[actix_rt::test]
async fn test_unsafe_verdict_flags_without_ban() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();

    let verdict = Verdict::unsafe_because("political");
    let created = post::create_post(
        &store,
        &words(),
        &submission("an ordinary sentence", None),
        Some(alice.id),
        policy(SUPER_ADMIN),
        Some(&verdict),
    )
    .await
    .unwrap();
    assert_eq!(created.status, PostStatus::Flagged);

    let row = posts::Entity::find_by_id(created.id)
        .one(store.conn())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.review_note.as_deref(), Some("ai: political"));
    assert!(!user::find_by_id(store.conn(), alice.id).await.unwrap().unwrap().is_banned);
}

#[actix_rt::test]
async fn test_banned_author_cannot_post() {
    let store = setup_test_store().await.unwrap();
    let bob = create_test_user(&store, "bob", "password123").await.unwrap();
    user::ban(&store, SUPER_ADMIN, bob.id, "spam").await.unwrap();

    let err = post::create_post(
        &store,
        &words(),
        &submission("hello", None),
        Some(bob.id),
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ForumError::Forbidden(_)));
}

#[actix_rt::test]
async fn test_moderation_transitions() {
    let store = setup_test_store().await.unwrap();
    let id = create_approved_post(&store, None, "hello", None).await.unwrap();

    let row = posts::Entity::find_by_id(id).one(store.conn()).await.unwrap().unwrap();
    assert_eq!(row.status, PostStatus::Approved);
    assert!(row.approved_at.is_some());

    // Approved posts cannot be approved again
    let err = post::moderate(&store, id, ModerationAction::Approve, SUPER_ADMIN)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cannot approve a approved post");

    post::moderate(&store, id, ModerationAction::Hide, SUPER_ADMIN)
        .await
        .unwrap();
    assert!(post::list_approved(store.conn(), 20).await.unwrap().is_empty());

    // Hidden is only left by deletion
    assert!(post::moderate(&store, id, ModerationAction::Approve, SUPER_ADMIN)
        .await
        .is_err());

    let err = post::moderate(&store, 999, ModerationAction::Hide, SUPER_ADMIN)
        .await
        .unwrap_err();
    assert!(matches!(err, ForumError::NotFound(_)));
}

#[actix_rt::test]
async fn test_delete_removes_post_and_bans_author() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();
    let id = create_approved_post(&store, Some(alice.id), "hello", Some("life"))
        .await
        .unwrap();

    let outcome = post::moderate(&store, id, ModerationAction::Delete, SUPER_ADMIN)
        .await
        .unwrap();
    assert!(outcome.author_banned);

    assert!(posts::Entity::find_by_id(id).one(store.conn()).await.unwrap().is_none());
    assert!(post::list_approved(store.conn(), 20).await.unwrap().is_empty());
    assert!(post::search(store.conn(), "hello").await.unwrap().is_empty());
    assert!(post::hot(store.conn()).await.unwrap().is_empty());

    let alice = user::find_by_id(store.conn(), alice.id).await.unwrap().unwrap();
    assert!(alice.is_banned);
    assert_eq!(
        alice.ban_reason,
        Some(format!("post deleted by admin #{}", id))
    );
}

#[actix_rt::test]
async fn test_comments_require_approved_post() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();

    let pending = post::create_post(
        &store,
        &SensitiveWords::default(),
        &submission("pending post", None),
        None,
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap();
    let err = post::add_comment(&store, pending.id, alice.id, "hi", 200)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "post not found or not approved");

    let id = create_approved_post(&store, None, "approved post", None)
        .await
        .unwrap();
    post::add_comment(&store, id, alice.id, "first", 200).await.unwrap();
    post::add_comment(&store, id, alice.id, "second", 200).await.unwrap();

    let err = post::add_comment(&store, id, alice.id, "   ", 200)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "comment required");
    let err = post::add_comment(&store, id, alice.id, &"x".repeat(201), 200)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "comment too long (max 200)");

    let comments = post::list_comments(store.conn(), id).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].content, "first");
    assert_eq!(comments[0].username, "alice");
}

#[actix_rt::test]
async fn test_vote_upsert_keeps_latest_value() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();
    let bob = create_test_user(&store, "bob", "password123").await.unwrap();
    let id = create_approved_post(&store, None, "vote on me", None).await.unwrap();

    assert!(!post::cast_vote(&store, id, alice.id, 1).await.unwrap().updated);
    assert!(post::cast_vote(&store, id, alice.id, -1).await.unwrap().updated);
    post::cast_vote(&store, id, bob.id, -1).await.unwrap();

    let err = post::cast_vote(&store, id, bob.id, 2).await.unwrap_err();
    assert!(matches!(err, ForumError::Validation(_)));

    let feed = post::list_approved(store.conn(), 20).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].like_count, 0);
    assert_eq!(feed[0].dislike_count, 2);
    assert_eq!(feed[0].vote_score, -2);
}

#[actix_rt::test]
async fn test_search_and_topics() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();

    let study = create_approved_post(&store, Some(alice.id), "Finals week", Some("Exams"))
        .await
        .unwrap();
    let other = create_approved_post(&store, None, "Lunch spots", None)
        .await
        .unwrap();
    post::add_comment(&store, other, alice.id, "try the 100% noodle place", 200)
        .await
        .unwrap();
    // Pending posts never show up
    post::create_post(
        &store,
        &SensitiveWords::default(),
        &submission("finals are pending", None),
        None,
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap();

    let ids = |views: Vec<post::PostView>| views.into_iter().map(|v| v.id).collect::<Vec<_>>();

    assert_eq!(ids(post::search(store.conn(), "FINALS").await.unwrap()), vec![study]);
    assert_eq!(ids(post::search(store.conn(), "ALICE").await.unwrap()), vec![study]);
    assert_eq!(ids(post::search(store.conn(), "noodle").await.unwrap()), vec![other]);
    assert_eq!(ids(post::search(store.conn(), "100%").await.unwrap()), vec![other]);
    assert!(post::search(store.conn(), "_").await.unwrap().is_empty());
    assert!(post::search(store.conn(), "   ").await.unwrap().is_empty());
    // Category matches too
    assert_eq!(post::search(store.conn(), "general").await.unwrap().len(), 2);

    let (tag, posts) = post::list_by_tag(store.conn(), " exams ").await.unwrap();
    assert_eq!(tag, "exams");
    assert_eq!(ids(posts), vec![study]);

    let err = post::list_by_tag(store.conn(), "  ").await.unwrap_err();
    assert_eq!(err.to_string(), "tag required");
}

#[actix_rt::test]
async fn test_hot_ranking() {
    let store = setup_test_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();
    let bob = create_test_user(&store, "bob", "password123").await.unwrap();

    let quiet = create_approved_post(&store, None, "quiet", None).await.unwrap();
    let busy = create_approved_post(&store, None, "busy", None).await.unwrap();
    let newest = create_approved_post(&store, None, "newest", Some("t")).await.unwrap();
    let reported = create_approved_post(&store, None, "reported", None).await.unwrap();
    let latest = create_approved_post(&store, None, "latest", None).await.unwrap();

    // busy: 1 comment + 2 likes = 3 + 8 = 11
    post::add_comment(&store, busy, alice.id, "nice", 200).await.unwrap();
    post::cast_vote(&store, busy, alice.id, 1).await.unwrap();
    post::cast_vote(&store, busy, bob.id, 1).await.unwrap();
    // quiet: 1 dislike = -4
    post::cast_vote(&store, quiet, alice.id, -1).await.unwrap();
    // reported: 1 report = 2
    let reporter = Reporter {
        user_id: None,
        ip: "10.0.0.1".to_string(),
    };
    report::report_post(&store, reported, &reporter, None, 5).await.unwrap();

    // Neither a hidden nor a pending post ranks, however busy
    let buried = create_approved_post(&store, None, "buried", Some("t")).await.unwrap();
    post::cast_vote(&store, buried, alice.id, 1).await.unwrap();
    post::cast_vote(&store, buried, bob.id, 1).await.unwrap();
    post::moderate(&store, buried, ModerationAction::Hide, SUPER_ADMIN)
        .await
        .unwrap();
    let waiting = post::create_post(
        &store,
        &SensitiveWords::default(),
        &submission("waiting", Some("t")),
        None,
        policy(SUPER_ADMIN),
        None,
    )
    .await
    .unwrap();
    assert_eq!(waiting.status, PostStatus::Pending);

    let hot = post::hot(store.conn()).await.unwrap();
    let order: Vec<(i32, Option<i64>)> = hot.iter().map(|v| (v.id, v.hot_score)).collect();
    // Equal scores go to the newer post
    assert_eq!(
        order,
        vec![
            (busy, Some(11)),
            (reported, Some(2)),
            (latest, Some(0)),
            (newest, Some(0)),
            (quiet, Some(-4)),
        ]
    );

    let (_, tagged) = post::list_by_tag(store.conn(), "T").await.unwrap();
    let ids: Vec<i32> = tagged.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![newest]);
}

#[actix_rt::test]
async fn test_concurrent_votes_leave_one_row() {
    let (_dir, store) = setup_file_store().await.unwrap();
    let alice = create_test_user(&store, "alice", "password123").await.unwrap();
    let id = create_approved_post(&store, None, "flip flop", None).await.unwrap();

    let values: Vec<i32> = (0..10).map(|n| if n % 2 == 0 { 1 } else { -1 }).collect();
    let results = join_all(values.iter().map(|v| post::cast_vote(&store, id, alice.id, *v))).await;
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(results.iter().filter(|r| !r.as_ref().unwrap().updated).count(), 1);

    let rows = post_votes::Entity::find()
        .filter(post_votes::Column::PostId.eq(id))
        .filter(post_votes::Column::UserId.eq(alice.id))
        .count(store.conn())
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let feed = post::list_approved(store.conn(), 20).await.unwrap();
    assert_eq!(feed[0].like_count + feed[0].dislike_count, 1);
}
