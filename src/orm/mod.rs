pub mod broadcasts;
pub mod comments;
pub mod post_votes;
pub mod posts;
pub mod reports;
pub mod sessions;
pub mod users;
