//! Application-wide constants
//!
//! Tunable limits live in `app_config`; the values here are part of the
//! public contract and do not change per deployment.

/// Maximum tag length in characters. Longer tags are truncated, not rejected.
pub const MAX_TAG_LENGTH: usize = 30;

/// Maximum report reason length in characters. Longer reasons are truncated.
pub const MAX_REPORT_REASON_LENGTH: usize = 120;

/// Broadcast title and body limits. Longer input is truncated.
pub const MAX_BROADCAST_TITLE_LENGTH: usize = 120;
pub const MAX_BROADCAST_CONTENT_LENGTH: usize = 4000;

/// Number of matched words quoted in an auto-ban reason
pub const BAN_REASON_MAX_HITS: usize = 10;

/// Length of the content preview in the admin report listing
pub const REPORT_PREVIEW_LENGTH: usize = 120;

/// Displayed in place of a username for posts, comments and reports without an account
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// Displayed as the author of a broadcast without a creator
pub const SYSTEM_AUTHOR: &str = "system";

/// Fallback ban reason shown at login when none was recorded
pub const DEFAULT_BAN_REASON: &str = "policy violation";

// Listing limits
pub const SEARCH_LIMIT: u64 = 50;
pub const HOT_LIMIT: usize = 20;
pub const TOPIC_LIMIT: u64 = 100;
pub const COMMENT_LIMIT: u64 = 100;
pub const REPORT_LIST_LIMIT: u64 = 100;
pub const BROADCAST_LIMIT: u64 = 100;

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
