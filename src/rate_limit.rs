/// Per-IP cooldown between post submissions
///
/// Uses in-memory storage (DashMap), suitable for single-instance deployments.
/// The check and the reservation happen under the map's entry lock, so two
/// near-simultaneous requests from one IP cannot both pass.
///
/// A successful check hands out a [`CooldownPermit`]. The handler commits it
/// once the post is stored; dropping it uncommitted gives the slot back, so a
/// rejected submission does not cost the client a cooldown.
///
/// # Example Usage
///
/// ```rust,ignore
/// let permit = cooldown.try_acquire(&ip).map_err(|e| ForumError::RateLimited {
///     retry_after_seconds: e.retry_after_seconds,
/// })?;
/// let created = post::create_post(/* ... */).await?;
/// permit.commit();
/// ```
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Error returned when the cooldown has not elapsed
#[derive(Debug, Clone)]
pub struct RateLimitError {
    /// Seconds until the next post is allowed, rounded up
    pub retry_after_seconds: u64,
}

pub struct PostCooldown {
    /// Client IP -> time of the last accepted (or reserved) post
    last_post: DashMap<String, Instant>,
    cooldown: Duration,
    /// Map size that triggers eviction on insert
    max_tracked: usize,
}

impl PostCooldown {
    pub fn new(cooldown: Duration, max_tracked: usize) -> Self {
        Self {
            last_post: DashMap::new(),
            cooldown,
            max_tracked,
        }
    }

    /// Reserve a post slot for `ip`, or report how long to wait.
    pub fn try_acquire(&self, ip: &str) -> Result<CooldownPermit<'_>, RateLimitError> {
        if self.last_post.len() >= self.max_tracked && !self.last_post.contains_key(ip) {
            let evicted = self.evict_expired();
            log::debug!("Post cooldown map full, evicted {} entries", evicted);
        }

        let now = Instant::now();
        let previous = match self.last_post.entry(ip.to_owned()) {
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed < self.cooldown {
                    let remaining = self.cooldown - elapsed;
                    return Err(RateLimitError {
                        retry_after_seconds: ceil_secs(remaining),
                    });
                }
                Some(entry.insert(now))
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                None
            }
        };

        Ok(CooldownPermit {
            limiter: self,
            ip: ip.to_owned(),
            reserved_at: now,
            previous,
            committed: false,
        })
    }

    /// Drop entries whose cooldown has passed. Returns how many were removed.
    ///
    /// Called on insert when the map is full, and periodically from the server.
    pub fn evict_expired(&self) -> usize {
        let before = self.last_post.len();
        let now = Instant::now();
        self.last_post
            .retain(|_, last| now.saturating_duration_since(*last) < self.cooldown);
        before.saturating_sub(self.last_post.len())
    }

    /// Get the number of tracked IPs (for monitoring/debugging)
    pub fn tracked_ips(&self) -> usize {
        self.last_post.len()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

/// A reserved post slot. See [`PostCooldown::try_acquire`].
pub struct CooldownPermit<'a> {
    limiter: &'a PostCooldown,
    ip: String,
    reserved_at: Instant,
    previous: Option<Instant>,
    committed: bool,
}

impl<'a> CooldownPermit<'a> {
    /// Keep the reservation: the cooldown starts now.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<'a> Drop for CooldownPermit<'a> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let map = &self.limiter.last_post;
        // Only undo our own reservation.
        match self.previous {
            Some(previous) => {
                if let Some(mut last) = map.get_mut(&self.ip) {
                    if *last == self.reserved_at {
                        *last = previous;
                    }
                }
            }
            None => {
                map.remove_if(&self.ip, |_, last| *last == self.reserved_at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_post_allowed_second_blocked() {
        let limiter = PostCooldown::new(Duration::from_secs(15), 100);

        limiter.try_acquire("10.0.0.1").unwrap().commit();

        let err = limiter
            .try_acquire("10.0.0.1")
            .err()
            .expect("second post should be blocked");
        assert!(err.retry_after_seconds > 0 && err.retry_after_seconds <= 15);
    }

    #[test]
    fn test_different_ips_independent() {
        let limiter = PostCooldown::new(Duration::from_secs(15), 100);

        limiter.try_acquire("10.0.0.1").unwrap().commit();
        assert!(
            limiter.try_acquire("10.0.0.2").is_ok(),
            "Different IP should have independent cooldown"
        );
    }

    #[test]
    fn test_uncommitted_permit_releases_slot() {
        let limiter = PostCooldown::new(Duration::from_secs(15), 100);

        {
            let _permit = limiter.try_acquire("10.0.0.1").unwrap();
            // Held permit blocks a concurrent request
            assert!(limiter.try_acquire("10.0.0.1").is_err());
        }

        assert_eq!(limiter.tracked_ips(), 0);
        assert!(limiter.try_acquire("10.0.0.1").is_ok());
    }

    #[test]
    fn test_uncommitted_permit_restores_previous_time() {
        let limiter = PostCooldown::new(Duration::from_millis(20), 100);

        limiter.try_acquire("10.0.0.1").unwrap().commit();
        std::thread::sleep(Duration::from_millis(30));

        drop(limiter.try_acquire("10.0.0.1").unwrap());

        // The old timestamp is back and already expired
        assert!(limiter.try_acquire("10.0.0.1").is_ok());
    }

    #[test]
    fn test_zero_cooldown_never_blocks() {
        let limiter = PostCooldown::new(Duration::ZERO, 100);
        limiter.try_acquire("10.0.0.1").unwrap().commit();
        assert!(limiter.try_acquire("10.0.0.1").is_ok());
    }

    #[test]
    fn test_evict_expired() {
        let limiter = PostCooldown::new(Duration::from_millis(10), 100);
        limiter.try_acquire("10.0.0.1").unwrap().commit();
        limiter.try_acquire("10.0.0.2").unwrap().commit();
        assert_eq!(limiter.tracked_ips(), 2);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.evict_expired(), 2);
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[test]
    fn test_full_map_evicts_on_insert() {
        let limiter = PostCooldown::new(Duration::from_millis(10), 2);
        limiter.try_acquire("10.0.0.1").unwrap().commit();
        limiter.try_acquire("10.0.0.2").unwrap().commit();

        std::thread::sleep(Duration::from_millis(20));
        limiter.try_acquire("10.0.0.3").unwrap().commit();
        assert_eq!(limiter.tracked_ips(), 1);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(14_001)), 15);
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
    }
}
