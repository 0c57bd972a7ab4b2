//! View limiter — Redis-backed `(subject, actor)` dedup for view counters.
//!
//! A view counts once per actor per window. Uses Redis `SET NX EX` for an
//! atomic check-and-set with automatic expiry, so concurrent requests from the
//! same actor cannot both count.

use redis::aio::ConnectionManager;

use courier_common::error::AppError;

/// Default dedup window in seconds (24 hours).
const DEFAULT_WINDOW_SECONDS: u64 = 86_400;

pub struct ViewLimiter {
    window_secs: u64,
}

impl ViewLimiter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs: window_secs.max(1),
        }
    }

    /// Returns `true` if this view should be counted, `false` if the actor
    /// already viewed the subject inside the window.
    pub async fn should_count(
        &self,
        redis: &mut ConnectionManager,
        subject_type: &str,
        subject_id: &str,
        actor: &str,
    ) -> Result<bool, AppError> {
        let key = Self::key(subject_type, subject_id, actor)?;

        // Some("OK") when the key was set, None when it already existed
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.window_secs)
            .query_async(redis)
            .await?;

        let counted = result.is_some();
        if !counted {
            tracing::debug!(subject_type, subject_id, "Repeated view ignored");
        }

        Ok(counted)
    }

    fn key(subject_type: &str, subject_id: &str, actor: &str) -> Result<String, AppError> {
        let parts = [subject_type.trim(), subject_id.trim(), actor.trim()];
        if parts.iter().any(|p| p.is_empty()) {
            return Err(AppError::Validation(
                "subject_type, subject_id and actor are required".to_string(),
            ));
        }
        Ok(format!("view:dedup:{}:{}:{}", parts[0], parts[1], parts[2]))
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

impl Default for ViewLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = ViewLimiter::key("notice", "42", "user-7").unwrap();
        assert_eq!(key, "view:dedup:notice:42:user-7");
    }

    #[test]
    fn test_key_rejects_blank_actor() {
        assert!(ViewLimiter::key("notice", "42", " ").is_err());
    }

    #[test]
    fn test_window_defaults() {
        assert_eq!(ViewLimiter::default().window_secs(), 86_400);
        assert_eq!(ViewLimiter::new(0).window_secs(), 1);
    }
}
