//! Advisory locks over result cache entries.
//!
//! Nothing checks the lock before a result is written; callers that compute
//! a cached result take it to avoid computing the same entry twice.

use std::sync::Arc;
use tracing::debug;

use crate::context::Context;
use crate::error::Result;

/// Take the lock of `result_key` without blocking. Returns whether it was taken.
pub fn acquire_lock(ctx: &Arc<Context>, result_key: &str) -> Result<bool> {
    let taken = ctx
        .store
        .set_nx(&ctx.keys.lock(result_key), "1", Some(ctx.config.lock_ttl))?;
    debug!(result_key, taken, "Acquire lock");
    Ok(taken)
}

pub fn release_lock(ctx: &Arc<Context>, result_key: &str) -> Result<()> {
    ctx.store.del(&ctx.keys.lock(result_key))?;
    Ok(())
}

pub fn has_lock(ctx: &Arc<Context>, result_key: &str) -> Result<bool> {
    ctx.store.exists(&ctx.keys.lock(result_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    #[test]
    fn lock_is_exclusive_until_released() {
        let ctx = Arc::new(Context::in_memory());
        assert!(!has_lock(&ctx, "report:1").unwrap());
        assert!(acquire_lock(&ctx, "report:1").unwrap());
        assert!(!acquire_lock(&ctx, "report:1").unwrap());
        assert!(has_lock(&ctx, "report:1").unwrap());
        // other entries are independent
        assert!(acquire_lock(&ctx, "report:2").unwrap());
        release_lock(&ctx, "report:1").unwrap();
        assert!(acquire_lock(&ctx, "report:1").unwrap());
    }

    #[test]
    fn lock_expires() {
        let config = Config {
            lock_ttl: Duration::ZERO,
            ..Config::default()
        };
        let ctx = Arc::new(Context::in_memory().with_config(config));
        assert!(acquire_lock(&ctx, "k").unwrap());
        assert!(!has_lock(&ctx, "k").unwrap());
    }
}
