/// Background task implementations
use crate::{context::AppContext, error::GateResult};
use tracing::warn;

/// One decay pass over idle failed-login counters
pub async fn decay_login_failures(ctx: &AppContext) -> GateResult<u64> {
    ctx.authenticator.run_decay_sweep().await
}

/// Health check - the store must answer, the cache may be degraded
pub async fn health_check(ctx: &AppContext) -> GateResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    if let Some(redis) = &ctx.redis {
        if let Err(e) = redis.ping().await {
            warn!("Session cache degraded, requests fall back to the store: {}", e);
        }
    }

    Ok(())
}
