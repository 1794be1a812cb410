use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkin_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::{CheckInStore, PgStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "token_cleanup=info,checkin_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    if config.uses_memory_store() {
        anyhow::bail!("token_cleanup needs a Postgres DATABASE_URL");
    }
    let pool = create_pool(&config.database_url).await?;
    let store = PgStore::new(pool);

    let counts = store
        .delete_expired_tokens(Utc::now())
        .await
        .map_err(|err| anyhow::anyhow!("cleanup expired tokens: {}", err))?;
    tracing::info!(
        auth_tokens = counts.auth_tokens,
        join_tokens = counts.join_tokens,
        password_resets = counts.password_resets,
        "Deleted expired tokens"
    );

    for table in ["auth_tokens", "join_tokens", "password_resets"] {
        sqlx::query(&format!("VACUUM (ANALYZE) {}", table))
            .execute(store.pool())
            .await?;
    }

    Ok(())
}
