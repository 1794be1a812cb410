use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkin_backend::{
    config::Config,
    db::connection::{create_pool, run_migrations},
    repositories::{CheckInStore, MemoryStore, PgStore},
    routes::build_router,
    state::AppState,
};

fn mask_secret(s: Option<&str>) -> String {
    match s {
        None | Some("") => "<empty>".into(),
        Some(s) => {
            let prefix = s.chars().take(4).collect::<String>();
            format!("{}*** (len={})", prefix, s.len())
        }
    }
}

fn mask_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        database_url = %mask_database_url(&config.database_url),
        bind_addr = %config.bind_addr,
        public_base_url = %config.public_base_url,
        directions_access_token = %mask_secret(config.directions_access_token.as_deref()),
        push_endpoint = config.push_endpoint.as_deref().unwrap_or("<none>"),
        push_access_token = %mask_secret(config.push_access_token.as_deref()),
        smtp_password = %mask_secret(config.smtp.password.as_deref()),
        stall_regression_meters = config.stall_regression_meters,
        stall_notify_after = config.stall_notify_after,
        "Loaded configuration from environment/.env"
    );

    let store: Arc<dyn CheckInStore> = if config.uses_memory_store() {
        tracing::warn!("Using the in-memory store; data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = create_pool(&config.database_url).await?;
        run_migrations(&pool).await?;
        Arc::new(PgStore::new(pool))
    };

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid BIND_ADDR value: {}", config.bind_addr))?;
    let state = AppState::from_config(store, config)?;
    let app = build_router(state);

    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
