use odin_platform_access::SessionCodec;
use odin_server::{
    app,
    auth::{AppState, OidcClient, db::PgRoleStore},
    config::ServerConfig,
    db::{AuditRepository, RbacRepository, TriggerRepository},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(?config, "Loaded configuration");

    let codec = SessionCodec::new(&config.cookie).expect("invalid cookie configuration");

    tracing::info!("Discovering OIDC provider...");
    let oidc_client = OidcClient::discover(config.oidc)
        .await
        .expect("failed to discover OIDC provider");

    let mut state = AppState::new(codec, oidc_client)
        .with_trust_forwarded_proto(config.trust_forwarded_proto);

    match config.database_url.as_deref() {
        Some(url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .expect("failed to connect to database");
            state = state
                .with_role_store(Arc::new(PgRoleStore::new(db_pool.clone())))
                .with_triggers(Arc::new(TriggerRepository::new(db_pool.clone())))
                .with_rbac(Arc::new(RbacRepository::new(db_pool.clone())))
                .with_audit_sink(Arc::new(AuditRepository::new(db_pool)));
            tracing::info!("Role, trigger, RBAC and audit stores enabled");
        }
        None => {
            tracing::warn!("No database configured, using claim groups only");
        }
    }

    let app = app::router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
