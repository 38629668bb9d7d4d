use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use river_api::middleware::{attach_viewer, require_auth};
use river_api::{AppState, AppStateInner, channels, collaborators, drops, rivers};
use river_core::channels::{ChannelConfig, ChannelManager, ChannelRegistry};
use river_core::events::BroadcastEvents;
use river_core::feed::FeedQuery;
use river_core::rivers::{RiverDefaults, RiverService};
use river_core::search::SearchMatcher;
use river_core::{FeedCache, MokaFeedCache};
use river_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "river=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("RIVER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("RIVER_DB_PATH").unwrap_or_else(|_| "river.db".into());
    let host = std::env::var("RIVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("RIVER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let lifetime_days: i64 = std::env::var("RIVER_LIFETIME_DAYS")
        .unwrap_or_else(|_| "14".into())
        .parse()?;
    let drop_quota: i64 = std::env::var("RIVER_DROP_QUOTA")
        .unwrap_or_else(|_| "10000".into())
        .parse()?;
    let feed_ttl_secs: u64 = std::env::var("RIVER_FEED_CACHE_TTL_SECS")
        .unwrap_or_else(|_| "3600".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Capabilities shared by the engine components
    let cache: Arc<dyn FeedCache> = Arc::new(MokaFeedCache::new(100_000));
    let events = Arc::new(BroadcastEvents::new(256));
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            info!(?event, "river event");
        }
    });

    let defaults = RiverDefaults {
        lifetime_days,
        drop_quota,
        listing_ttl: Duration::from_secs(feed_ttl_secs),
    };

    let state: AppState = Arc::new(AppStateInner {
        rivers: RiverService::new(db.clone(), cache.clone(), events, defaults),
        feed: FeedQuery::new(db.clone(), cache, Duration::from_secs(feed_ttl_secs)),
        channels: ChannelManager::new(db.clone(), Arc::new(default_registry())),
        search: SearchMatcher::new(db),
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/rivers/{id}", get(rivers::get_river))
        .route("/rivers/{id}/drops", get(drops::get_drops))
        .route("/rivers/{id}/drops/{drop_id}", get(drops::get_drop))
        .route("/rivers/{id}/max-drop-id", get(drops::get_max_drop_id))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/rivers", post(rivers::create_river))
        .route("/rivers/mine", get(rivers::my_rivers))
        .route("/rivers/search", get(rivers::search_rivers))
        .route(
            "/rivers/{id}",
            put(rivers::update_river).delete(rivers::delete_river),
        )
        .route("/rivers/{id}/extend", post(rivers::extend_river))
        .route("/rivers/{id}/token", post(rivers::rotate_token))
        .route("/rivers/{id}/drops/{drop_id}", delete(drops::remove_drop))
        .route(
            "/rivers/{id}/collaborators",
            get(collaborators::list_collaborators),
        )
        .route(
            "/rivers/{id}/collaborators/{user_id}",
            put(collaborators::add_collaborator).delete(collaborators::remove_collaborator),
        )
        .route(
            "/rivers/{id}/subscription",
            put(collaborators::subscribe).delete(collaborators::unsubscribe),
        )
        .route(
            "/rivers/{id}/channels",
            get(channels::list_channels).post(channels::get_or_create_channel),
        )
        .route(
            "/rivers/{id}/channels/{channel_id}",
            put(channels::set_channel_enabled),
        )
        .route(
            "/rivers/{id}/channels/{channel_id}/options",
            post(channels::add_channel_option),
        )
        .route(
            "/rivers/{id}/channels/{channel_id}/options/{option_id}",
            delete(channels::remove_channel_option),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(state, attach_viewer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("River server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Source types this installation understands. Filters referencing any
/// other channel key are kept in storage but skipped in listings.
fn default_registry() -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    registry.register(
        "rss",
        ChannelConfig {
            name: "RSS".to_string(),
            option_keys: vec!["url".to_string()],
        },
    );
    registry.register(
        "twitter",
        ChannelConfig {
            name: "Twitter".to_string(),
            option_keys: vec!["keyword".to_string(), "user".to_string()],
        },
    );
    registry.register(
        "facebook",
        ChannelConfig {
            name: "Facebook".to_string(),
            option_keys: vec!["page".to_string()],
        },
    );
    registry.register(
        "sms",
        ChannelConfig {
            name: "SMS".to_string(),
            option_keys: vec!["number".to_string()],
        },
    );
    registry
}
