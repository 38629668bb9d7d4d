//! HTTP boundary. Handlers resolve a viewer, consult the engine's
//! permission booleans, and decide what to allow; the engine itself never
//! enforces access.

pub mod channels;
pub mod collaborators;
pub mod drops;
pub mod error;
pub mod middleware;
pub mod rivers;

use std::sync::Arc;

use river_core::channels::ChannelManager;
use river_core::feed::FeedQuery;
use river_core::rivers::RiverService;
use river_core::search::SearchMatcher;
use river_db::Database;

pub struct AppStateInner {
    pub rivers: RiverService<Database>,
    pub feed: FeedQuery<Database>,
    pub channels: ChannelManager<Database>,
    pub search: SearchMatcher<Database>,
    pub jwt_secret: String,
}

pub type AppState = Arc<AppStateInner>;
