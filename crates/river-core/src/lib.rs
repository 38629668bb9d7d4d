//! Feed retrieval, caching, quota and lifecycle engine backing a river.
//!
//! The web layer above resolves a viewer identity and calls in explicitly;
//! nothing in here holds session state. Storage, cache and event delivery
//! are capability seams: `river-db` provides the production store,
//! [`memory::MemoryStore`] the in-memory one the tests run against.

pub mod cache;
pub mod channels;
pub mod error;
pub mod events;
pub mod feed;
pub mod fingerprint;
pub mod lifecycle;
pub mod memory;
pub mod permissions;
pub mod quota;
pub mod rivers;
pub mod search;
pub mod store;

pub use cache::{FeedCache, MokaFeedCache, NoopCache};
pub use channels::{ChannelConfig, ChannelManager, ChannelRegistry};
pub use error::CoreError;
pub use events::{BroadcastEvents, EventSink, NoopEvents, RecordingEvents};
pub use feed::{DropFilters, FeedQuery};
pub use permissions::Permissions;
pub use rivers::{RiverDefaults, RiverService};
pub use search::SearchMatcher;
pub use store::{Store, StoreError};
