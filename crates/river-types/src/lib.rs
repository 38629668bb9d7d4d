pub mod api;
pub mod events;
pub mod models;

pub use models::{
    Account, ChannelFilter, ChannelFilterOption, Collaborator, DropSummary, River, RiverLayout,
};
