//! Push channel to clients

pub mod broadcast;
pub mod handler;
pub mod protocol;

pub use broadcast::{Broadcaster, ChannelBroadcaster};
