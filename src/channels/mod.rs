pub mod base;
pub mod discord;
pub mod manager;

pub use base::{BaseChannel, split_message};
pub use manager::ChannelManager;
