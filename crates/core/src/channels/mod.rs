mod channels_model;
mod channels_service;
mod channels_traits;

pub use channels_model::{Channel, NewChannel};
pub use channels_service::ChannelService;
pub use channels_traits::{ChannelRepositoryTrait, ChannelServiceTrait};
