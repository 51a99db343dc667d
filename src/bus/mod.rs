pub mod events;
pub mod queue;

pub use events::{
    Attachment, InboundEvent, InboundMessage, Mention, OutboundEvent, OutboundMessage,
    ReactionEvent, ReplyRef,
};
pub use queue::MessageBus;
