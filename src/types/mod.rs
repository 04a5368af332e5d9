//! Conversation object model.

pub mod conversation;
pub mod ids;
pub mod image;
pub mod markers;
pub mod message;

pub use conversation::{Conversation, DEFAULT_TITLE};
pub use ids::{ConversationId, MessageId};
pub use image::{ImagePayload, ImageSource, MaterializedImage, StoredTempImage, TransientImage};
pub use message::{Message, Role};
