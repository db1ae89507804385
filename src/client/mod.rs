//! Client-side chat runtime: the conversation view-model and its
//! reconciliation rules, the dual-path send procedure, the live-channel
//! lifecycle, and the HTTP fallback client.

pub mod conn;
pub mod fallback;
pub mod outbox;
pub mod retry;
pub mod view;

pub use conn::{ChannelLifecycle, ChannelState, InvalidTransition};
pub use fallback::HttpFallback;
pub use outbox::{FallbackApi, LiveAck, LiveChannel, SendConfig, send_message};
pub use retry::Backoff;
pub use view::{Conversation, DeliveryState, MessageEntry};
