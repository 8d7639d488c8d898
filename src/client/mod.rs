//! Client-side synchronization agent.
//!
//! Keeps a per-conversation message list consistent with server truth by
//! combining snapshot fetches over REST with live push events, applying
//! optimistic mutations locally and rolling them back when the remote call
//! fails.

pub mod store;
pub mod subscription;

pub use store::{ChatApi, ChatStore, HttpChatApi, LocalMessage, RevokeState};
pub use subscription::EventPump;
