//! Herald: procedurally varied chat announcements.
//!
//! Flattens a Tracery-style grammar into a short message at construction
//! time and delivers it, exactly once, to a chat webhook.

pub mod core;

pub use crate::core::grammar::{GrammarError, GrammarSet};
pub use crate::core::message::{DeliveryReceipt, DeliveryState, Message, MessageError};
pub use crate::core::transport::{HttpTransport, Transport, WebhookPayload};
pub use crate::core::webhooks::{WebhookFile, WebhookMap, WebhookStore};
