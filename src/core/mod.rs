pub mod grammar;
pub mod message;
pub mod modifiers;
pub mod transport;
pub mod webhooks;
