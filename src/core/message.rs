/// Scheduled chat messages: flattened once, delivered once.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::grammar::{GrammarError, GrammarSet};
use crate::core::transport::{Transport, TransportError, WebhookPayload};
use crate::core::webhooks::{WebhookError, WebhookStore};

/// Origin used when the builder is not given one.
pub const DEFAULT_ORIGIN: &str = "#origin#";

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message has already been sent")]
    AlreadySent,
    #[error("no webhook registered for target '{0}'")]
    UnknownTarget(String),
    #[error("target name must not be empty")]
    EmptyTarget,
    #[error("grammar expansion failed: {0}")]
    Expansion(#[from] GrammarError),
    #[error("webhook lookup failed: {0}")]
    Webhook(#[from] WebhookError),
    #[error("delivery failed: {0}")]
    Transport(#[from] TransportError),
}

/// Delivery state of a message. `Sent` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Unsent,
    Sent { at: DateTime<Utc>, status: u16 },
}

/// Outcome of a completed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub target_name: String,
    pub url: String,
    pub status: u16,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// A chat message whose text is flattened from a grammar at construction
/// and which can be delivered to its target exactly once.
///
/// A `Message` cannot be copied, so an unsent one cannot be delivered twice
/// through a duplicate:
///
/// ```compile_fail
/// fn duplicate(msg: herald::Message) -> (herald::Message, herald::Message) {
///     (msg.clone(), msg)
/// }
/// ```
#[derive(Debug)]
pub struct Message {
    target_name: String,
    rules: GrammarSet,
    text: String,
    scheduled_time: DateTime<Utc>,
    state: DeliveryState,
}

impl Message {
    /// Flatten `origin` with `rules` and wrap the result for delivery to
    /// `target_name`. The target is not looked up until [`Message::send`].
    pub fn new(
        target_name: impl Into<String>,
        origin: &str,
        rules: GrammarSet,
        scheduled_time: DateTime<Utc>,
        rng: &mut StdRng,
    ) -> Result<Message, MessageError> {
        let target_name = target_name.into();
        if target_name.is_empty() {
            return Err(MessageError::EmptyTarget);
        }

        let text = rules.flatten(origin, rng)?;
        debug!("Message scheduled for {}", scheduled_time.to_rfc3339());
        debug!("'{}' flattened to '{}'", origin, text);

        Ok(Message {
            target_name,
            rules,
            text,
            scheduled_time,
            state: DeliveryState::Unsent,
        })
    }

    pub fn builder(target_name: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            target_name: target_name.into(),
            origin: DEFAULT_ORIGIN.to_string(),
            grammar: None,
            rules: None,
            scheduled_time: None,
            seed: None,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rules(&self) -> &GrammarSet {
        &self.rules
    }

    pub fn scheduled_time(&self) -> DateTime<Utc> {
        self.scheduled_time
    }

    pub fn state(&self) -> &DeliveryState {
        &self.state
    }

    pub fn is_sent(&self) -> bool {
        matches!(self.state, DeliveryState::Sent { .. })
    }

    /// Deliver the text to the webhook registered for the target name.
    ///
    /// Any HTTP response, whatever its status, completes the attempt and
    /// moves the message to [`DeliveryState::Sent`]. Lookup and transport
    /// failures leave it unsent so the caller may try again.
    pub fn send(
        &mut self,
        webhooks: &dyn WebhookStore,
        transport: &dyn Transport,
    ) -> Result<DeliveryReceipt, MessageError> {
        if self.is_sent() {
            return Err(MessageError::AlreadySent);
        }

        let url = webhooks
            .webhook_url(&self.target_name)?
            .ok_or_else(|| MessageError::UnknownTarget(self.target_name.clone()))?;

        let payload = WebhookPayload {
            content: self.text.clone(),
        };
        let response = transport.post_json(&url, &payload).map_err(|e| {
            warn!("Message to {} failed: {}", self.target_name, e);
            e
        })?;

        let sent_at = Utc::now();
        self.state = DeliveryState::Sent {
            at: sent_at,
            status: response.status,
        };

        if response.is_success() {
            debug!(
                "Message sent to {} with status code {}. Response: {}",
                self.target_name, response.status, response.body
            );
        } else {
            warn!(
                "Message sent to {} with status code {}. Response: {}",
                self.target_name, response.status, response.body
            );
        }

        Ok(DeliveryReceipt {
            target_name: self.target_name.clone(),
            url,
            status: response.status,
            body: response.body,
            sent_at,
        })
    }
}

/// Builder for constructing a `Message`.
pub struct MessageBuilder {
    target_name: String,
    origin: String,
    grammar: Option<GrammarSet>,
    /// Raw rules, parsed at build time.
    rules: Option<HashMap<String, Vec<String>>>,
    scheduled_time: Option<DateTime<Utc>>,
    seed: Option<u64>,
}

impl MessageBuilder {
    /// Text or tag to flatten. Defaults to `#origin#`.
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = origin.to_string();
        self
    }

    /// Use an already parsed grammar.
    pub fn grammar(mut self, grammar: GrammarSet) -> Self {
        self.grammar = Some(grammar);
        self
    }

    /// Use raw `symbol → [template, ...]` rules. Takes precedence over
    /// `grammar`.
    pub fn rules(mut self, rules: HashMap<String, Vec<String>>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Defaults to now.
    pub fn scheduled_for(mut self, time: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(time);
        self
    }

    /// Fix the random source for reproducible text. Defaults to entropy.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<Message, MessageError> {
        let grammar = match self.rules {
            Some(rules) => GrammarSet::from_rules(rules)?,
            None => self.grammar.unwrap_or_default(),
        };
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Message::new(
            self.target_name,
            &self.origin,
            grammar,
            self.scheduled_time.unwrap_or_else(Utc::now),
            &mut rng,
        )
    }
}
