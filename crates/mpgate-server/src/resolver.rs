//! Picks the auto-reply messages for an inbound message.
//!
//! | inbound                  | category          |
//! |--------------------------|-------------------|
//! | event `subscribe`        | subscribe         |
//! | event `CLICK`            | menu click by key |
//! | text                     | keyword, falling back to generic message |
//! | image / voice / video    | generic message   |
//! | anything else            | no reply          |

use std::sync::Arc;

use tracing::{debug, info, warn};

use mpgate_shared::protocol::{EventMessage, InboundMessage};
use mpgate_shared::reply::{ReplyMessage, ReplyPayload};
use mpgate_shared::types::ReplyCategory;

use crate::config_store::ConfigStore;
use crate::error::GatewayError;

const EVENT_SUBSCRIBE: &str = "subscribe";
const EVENT_UNSUBSCRIBE: &str = "unsubscribe";
const EVENT_SCAN: &str = "SCAN";
const EVENT_CLICK: &str = "CLICK";

#[derive(Clone)]
pub struct AutoReplyResolver {
    config: Arc<dyn ConfigStore>,
}

impl AutoReplyResolver {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self { config }
    }

    /// Messages to send back, in order. Empty means "acknowledge only".
    pub async fn resolve(
        &self,
        tenant_id: &str,
        message: &InboundMessage,
    ) -> Result<Vec<ReplyMessage>, GatewayError> {
        match message {
            InboundMessage::Event(event) => self.resolve_event(tenant_id, event).await,
            InboundMessage::Text(text) => self.resolve_keyword(tenant_id, &text.content).await,
            InboundMessage::Image(_) | InboundMessage::Voice(_) | InboundMessage::Video(_) => {
                self.resolve_single(tenant_id, ReplyCategory::GenericMessage)
                    .await
            }
            InboundMessage::ShortVideo(_)
            | InboundMessage::Location(_)
            | InboundMessage::Link(_) => Ok(Vec::new()),
        }
    }

    async fn resolve_event(
        &self,
        tenant_id: &str,
        event: &EventMessage,
    ) -> Result<Vec<ReplyMessage>, GatewayError> {
        match event.event.as_str() {
            EVENT_SUBSCRIBE => {
                info!(tenant = %tenant_id, user = %event.header.from_user, key = %event.event_key, "user subscribed");
                self.resolve_single(tenant_id, ReplyCategory::Subscribe)
                    .await
            }
            EVENT_CLICK => self.resolve_menu_click(tenant_id, &event.event_key).await,
            EVENT_UNSUBSCRIBE => {
                info!(tenant = %tenant_id, user = %event.header.from_user, "user unsubscribed");
                Ok(Vec::new())
            }
            EVENT_SCAN => {
                info!(tenant = %tenant_id, user = %event.header.from_user, key = %event.event_key, "scan event");
                Ok(Vec::new())
            }
            other => {
                debug!(tenant = %tenant_id, event = other, key = %event.event_key, "unhandled event");
                Ok(Vec::new())
            }
        }
    }

    /// First rule document holding `key` wins.
    async fn resolve_menu_click(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Vec<ReplyMessage>, GatewayError> {
        let rules = self
            .config
            .rules(tenant_id, ReplyCategory::MenuClick)
            .await?;

        for rule in rules.iter().filter(|r| !r.reply_data.is_empty()) {
            match rule.menu_payload(key) {
                Ok(Some(payload)) => {
                    debug!(tenant = %tenant_id, rule = rule.id, key, "menu key matched");
                    return Ok(select(&payload));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(tenant = %tenant_id, rule = rule.id, key, error = %e, "skipping malformed menu entry");
                }
            }
        }

        debug!(tenant = %tenant_id, key, "no menu rule for key");
        Ok(Vec::new())
    }

    /// Keyword rules when enabled; when disabled or nothing matches, the
    /// generic-message reply.
    async fn resolve_keyword(
        &self,
        tenant_id: &str,
        text: &str,
    ) -> Result<Vec<ReplyMessage>, GatewayError> {
        if self
            .config
            .feature_enabled(tenant_id, ReplyCategory::Keyword)
            .await?
        {
            let replies = self.match_keyword_rules(tenant_id, text).await?;
            if !replies.is_empty() {
                return Ok(replies);
            }
        } else {
            debug!(tenant = %tenant_id, "keyword replies disabled");
        }

        debug!(tenant = %tenant_id, "no keyword reply, falling back to generic message");
        self.resolve_single(tenant_id, ReplyCategory::GenericMessage)
            .await
    }

    async fn match_keyword_rules(
        &self,
        tenant_id: &str,
        text: &str,
    ) -> Result<Vec<ReplyMessage>, GatewayError> {
        let rules = self.config.rules(tenant_id, ReplyCategory::Keyword).await?;

        for rule in &rules {
            if rule.reply_data.is_empty() {
                continue;
            }
            let defs = match rule.keyword_defs() {
                Ok(defs) => defs,
                Err(e) => {
                    warn!(tenant = %tenant_id, rule = rule.id, error = %e, "skipping malformed keyword definitions");
                    continue;
                }
            };
            if defs.iter().any(|def| def.matches(text)) {
                debug!(tenant = %tenant_id, rule = rule.id, title = %rule.rule_title, "keyword rule matched");
                return Ok(parse_and_select(tenant_id, rule.id, rule.payload()));
            }
        }
        Ok(Vec::new())
    }

    /// Subscribe and generic-message categories: one document, gated by
    /// the category flag.
    async fn resolve_single(
        &self,
        tenant_id: &str,
        category: ReplyCategory,
    ) -> Result<Vec<ReplyMessage>, GatewayError> {
        if !self.config.feature_enabled(tenant_id, category).await? {
            debug!(tenant = %tenant_id, %category, "replies disabled");
            return Ok(Vec::new());
        }

        let rules = self.config.rules(tenant_id, category).await?;
        match rules.first() {
            Some(rule) if !rule.reply_data.is_empty() => {
                Ok(parse_and_select(tenant_id, rule.id, rule.payload()))
            }
            _ => {
                debug!(tenant = %tenant_id, %category, "no reply configured");
                Ok(Vec::new())
            }
        }
    }
}

fn select(payload: &ReplyPayload) -> Vec<ReplyMessage> {
    payload.select(&mut rand::thread_rng())
}

/// A payload that no longer parses produces no reply rather than an error.
fn parse_and_select(
    tenant_id: &str,
    rule_id: i64,
    payload: Result<ReplyPayload, mpgate_store::StoreError>,
) -> Vec<ReplyMessage> {
    match payload {
        Ok(payload) => select(&payload),
        Err(e) => {
            warn!(tenant = %tenant_id, rule = rule_id, error = %e, "malformed reply payload");
            Vec::new()
        }
    }
}
