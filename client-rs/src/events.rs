//! Typed events and handler registration
//!
//! Incoming publications are routed to one of five typed handler sets based
//! on the channel name. Registering a handler returns a [`Handle`] that can
//! be dropped or unsubscribed at any time; unsubscribing twice is a no-op.

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A delivery changed state
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdate {
    #[serde(default)]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// A driver moved or changed availability
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverUpdate {
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub data: Value,
}

/// A chat message on a shared channel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A notification pushed to this user
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Presence change on a monitored channel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub online: bool,
}

/// Which handler set a channel routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Delivery,
    Driver,
    Chat,
    Online,
    Notification,
}

/// Classify a channel name by substring.
///
/// Order matters: `driver:<id>:deliveries` carries delivery updates, so the
/// delivery check runs before the driver check.
pub(crate) fn classify(channel: &str) -> EventKind {
    if channel.contains("deliver") {
        EventKind::Delivery
    } else if channel.contains("driver") {
        EventKind::Driver
    } else if channel.contains("message") || channel.contains("chat") {
        EventKind::Chat
    } else if channel.contains("online") || channel.contains("presence") {
        EventKind::Online
    } else {
        // Private user channels and everything else carry notifications
        EventKind::Notification
    }
}

type Handlers<T> = RwLock<HashMap<Uuid, Arc<dyn Fn(&T) + Send + Sync>>>;

#[derive(Default)]
struct Registries {
    delivery: Handlers<DeliveryUpdate>,
    driver: Handlers<DriverUpdate>,
    chat: Handlers<ChatMessage>,
    notification: Handlers<Notification>,
    online: Handlers<OnlineUser>,
}

/// Routes publications to registered typed handlers
#[derive(Clone, Default)]
pub struct EventBus {
    registries: Arc<Registries>,
}

/// Registration handle; unsubscribing is idempotent
pub struct Handle {
    kind: EventKind,
    id: Uuid,
    registries: Arc<Registries>,
}

impl Handle {
    pub fn unsubscribe(&self) {
        let removed = match self.kind {
            EventKind::Delivery => self.registries.delivery.write().remove(&self.id).is_some(),
            EventKind::Driver => self.registries.driver.write().remove(&self.id).is_some(),
            EventKind::Chat => self.registries.chat.write().remove(&self.id).is_some(),
            EventKind::Notification => {
                self.registries.notification.write().remove(&self.id).is_some()
            }
            EventKind::Online => self.registries.online.write().remove(&self.id).is_some(),
        };
        if removed {
            debug!(kind = ?self.kind, "Handler removed");
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<T>(&self, kind: EventKind, map: &Handlers<T>, handler: Arc<dyn Fn(&T) + Send + Sync>) -> Handle {
        let id = Uuid::new_v4();
        map.write().insert(id, handler);
        Handle {
            kind,
            id,
            registries: self.registries.clone(),
        }
    }

    pub fn on_delivery_update<F>(&self, handler: F) -> Handle
    where
        F: Fn(&DeliveryUpdate) + Send + Sync + 'static,
    {
        self.register(EventKind::Delivery, &self.registries.delivery, Arc::new(handler))
    }

    pub fn on_driver_update<F>(&self, handler: F) -> Handle
    where
        F: Fn(&DriverUpdate) + Send + Sync + 'static,
    {
        self.register(EventKind::Driver, &self.registries.driver, Arc::new(handler))
    }

    pub fn on_chat_message<F>(&self, handler: F) -> Handle
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.register(EventKind::Chat, &self.registries.chat, Arc::new(handler))
    }

    pub fn on_notification<F>(&self, handler: F) -> Handle
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.register(
            EventKind::Notification,
            &self.registries.notification,
            Arc::new(handler),
        )
    }

    pub fn on_online_user<F>(&self, handler: F) -> Handle
    where
        F: Fn(&OnlineUser) + Send + Sync + 'static,
    {
        self.register(EventKind::Online, &self.registries.online, Arc::new(handler))
    }

    /// Route a raw publication to the handler set its channel belongs to
    pub(crate) fn dispatch(&self, channel: &str, data: Value) {
        match classify(channel) {
            EventKind::Delivery => dispatch_to(&self.registries.delivery, channel, data),
            EventKind::Driver => dispatch_to(&self.registries.driver, channel, data),
            EventKind::Chat => dispatch_to(&self.registries.chat, channel, data),
            EventKind::Notification => dispatch_to(&self.registries.notification, channel, data),
            EventKind::Online => dispatch_to(&self.registries.online, channel, data),
        }
    }
}

fn dispatch_to<T: for<'de> Deserialize<'de>>(map: &Handlers<T>, channel: &str, data: Value) {
    let handlers: Vec<_> = map.read().values().cloned().collect();
    if handlers.is_empty() {
        return;
    }

    let event: T = match serde_json::from_value(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(channel, error = %e, "Dropping malformed publication");
            return;
        }
    };

    for handler in handlers {
        handler(&event);
    }
}
