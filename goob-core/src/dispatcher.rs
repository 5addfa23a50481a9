// ABOUTME: Handler registry and per-event fan-out.
// ABOUTME: Persists each event while running every capable handler in its own isolated task.

use crate::idempotency::{LinkDedupe, NotificationDedupe};
use crate::metrics;
use crate::model::{InboundEvent, User};
use crate::send::SendAdapter;
use crate::store::Store;
use crate::traits::EventStream;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::StreamExt;

/// Which kinds of events a handler wants, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub messages: bool,
    pub edits: bool,
}

impl Capabilities {
    pub const MESSAGES: Capabilities = Capabilities {
        messages: true,
        edits: false,
    };

    pub const ALL: Capabilities = Capabilities {
        messages: true,
        edits: true,
    };

    pub fn accepts(&self, event: &InboundEvent) -> bool {
        if event.is_edit() {
            self.edits
        } else {
            self.messages
        }
    }
}

/// Everything a handler may touch. Built once at startup and cloned into
/// each handler task.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: Store,
    pub outbound: SendAdapter,
    pub links: LinkDedupe,
    pub notifications: NotificationDedupe,
    /// The bot's own account, when the transport reported it
    pub bot: Option<User>,
}

impl HandlerContext {
    pub fn new(store: Store, outbound: SendAdapter, ignored_domains: Vec<String>) -> Self {
        Self {
            links: LinkDedupe::new(store.clone(), ignored_domains),
            notifications: NotificationDedupe::new(store.clone()),
            store,
            outbound,
            bot: None,
        }
    }

    pub fn with_bot(mut self, bot: User) -> Self {
        self.bot = Some(bot);
        self
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// Unique registry key, also used in logs and metrics
    fn key(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::MESSAGES
    }

    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()>;
}

struct Registration {
    key: String,
    capabilities: Capabilities,
    handler: Arc<dyn Handler>,
}

/// Handlers registered at startup, in registration order
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its key. Keys must be unique.
    pub fn register<H: Handler + 'static>(&mut self, handler: H) -> Result<()> {
        let key = handler.key().to_string();
        if self.handlers.iter().any(|r| r.key == key) {
            bail!("Handler already registered: {}", key);
        }
        let capabilities = handler.capabilities();
        tracing::info!(handler = %key, ?capabilities, "Handler registered");
        self.handlers.push(Registration {
            key,
            capabilities,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.handlers.iter().map(|r| r.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// What happened to one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub persisted: bool,
    pub handlers_run: usize,
    /// Keys of handlers that returned an error or panicked
    pub failures: Vec<String>,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    ctx: HandlerContext,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, ctx: HandlerContext) -> Self {
        Self {
            registry: Arc::new(registry),
            ctx,
        }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Persist `event` and fan it out to every capable handler.
    ///
    /// Persistence runs alongside the handlers and its failure is only logged.
    /// Each handler runs in its own task so an error or panic in one never
    /// reaches the others.
    pub async fn dispatch(&self, event: InboundEvent) -> DispatchReport {
        let event = Arc::new(event);
        let chat_id = event.chat.id;
        let message_id = event.message_id;
        metrics::record_event_received(event.is_edit());

        let store = self.ctx.store.clone();
        let to_record = Arc::clone(&event);
        let persist = tokio::task::spawn_blocking(move || store.record_event(&to_record));

        let mut tasks = Vec::new();
        for registration in &self.registry.handlers {
            if !registration.capabilities.accepts(&event) {
                continue;
            }
            let handler = Arc::clone(&registration.handler);
            let ctx = self.ctx.clone();
            let event = Arc::clone(&event);
            let key = registration.key.clone();
            let task = tokio::spawn(async move {
                let started = Instant::now();
                let result = handler.handle(&ctx, &event).await;
                metrics::record_handler_duration(&key, started.elapsed());
                result
            });
            tasks.push((registration.key.clone(), task));
        }

        let mut report = DispatchReport::default();

        match persist.await {
            Ok(Ok(summary)) => {
                report.persisted = true;
                metrics::record_event("persisted");
                if summary.media_failed > 0 {
                    tracing::warn!(chat_id, message_id, failed = summary.media_failed, "Some media items not saved");
                }
            }
            Ok(Err(e)) => {
                metrics::record_event("store_failed");
                tracing::error!(chat_id, message_id, error = %e, "Failed to persist event");
            }
            Err(e) => {
                metrics::record_event("store_failed");
                tracing::error!(chat_id, message_id, error = %e, "Persistence task failed");
            }
        }

        for (key, task) in tasks {
            report.handlers_run += 1;
            match task.await {
                Ok(Ok(())) => metrics::record_handler_run(&key, "ok"),
                Ok(Err(e)) => {
                    metrics::record_handler_run(&key, "error");
                    tracing::warn!(handler = %key, chat_id, message_id, error = %e, "Handler failed");
                    report.failures.push(key);
                }
                Err(e) => {
                    metrics::record_handler_run(&key, "panic");
                    tracing::error!(
                        handler = %key,
                        chat_id,
                        message_id,
                        panicked = e.is_panic(),
                        "Handler task aborted"
                    );
                    report.failures.push(key);
                }
            }
        }

        report
    }

    /// Dispatch every event from `events` until the stream ends. Each event
    /// gets its own task so a slow one never holds up the next.
    pub async fn run(&self, mut events: EventStream) {
        tracing::info!(handlers = ?self.registry.keys(), "Dispatcher started");
        while let Some(event) = events.next().await {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(event).await;
            });
        }
        tracing::info!("Event stream ended, dispatcher stopping");
    }
}
