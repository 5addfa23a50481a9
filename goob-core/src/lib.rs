// ABOUTME: Core of the goob chat bot: durable event store, idempotency engines, dispatcher, and poller.
// ABOUTME: Transport- and provider-agnostic; collaborators plug in through the traits module.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod idempotency;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod paths;
pub mod poller;
pub mod send;
pub mod store;
pub mod testing;
pub mod traits;

pub use dispatcher::{
    Capabilities, DispatchReport, Dispatcher, Handler, HandlerContext, HandlerRegistry,
};
pub use error::{StoreError, StoreResult};
pub use model::{Chat, ChatKind, EntityAnnotation, InboundEvent, Media, OutgoingMessage, User};
pub use send::SendAdapter;
pub use store::{Store, StoreOptions};

// Re-export collaborator traits for convenient access
pub use traits::{
    CompletionProvider, CompletionRequest, EventStream, HistoryLine, InboundTransport, LiveStatus,
    LiveStatusProvider, Metadata, OutboundSender, SentMessage,
};
