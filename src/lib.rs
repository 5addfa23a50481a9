// ABOUTME: The goob chat bot: concrete handlers, HTTP collaborators, and the Telegram transport.
// ABOUTME: Everything transport- and provider-agnostic lives in goob-core.

pub mod app;
pub mod handlers;
pub mod providers;
#[cfg(feature = "telegram")]
pub mod telegram;

pub use handlers::register_all;
