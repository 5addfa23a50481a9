// ABOUTME: Concrete event handlers and their registration from config.
// ABOUTME: Each handler is independent; the dispatcher fans every event out to all of them.

pub mod admin;
pub mod birthdays;
pub mod dupe_link;
pub mod reply;

use anyhow::Result;
use goob_core::config::Config;
use goob_core::{CompletionProvider, HandlerRegistry};
use std::sync::Arc;

pub use admin::AdminHandler;
pub use birthdays::BirthdayHandler;
pub use dupe_link::DupeLinkHandler;
pub use reply::ReplyHandler;

/// Register every handler the config enables.
///
/// Link dedupe is always on. Birthdays register only when some are
/// configured, admin commands only when an owner is set, and the reply
/// handler only when a completion provider is available.
pub fn register_all(
    registry: &mut HandlerRegistry,
    config: &Config,
    completion: Option<Arc<dyn CompletionProvider>>,
) -> Result<()> {
    let tz = config.tz();

    registry.register(DupeLinkHandler::new(tz))?;

    let birthdays = config.birthday_dates()?;
    if !birthdays.is_empty() {
        registry.register(BirthdayHandler::new(birthdays, tz)?)?;
    }

    if let Some(owner) = config.telegram.owner() {
        registry.register(AdminHandler::new(owner))?;
    }

    match (config.reply_settings(), completion) {
        (Some(settings), Some(provider)) => {
            registry.register(ReplyHandler::new(settings, provider)?)?;
        }
        (Some(_), None) => {
            tracing::warn!("Reply settings present but no completion provider, reply handler disabled");
        }
        _ => {}
    }

    tracing::info!(handlers = ?registry.keys(), "Handlers registered");
    Ok(())
}
