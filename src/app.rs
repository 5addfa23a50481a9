// ABOUTME: Startup wiring shared by the binary and its tests.
// ABOUTME: Opens the store (with the optional legacy writer) and builds collaborators from config.

use anyhow::{Context, Result};
use goob_core::config::Config;
use goob_core::store::{BucketStore, LegacyWriter, Store, StoreOptions};
use goob_core::CompletionProvider;
use std::sync::Arc;

use crate::providers::OpenAiCompletion;

/// Open the primary store, attaching the legacy dual-write when configured
pub fn open_store(config: &Config) -> Result<Store> {
    let legacy = match config.store.legacy_path.as_deref() {
        Some(path) => {
            let bucket_store = BucketStore::open(path)
                .with_context(|| format!("Failed to open legacy store at {}", path))?;
            tracing::info!(legacy = %path, "Legacy dual-write enabled");
            Some(Arc::new(bucket_store) as Arc<dyn LegacyWriter>)
        }
        None => None,
    };

    let options = StoreOptions {
        busy_timeout: config.store.busy_timeout(),
        retry: config.store.retry_policy(),
        legacy,
    };
    Store::open(config.store.db_path(), options)
}

/// Completion provider for the reply handler, when reply settings carry an API key
pub fn completion_provider(config: &Config) -> Result<Option<Arc<dyn CompletionProvider>>> {
    let Some(settings) = config.reply_settings() else {
        return Ok(None);
    };
    Ok(OpenAiCompletion::from_settings(settings)?.map(|c| Arc::new(c) as Arc<dyn CompletionProvider>))
}
