// ABOUTME: HTTP implementations of the core's collaborator traits.
// ABOUTME: OpenAI chat completions for replies and Twitch Helix for live-status polling.

pub mod openai;
pub mod twitch;

pub use openai::OpenAiCompletion;
pub use twitch::TwitchClient;

/// First `max` characters of a response body, for error messages
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}
