// ABOUTME: Detects links already posted in a chat.
// ABOUTME: URLs are normalized per domain so share-tracking parameters don't defeat the match.

use crate::error::StoreResult;
use crate::metrics;
use crate::model::{ChatId, InboundEvent, MessageId, User};
use crate::store::{self, Claim, Store};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use url::Url;

/// How query parameters are treated for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryRule {
    /// The whole query string is share metadata
    DropAll,
    /// Only known tracking parameters are removed
    DropTracking,
}

const DOMAIN_RULES: &[(&str, QueryRule)] = &[("open.spotify.com", QueryRule::DropAll)];

const TRACKING_PARAMS: &[&str] = &["si", "feature", "fbclid", "gclid"];

fn query_rule(host: &str) -> QueryRule {
    DOMAIN_RULES
        .iter()
        .find(|(domain, _)| *domain == host)
        .map(|(_, rule)| *rule)
        .unwrap_or(QueryRule::DropTracking)
}

fn is_tracking_param(name: &str) -> bool {
    TRACKING_PARAMS.contains(&name) || name.starts_with("utm_")
}

fn parse_lenient(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => Some(url),
        // Bare links like "example.com/page" have no scheme
        _ => Url::parse(&format!("https://{}", raw)).ok(),
    }
}

/// Fold `www.` and lowercase; None when the link has no host
pub fn link_host(raw: &str) -> Option<String> {
    let url = parse_lenient(raw)?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Dedupe key for a link: host without scheme or `www.`, path, and the query
/// parameters that survive the domain's rule. Fragments are dropped.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = parse_lenient(raw)?;
    let host = link_host(raw)?;

    let kept: Vec<(String, String)> = match query_rule(&host) {
        QueryRule::DropAll => Vec::new(),
        QueryRule::DropTracking => url
            .query_pairs()
            .filter(|(name, _)| !is_tracking_param(name))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect(),
    };

    let mut key = format!("{}{}", host, url.path());
    if !kept.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        key.push('?');
        key.push_str(&query);
    }
    Some(key)
}

/// The first post of a link in a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DupeLink {
    pub url: String,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Option<User>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCheck {
    /// First time this link was seen here; the claim is now recorded
    New,
    Dupe(DupeLink),
}

/// Result for one distinct link in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Link as it appeared in the message
    pub original: String,
    /// Normalized dedupe key
    pub url: String,
    pub check: LinkCheck,
}

#[derive(Clone)]
pub struct LinkDedupe {
    store: Store,
    ignored_domains: Vec<String>,
}

impl LinkDedupe {
    pub fn new(store: Store, ignored_domains: Vec<String>) -> Self {
        let ignored_domains = ignored_domains
            .into_iter()
            .map(|d| {
                let d = d.trim().to_lowercase();
                d.strip_prefix("www.").map(str::to_string).unwrap_or(d)
            })
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            store,
            ignored_domains,
        }
    }

    /// Whether a host (already `www.`-folded) is on the ignore list, including subdomains
    pub fn is_ignored(&self, host: &str) -> bool {
        self.ignored_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{}", d)))
    }

    /// Check a single normalized link against the chat's history and claim it
    /// for `event` when it is new.
    pub fn claim(&self, url: &str, event: &InboundEvent) -> StoreResult<LinkCheck> {
        let chat_id = event.chat.id;
        let claim = self.store.check_then_claim(
            |conn| {
                Ok(conn
                    .query_row(
                        "SELECT d.message_id, d.unixtime,
                                u.id, u.username, u.first_name, u.last_name, u.is_bot
                         FROM dupe_links d
                         LEFT JOIN users u ON u.id = d.sender_id
                         WHERE d.url = ?1 AND d.chat_id = ?2",
                        params![url, chat_id],
                        |row| {
                            let sender = match row.get::<_, Option<i64>>(2)? {
                                Some(id) => Some(User {
                                    id,
                                    username: row.get(3)?,
                                    first_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                                    last_name: row.get(5)?,
                                    is_bot: row.get::<_, i32>(6)? != 0,
                                }),
                                None => None,
                            };
                            Ok(DupeLink {
                                url: url.to_string(),
                                chat_id,
                                message_id: row.get(0)?,
                                sender,
                                posted_at: DateTime::from_timestamp(row.get(1)?, 0)
                                    .unwrap_or_default(),
                            })
                        },
                    )
                    .optional()?)
            },
            |conn| {
                if let Some(sender) = &event.sender {
                    store::upsert_user(conn, sender)?;
                }
                conn.execute(
                    "INSERT INTO dupe_links (url, chat_id, message_id, sender_id, unixtime)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        url,
                        chat_id,
                        event.message_id,
                        event.sender.as_ref().map(|u| u.id),
                        event.date.timestamp(),
                    ],
                )?;
                Ok(())
            },
        )?;

        Ok(match claim {
            Claim::Claimed => {
                metrics::record_claim("link");
                LinkCheck::New
            }
            Claim::Existing(original) => {
                metrics::record_duplicate("link");
                tracing::info!(
                    chat_id,
                    url,
                    original_message_id = original.message_id,
                    "Duplicate link"
                );
                LinkCheck::Dupe(original)
            }
        })
    }

    /// Check every distinct link in a message. Links from ignored domains and
    /// repeats of a link already handled in the same message are skipped.
    pub fn check_message(&self, event: &InboundEvent) -> StoreResult<Vec<LinkOutcome>> {
        let mut outcomes: Vec<LinkOutcome> = Vec::new();
        for original in event.links() {
            let (Some(url), Some(host)) = (normalize_url(&original), link_host(&original)) else {
                tracing::debug!(link = %original, "Skipping unparseable link");
                continue;
            };
            if self.is_ignored(&host) {
                continue;
            }
            if outcomes.iter().any(|o| o.url == url) {
                continue;
            }
            let check = self.claim(&url, event)?;
            outcomes.push(LinkOutcome {
                original,
                url,
                check,
            });
        }
        Ok(outcomes)
    }
}
