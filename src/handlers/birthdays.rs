// ABOUTME: Birthday announcements and the "next birthday" command.
// ABOUTME: Announces once per chat per year via notification dedupe; dates are evaluated in the configured zone.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use goob_core::{Handler, HandlerContext, InboundEvent, OutgoingMessage};
use regex::Regex;

const COMMAND_PATTERN: &str = r"(?i)^!(др|birthda(y|ys))$";

/// The date `birth` is celebrated in `year`. Feb 29 falls back to Feb 28
/// in common years.
pub fn anniversary(birth: NaiveDate, year: i32) -> NaiveDate {
    birth
        .with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, birth.month(), 28))
        .unwrap_or(birth)
}

/// Whole years between `birth` and `today`
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let years = today.year() - birth.year();
    if today < anniversary(birth, today.year()) {
        years - 1
    } else {
        years
    }
}

/// The nearest birthday strictly after `today`, wrapping into next year,
/// with every username that shares it.
pub fn next_birthdays(birthdays: &[(String, NaiveDate)], today: NaiveDate) -> Option<(NaiveDate, Vec<String>)> {
    let mut best: Option<(NaiveDate, Vec<String>)> = None;
    for (username, birth) in birthdays {
        let mut next = anniversary(*birth, today.year());
        if next <= today {
            next = anniversary(*birth, today.year() + 1);
        }
        let earlier = best.as_ref().map_or(true, |(date, _)| next < *date);
        if earlier {
            best = Some((next, vec![username.clone()]));
        } else if let Some((date, names)) = best.as_mut() {
            if *date == next {
                names.push(username.clone());
            }
        }
    }
    best
}

pub fn upcoming_text(birthdays: &[(String, NaiveDate)], today: NaiveDate) -> String {
    match next_birthdays(birthdays, today) {
        Some((date, names)) => format!(
            "Prepare the 🎂 for @{} on {}",
            names.join(", @"),
            date.format("%d.%m")
        ),
        None => "No upcoming birthdays".to_string(),
    }
}

pub fn announcement_text(username: &str, age: i32) -> String {
    format!("Hooray! 🎉 @{} is turning {}! 🎂", username, age)
}

pub struct BirthdayHandler {
    /// (username without '@', birth date)
    birthdays: Vec<(String, NaiveDate)>,
    tz: Tz,
    command: Regex,
}

impl BirthdayHandler {
    pub fn new(birthdays: Vec<(String, NaiveDate)>, tz: Tz) -> Result<Self> {
        let command = Regex::new(COMMAND_PATTERN).context("Invalid birthday command pattern")?;
        Ok(Self {
            birthdays,
            tz,
            command,
        })
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.tz).date_naive()
    }

    /// Handle `event` as if the local date were `today`
    pub async fn handle_on(&self, ctx: &HandlerContext, event: &InboundEvent, today: NaiveDate) -> Result<()> {
        self.announce_today(ctx, event, today).await;

        let is_command = event
            .text
            .as_deref()
            .is_some_and(|t| self.command.is_match(t.trim()));
        if is_command {
            ctx.outbound
                .send(&event.chat, OutgoingMessage::plain(upcoming_text(&self.birthdays, today)))
                .await?;
        }
        Ok(())
    }

    async fn announce_today(&self, ctx: &HandlerContext, event: &InboundEvent, today: NaiveDate) {
        let period = today.year().to_string();
        for (username, birth) in &self.birthdays {
            if anniversary(*birth, today.year()) != today {
                continue;
            }

            let subject = format!("birthday:{}:{}", event.chat.id, username);
            let notifications = ctx.notifications.clone();
            let claim_period = period.clone();
            let claimed = tokio::task::spawn_blocking(move || notifications.should_notify(&subject, &claim_period)).await;
            match claimed {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(chat_id = event.chat.id, username = %username, error = %e, "Birthday claim failed");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(chat_id = event.chat.id, username = %username, error = %e, "Birthday claim task failed");
                    continue;
                }
            }

            tracing::info!(chat_id = event.chat.id, username = %username, "Announcing birthday");
            let text = announcement_text(username, age_on(*birth, today));
            if let Err(e) = ctx.outbound.send(&event.chat, OutgoingMessage::plain(text)).await {
                tracing::error!(chat_id = event.chat.id, username = %username, error = %e, "Birthday announcement failed");
            }
        }
    }
}

#[async_trait]
impl Handler for BirthdayHandler {
    fn key(&self) -> &str {
        "birthdays"
    }

    async fn handle(&self, ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
        self.handle_on(ctx, event, self.today()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn people() -> Vec<(String, NaiveDate)> {
        vec![
            ("ann".to_string(), date(1990, 3, 14)),
            ("bob".to_string(), date(1985, 11, 2)),
            ("cy".to_string(), date(2001, 11, 2)),
        ]
    }

    #[test]
    fn test_age_on_birthday_and_day_before() {
        assert_eq!(age_on(date(1990, 3, 14), date(2024, 3, 14)), 34);
        assert_eq!(age_on(date(1990, 3, 14), date(2024, 3, 13)), 33);
    }

    #[test]
    fn test_leap_day_birthday_in_common_year() {
        let birth = date(2000, 2, 29);
        assert_eq!(anniversary(birth, 2023), date(2023, 2, 28));
        assert_eq!(anniversary(birth, 2024), date(2024, 2, 29));
        assert_eq!(age_on(birth, date(2023, 2, 28)), 23);
    }

    #[test]
    fn test_next_birthday_joins_ties() {
        assert_eq!(
            upcoming_text(&people(), date(2024, 6, 1)),
            "Prepare the 🎂 for @bob, @cy on 02.11"
        );
    }

    #[test]
    fn test_next_birthday_wraps_to_next_year() {
        assert_eq!(
            upcoming_text(&people(), date(2024, 12, 1)),
            "Prepare the 🎂 for @ann on 14.03"
        );
    }

    #[test]
    fn test_todays_birthday_is_not_upcoming() {
        let only_ann = vec![("ann".to_string(), date(1990, 3, 14))];
        let (next, _) = next_birthdays(&only_ann, date(2024, 3, 14)).unwrap();
        assert_eq!(next, date(2025, 3, 14));
    }

    #[test]
    fn test_no_birthdays() {
        assert_eq!(upcoming_text(&[], date(2024, 1, 1)), "No upcoming birthdays");
    }

    #[test]
    fn test_command_pattern() {
        let handler = BirthdayHandler::new(Vec::new(), chrono_tz::UTC).unwrap();
        for text in ["!birthday", "!Birthdays", "!др", "!ДР"] {
            assert!(handler.command.is_match(text), "{}", text);
        }
        for text in ["birthday", "!birthdayz", "say !birthday"] {
            assert!(!handler.command.is_match(text), "{}", text);
        }
    }
}
