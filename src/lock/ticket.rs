//! Ticket recovery from the lock service's enqueue output.
//!
//! The service prints free-form text whose layout has changed between
//! versions, so extraction is two-tiered:
//! 1. a labeled `ticket` / `ticket id` marker followed by the token, anywhere;
//! 2. otherwise, the last non-empty line on its own, with surrounding quotes removed.

use crate::error::{BuildDomainError, Result};
use crate::lock::resource::Ticket;
use regex::Regex;
use std::sync::LazyLock;

/// Labeled form, e.g. `Ticket ID: 12-34-ab12-cd34`.
static LABELED_TICKET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ticket\s*(?:id)?[:\s]+(\d+-\d+-[a-f0-9-]+)").expect("Invalid ticket regex")
});

/// Bare token form, e.g. `7-8-ffeeddcc-1122`.
static BARE_TICKET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+-\d+-[a-f0-9-]+$").expect("Invalid ticket regex"));

/// Extract the ticket from a raw enqueue response.
///
/// # Returns
///
/// * `Ok(Ticket)` - A token was found
/// * `Err(BuildDomainError::ExtractionError)` - Neither tier matched; carries the full response
pub fn extract_ticket(response: &str) -> Result<Ticket> {
    if let Some(captures) = LABELED_TICKET_REGEX.captures(response)
        && let Some(token) = captures.get(1)
    {
        return Ok(Ticket::new(token.as_str()));
    }

    if let Some(last_line) = last_non_empty_line(response) {
        let candidate = last_line.strip_prefix('"').unwrap_or(last_line);
        let candidate = candidate.strip_suffix('"').unwrap_or(candidate);
        if BARE_TICKET_REGEX.is_match(candidate) {
            return Ok(Ticket::new(candidate));
        }
    }

    Err(BuildDomainError::ExtractionError {
        output: response.to_string(),
    })
}

fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}
