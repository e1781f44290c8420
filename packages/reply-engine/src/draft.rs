//! The reply draft: what the user has typed so far.
//!
//! The draft is owned by the engine, mutated only through the engine's
//! setters, and survives failed attempts so retry never loses typed input.
//! It is never persisted beyond the in-memory reply attempt.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // Email pattern - RFC 5322 simplified
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$"
    ).unwrap();
}

/// Separator between the reply body and suggested collection times when the
/// two are composed into a single outgoing message.
pub const COLLECT_SEPARATOR: &str = "\r\n\r\nPossible collection times: ";

/// Syntactic email validation. No network lookup.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email.trim())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub email: String,
    pub reply_text: String,
    pub collect_text: Option<String>,
}

impl ReplyDraft {
    pub fn email_valid(&self) -> bool {
        is_valid_email(&self.email)
    }

    pub fn has_reply(&self) -> bool {
        !self.reply_text.trim().is_empty()
    }

    /// The outgoing message body: reply text plus collection times, when the
    /// user suggested any.
    pub fn composed_body(&self) -> String {
        match self.collect_text.as_deref().map(str::trim) {
            Some(collect) if !collect.is_empty() => {
                format!("{}{}{}", self.reply_text, COLLECT_SEPARATOR, collect)
            }
            _ => self.reply_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(is_valid_email("someone@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co.uk"));
        assert!(is_valid_email("  padded@example.org  "));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn composed_body_without_collect_is_reply_text() {
        let draft = ReplyDraft {
            email: "a@b.com".into(),
            reply_text: "Is this still available?".into(),
            collect_text: None,
        };
        assert_eq!(draft.composed_body(), "Is this still available?");
    }

    #[test]
    fn composed_body_appends_collection_times() {
        let draft = ReplyDraft {
            email: "a@b.com".into(),
            reply_text: "Can I collect this?".into(),
            collect_text: Some("weekday evenings".into()),
        };
        assert_eq!(
            draft.composed_body(),
            "Can I collect this?\r\n\r\nPossible collection times: weekday evenings"
        );
    }

    #[test]
    fn blank_collect_text_is_ignored() {
        let draft = ReplyDraft {
            email: "a@b.com".into(),
            reply_text: "Hello".into(),
            collect_text: Some("   ".into()),
        };
        assert_eq!(draft.composed_body(), "Hello");
    }

    #[test]
    fn has_reply_requires_non_whitespace() {
        let mut draft = ReplyDraft::default();
        assert!(!draft.has_reply());
        draft.reply_text = "  \n ".into();
        assert!(!draft.has_reply());
        draft.reply_text = "yes".into();
        assert!(draft.has_reply());
    }
}
