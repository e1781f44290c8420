//! Domain value types shared across the engine.
//!
//! These are small, cheap-to-clone types. Everything that crosses the
//! collaborator seam or the snapshot surface lives here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated session, either injected at engine construction or
/// established mid-flow by login or silent registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub member_id: Uuid,
    pub token: String,
}

impl Session {
    pub fn new(member_id: Uuid, token: impl Into<String>) -> Self {
        Self {
            member_id,
            token: token.into(),
        }
    }
}

/// Credential presented to the session authenticator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    MagicLink(String),
}

/// What the identity resolver knows about an email address.
///
/// Resolution is read-only: no account is created and no session is
/// established as a side effect of resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Known,
    Unknown,
}

/// Outcome of a credential issuance call.
///
/// `AlreadyRegistered` is the issuer's idempotence escape hatch: a retried
/// issuance whose first attempt may have landed, or an email that gained an
/// account mid-flow, reports this instead of creating a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
    Created { password: String },
    AlreadyRegistered,
}

/// Which authentication path applied for this attempt.
///
/// Produced at most once per attempt and never mutated; a new attempt
/// produces a new outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    ExistingAuthenticated,
    ExistingNeedsLogin,
    NewAccountIssued { password: String },
}

/// Receipt returned by the reply submitter.
///
/// `duplicate` means the server had already accepted a delivery for this
/// attempt token; the engine treats that as success, not a second send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub duplicate: bool,
}

/// The one-time disclosure of a newly generated password to a
/// just-registered user. Cleared when the welcome modal is dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeContext {
    pub new_user_password: String,
}

/// Correlates a single submit attempt across issuer and submitter calls.
///
/// The token is minted when an attempt leaves `Idle` and reused verbatim on
/// retry, so server-side deduplication can recognize a replayed issuance or
/// delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptToken(Uuid);

impl AttemptToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Post identity and reply constraints, supplied by the surrounding UI when
/// the reply form mounts. Read-only input to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySource {
    /// The post being replied to.
    pub message_id: Uuid,
    /// Replies after this instant are rejected locally.
    pub deadline: Option<DateTime<Utc>>,
    /// Whether the post accepts collection-time suggestions.
    pub accepts_collection: bool,
    /// Where the reply form was opened from (browse page, message page, ...).
    /// Carried into transition logs for analytics.
    pub origin: Option<String>,
}

impl ReplySource {
    pub fn new(message_id: Uuid) -> Self {
        Self {
            message_id,
            deadline: None,
            accepts_collection: true,
            origin: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// True if the post is past its reply deadline.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now > d)
    }
}
