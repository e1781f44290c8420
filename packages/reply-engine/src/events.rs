//! Reply events - facts and inputs the machine interprets.
//!
//! Input events originate from the user or the surrounding UI; fact events
//! are produced by the operations layer. Errors do not travel as `Err`
//! through the flow: the one failure fact, [`ReplyEvent::OperationFailed`],
//! carries a category and an already-sanitized message.

use crate::commands::Step;
use crate::error::ErrorKind;
use crate::types::{DeliveryReceipt, Session};

/// How an email resolved during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A session is already held; no credential path needed.
    AlreadyAuthenticated,
    /// The email belongs to an existing account; login required.
    KnownAccount,
    /// Nobody has this email; silent registration applies.
    UnknownAccount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyEvent {
    // Input events (user- or UI-originated)
    SubmitRequested { email: String, body: String },
    RetryRequested,
    LoginSucceeded { session: Session },
    WelcomeClosed,

    // Fact events (operation-produced)
    EmailResolved { resolution: Resolution },
    CredentialIssued { password: String },
    IssuanceConflicted,
    SessionEstablished { session: Session },
    ReplyDelivered { receipt: DeliveryReceipt },
    OperationFailed {
        step: Step,
        kind: ErrorKind,
        message: String,
    },
}

impl ReplyEvent {
    /// Stable name for transition logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReplyEvent::SubmitRequested { .. } => "submit_requested",
            ReplyEvent::RetryRequested => "retry_requested",
            ReplyEvent::LoginSucceeded { .. } => "login_succeeded",
            ReplyEvent::WelcomeClosed => "welcome_closed",
            ReplyEvent::EmailResolved { .. } => "email_resolved",
            ReplyEvent::CredentialIssued { .. } => "credential_issued",
            ReplyEvent::IssuanceConflicted => "issuance_conflicted",
            ReplyEvent::SessionEstablished { .. } => "session_established",
            ReplyEvent::ReplyDelivered { .. } => "reply_delivered",
            ReplyEvent::OperationFailed { .. } => "operation_failed",
        }
    }
}
