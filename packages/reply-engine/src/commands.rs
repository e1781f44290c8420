//! Reply commands - intent to perform IO.
//!
//! Commands are emitted by the machine, one per event at most, and executed
//! by the operations layer against the collaborator traits. Commands carry
//! all the data their operation needs; the operations layer holds no flow
//! state.

use crate::types::{AttemptToken, Credential, Session};

/// The sub-operation a command (or failure) belongs to.
///
/// Retained inside the failed phase so retry can resume at exactly the step
/// that failed rather than restarting the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Resolve,
    Issue,
    Authenticate,
    Submit,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Resolve => "resolve",
            Step::Issue => "issue",
            Step::Authenticate => "authenticate",
            Step::Submit => "submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyCommand {
    /// Determine which credential path applies to this email.
    ///
    /// `session_held` short-circuits resolution locally when the engine was
    /// constructed with (or has since adopted) an authenticated session.
    ResolveEmail { email: String, session_held: bool },

    /// Silently register a new account, returning its generated password.
    IssueCredential {
        email: String,
        attempt: AttemptToken,
    },

    /// Exchange a credential for an authenticated session.
    Authenticate {
        email: String,
        credential: Credential,
    },

    /// Deliver the composed reply against the post.
    SubmitReply {
        session: Session,
        body: String,
        attempt: AttemptToken,
    },
}

impl ReplyCommand {
    pub fn step(&self) -> Step {
        match self {
            ReplyCommand::ResolveEmail { .. } => Step::Resolve,
            ReplyCommand::IssueCredential { .. } => Step::Issue,
            ReplyCommand::Authenticate { .. } => Step::Authenticate,
            ReplyCommand::SubmitReply { .. } => Step::Submit,
        }
    }
}
