//! The pure reply state machine.
//!
//! The machine interprets events and decides on commands. It performs no IO:
//! `decide` is synchronous, called serially, and returns at most one command
//! per event. All flow state - phase, adopted session, auth outcome, the
//! frozen attempt body, the attempt token - lives inside the machine, so the
//! driver and operations layers stay stateless.
//!
//! # State diagram
//!
//! ```text
//!  IDLE ──submit──► VALIDATING_EMAIL ──(authenticated)──────────────┐
//!                        │        │                                 │
//!             (known)    │        │ (unknown)                       │
//!                        ▼        ▼                                 ▼
//!           AUTHENTICATING(login) AUTHENTICATING(register) ──► SUBMITTING
//!                        │        ▲        │ issue+authenticate     │
//!     on_login_success   │        └────────┘                        ▼
//!                        └──────────────────────────────────► COMPLETE
//!
//!  any processing state ──(operation error)──► FAILED(step, kind)
//!  FAILED ──retry──► re-enters the failed step only
//! ```

use tracing::warn;

use crate::commands::{ReplyCommand, Step};
use crate::error::ErrorKind;
use crate::events::{ReplyEvent, Resolution};
use crate::types::{AttemptToken, AuthOutcome, Credential, Session, WelcomeContext};

use serde::Serialize;

/// Which authentication sub-path the attempt is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPath {
    /// Silent registration with a generated credential.
    Register,
    /// Waiting for an out-of-band login to complete.
    Login,
}

/// What failed, how, and the sanitized message to show for it.
///
/// Retained inside [`Phase::Failed`] so retry resumes at the failed step
/// instead of restarting from idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    pub step: Step,
    pub kind: ErrorKind,
    pub message: String,
}

/// Where the reply flow currently is. The single source of truth.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    ValidatingEmail,
    Authenticating(AuthPath),
    Submitting,
    Complete,
    Failed(FailedAttempt),
}

/// Flat mirror of [`Phase`] for snapshots and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseKind {
    Idle,
    ValidatingEmail,
    Authenticating,
    Submitting,
    Complete,
    Failed,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::ValidatingEmail => PhaseKind::ValidatingEmail,
            Phase::Authenticating(_) => PhaseKind::Authenticating,
            Phase::Submitting => PhaseKind::Submitting,
            Phase::Complete => PhaseKind::Complete,
            Phase::Failed(_) => PhaseKind::Failed,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            PhaseKind::Idle => "IDLE",
            PhaseKind::ValidatingEmail => "VALIDATING_EMAIL",
            PhaseKind::Authenticating => "AUTHENTICATING",
            PhaseKind::Submitting => "SUBMITTING",
            PhaseKind::Complete => "COMPLETE",
            PhaseKind::Failed => "FAILED",
        }
    }

    /// True while an operation may be in flight.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            Phase::ValidatingEmail | Phase::Authenticating(_) | Phase::Submitting
        )
    }

    /// True in the phases from which a submit may start.
    pub fn accepts_submit(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Failed(_))
    }
}

pub struct ReplyMachine {
    phase: Phase,
    session: Option<Session>,
    outcome: Option<AuthOutcome>,
    welcome: Option<WelcomeContext>,
    /// Frozen at submit time; one attempt sends exactly this.
    email: String,
    body: String,
    /// Minted per attempt, reused verbatim on retry.
    attempt: AttemptToken,
    /// Kept so a failed authenticate step can be retried as-is.
    last_credential: Option<Credential>,
}

impl ReplyMachine {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            phase: Phase::Idle,
            session,
            outcome: None,
            welcome: None,
            email: String::new(),
            body: String::new(),
            attempt: AttemptToken::new(),
            last_credential: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn outcome(&self) -> Option<&AuthOutcome> {
        self.outcome.as_ref()
    }

    pub fn welcome(&self) -> Option<&WelcomeContext> {
        self.welcome.as_ref()
    }

    pub fn attempt(&self) -> AttemptToken {
        self.attempt
    }

    pub fn failed(&self) -> Option<&FailedAttempt> {
        match &self.phase {
            Phase::Failed(fa) => Some(fa),
            _ => None,
        }
    }

    /// Process an event, update phase, and optionally emit a command.
    ///
    /// Events that do not apply to the current phase are ignored: the
    /// machine never panics and never transitions on stale input.
    pub fn decide(&mut self, event: &ReplyEvent) -> Option<ReplyCommand> {
        match event {
            ReplyEvent::SubmitRequested { email, body } => self.on_submit(email, body),
            ReplyEvent::EmailResolved { resolution } => self.on_resolved(*resolution),
            ReplyEvent::CredentialIssued { password } => self.on_issued(password),
            ReplyEvent::IssuanceConflicted => self.on_issuance_conflict(),
            ReplyEvent::SessionEstablished { session } => self.on_session(session.clone()),
            ReplyEvent::LoginSucceeded { session } => self.on_login(session.clone()),
            ReplyEvent::ReplyDelivered { .. } => self.on_delivered(),
            ReplyEvent::OperationFailed {
                step,
                kind,
                message,
            } => self.on_failed(*step, *kind, message),
            ReplyEvent::RetryRequested => self.on_retry(),
            ReplyEvent::WelcomeClosed => {
                self.welcome = None;
                None
            }
        }
    }

    fn on_submit(&mut self, email: &str, body: &str) -> Option<ReplyCommand> {
        if !self.phase.accepts_submit() {
            warn!(phase = self.phase.name(), "submit ignored mid-flow");
            return None;
        }

        // A fresh submit is a fresh attempt: new token, new outcome.
        self.email = email.to_string();
        self.body = body.to_string();
        self.attempt = AttemptToken::new();
        self.outcome = None;
        self.welcome = None;
        self.last_credential = None;

        self.phase = Phase::ValidatingEmail;
        Some(ReplyCommand::ResolveEmail {
            email: self.email.clone(),
            session_held: self.session.is_some(),
        })
    }

    fn on_resolved(&mut self, resolution: Resolution) -> Option<ReplyCommand> {
        if self.phase != Phase::ValidatingEmail {
            return None;
        }
        match resolution {
            Resolution::AlreadyAuthenticated => match self.session.clone() {
                Some(session) => {
                    self.outcome = Some(AuthOutcome::ExistingAuthenticated);
                    self.phase = Phase::Submitting;
                    Some(self.submit_command(session))
                }
                // Session vanished between submit and resolution. Fall back
                // to the login path instead of submitting unauthenticated.
                None => {
                    self.outcome = Some(AuthOutcome::ExistingNeedsLogin);
                    self.phase = Phase::Authenticating(AuthPath::Login);
                    None
                }
            },
            Resolution::KnownAccount => {
                self.outcome = Some(AuthOutcome::ExistingNeedsLogin);
                self.phase = Phase::Authenticating(AuthPath::Login);
                None
            }
            Resolution::UnknownAccount => {
                self.phase = Phase::Authenticating(AuthPath::Register);
                Some(ReplyCommand::IssueCredential {
                    email: self.email.clone(),
                    attempt: self.attempt,
                })
            }
        }
    }

    fn on_issued(&mut self, password: &str) -> Option<ReplyCommand> {
        if self.phase != Phase::Authenticating(AuthPath::Register) {
            return None;
        }
        self.outcome = Some(AuthOutcome::NewAccountIssued {
            password: password.to_string(),
        });
        self.welcome = Some(WelcomeContext {
            new_user_password: password.to_string(),
        });
        let credential = Credential::Password(password.to_string());
        self.last_credential = Some(credential.clone());
        Some(ReplyCommand::Authenticate {
            email: self.email.clone(),
            credential,
        })
    }

    fn on_issuance_conflict(&mut self) -> Option<ReplyCommand> {
        if self.phase != Phase::Authenticating(AuthPath::Register) {
            return None;
        }
        // The email gained an account between resolve and issue. Not a
        // failure: route into the login sub-path.
        self.outcome = Some(AuthOutcome::ExistingNeedsLogin);
        self.welcome = None;
        self.phase = Phase::Authenticating(AuthPath::Login);
        None
    }

    fn on_session(&mut self, session: Session) -> Option<ReplyCommand> {
        if !matches!(self.phase, Phase::Authenticating(_)) {
            return None;
        }
        self.session = Some(session.clone());
        self.phase = Phase::Submitting;
        Some(self.submit_command(session))
    }

    fn on_login(&mut self, session: Session) -> Option<ReplyCommand> {
        // An out-of-band login is always worth remembering.
        self.session = Some(session.clone());

        match self.phase {
            // Mid-authentication: adopt the session and move straight on to
            // submission, skipping our own credential exchange.
            Phase::Authenticating(_) => {
                self.phase = Phase::Submitting;
                Some(self.submit_command(session))
            }
            // Idle or failed: the user logged in from elsewhere in the UI.
            // Their next submit will short-circuit; nothing to do now.
            _ => None,
        }
    }

    fn on_delivered(&mut self) -> Option<ReplyCommand> {
        if self.phase != Phase::Submitting {
            return None;
        }
        self.phase = Phase::Complete;
        None
    }

    fn on_failed(&mut self, step: Step, kind: ErrorKind, message: &str) -> Option<ReplyCommand> {
        if !self.phase.is_processing() {
            return None;
        }
        self.phase = Phase::Failed(FailedAttempt {
            step,
            kind,
            message: message.to_string(),
        });
        None
    }

    fn on_retry(&mut self) -> Option<ReplyCommand> {
        let failed = match &self.phase {
            Phase::Failed(fa) => fa.clone(),
            _ => return None,
        };
        if !failed.kind.is_retryable() {
            warn!(
                step = failed.step.name(),
                kind = %failed.kind,
                "retry ignored: failure requires new input"
            );
            return None;
        }

        // Re-issue only the failed step; earlier successful steps are not
        // re-run and the attempt token is reused for server-side dedup.
        match failed.step {
            Step::Resolve => {
                self.phase = Phase::ValidatingEmail;
                Some(ReplyCommand::ResolveEmail {
                    email: self.email.clone(),
                    session_held: self.session.is_some(),
                })
            }
            Step::Issue => {
                self.phase = Phase::Authenticating(AuthPath::Register);
                Some(ReplyCommand::IssueCredential {
                    email: self.email.clone(),
                    attempt: self.attempt,
                })
            }
            Step::Authenticate => match self.last_credential.clone() {
                Some(credential) => {
                    self.phase = Phase::Authenticating(AuthPath::Register);
                    Some(ReplyCommand::Authenticate {
                        email: self.email.clone(),
                        credential,
                    })
                }
                // No credential to replay; resolve again from the top of
                // the credential path.
                None => {
                    self.phase = Phase::ValidatingEmail;
                    Some(ReplyCommand::ResolveEmail {
                        email: self.email.clone(),
                        session_held: self.session.is_some(),
                    })
                }
            },
            Step::Submit => match self.session.clone() {
                Some(session) => {
                    self.phase = Phase::Submitting;
                    Some(self.submit_command(session))
                }
                None => {
                    self.phase = Phase::Authenticating(AuthPath::Login);
                    None
                }
            },
        }
    }

    fn submit_command(&self, session: Session) -> ReplyCommand {
        ReplyCommand::SubmitReply {
            session,
            body: self.body.clone(),
            attempt: self.attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), "jwt")
    }

    fn submit_event() -> ReplyEvent {
        ReplyEvent::SubmitRequested {
            email: "new@x.com".into(),
            body: "Can I collect this?".into(),
        }
    }

    #[test]
    fn submit_from_idle_resolves_email() {
        let mut machine = ReplyMachine::new(None);
        let cmd = machine.decide(&submit_event());
        assert_eq!(
            cmd,
            Some(ReplyCommand::ResolveEmail {
                email: "new@x.com".into(),
                session_held: false,
            })
        );
        assert_eq!(*machine.phase(), Phase::ValidatingEmail);
    }

    #[test]
    fn authenticated_resolution_goes_straight_to_submitting() {
        let s = session();
        let mut machine = ReplyMachine::new(Some(s.clone()));

        let cmd = machine.decide(&submit_event());
        assert_eq!(
            cmd,
            Some(ReplyCommand::ResolveEmail {
                email: "new@x.com".into(),
                session_held: true,
            })
        );

        let cmd = machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::AlreadyAuthenticated,
        });
        match cmd {
            Some(ReplyCommand::SubmitReply { session, body, .. }) => {
                assert_eq!(session, s);
                assert_eq!(body, "Can I collect this?");
            }
            other => panic!("expected SubmitReply, got {:?}", other),
        }
        assert_eq!(*machine.phase(), Phase::Submitting);
        assert_eq!(machine.outcome(), Some(&AuthOutcome::ExistingAuthenticated));
    }

    #[test]
    fn unknown_email_runs_the_registration_path() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());

        let cmd = machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::UnknownAccount,
        });
        assert!(matches!(
            cmd,
            Some(ReplyCommand::IssueCredential { ref email, .. }) if email == "new@x.com"
        ));
        assert_eq!(*machine.phase(), Phase::Authenticating(AuthPath::Register));

        let cmd = machine.decide(&ReplyEvent::CredentialIssued {
            password: "s3cret".into(),
        });
        assert_eq!(
            cmd,
            Some(ReplyCommand::Authenticate {
                email: "new@x.com".into(),
                credential: Credential::Password("s3cret".into()),
            })
        );
        assert!(machine.welcome().is_some());

        let cmd = machine.decide(&ReplyEvent::SessionEstablished { session: session() });
        assert!(matches!(cmd, Some(ReplyCommand::SubmitReply { .. })));
        assert_eq!(*machine.phase(), Phase::Submitting);

        let cmd = machine.decide(&ReplyEvent::ReplyDelivered {
            receipt: crate::types::DeliveryReceipt { duplicate: false },
        });
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::Complete);
        assert_eq!(
            machine.welcome().map(|w| w.new_user_password.as_str()),
            Some("s3cret")
        );
    }

    #[test]
    fn known_email_waits_for_out_of_band_login() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());

        let cmd = machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::KnownAccount,
        });
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::Authenticating(AuthPath::Login));
        assert_eq!(machine.outcome(), Some(&AuthOutcome::ExistingNeedsLogin));

        let cmd = machine.decide(&ReplyEvent::LoginSucceeded { session: session() });
        assert!(matches!(cmd, Some(ReplyCommand::SubmitReply { .. })));
        assert_eq!(*machine.phase(), Phase::Submitting);
    }

    #[test]
    fn issuance_conflict_routes_to_login_not_failure() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());
        machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::UnknownAccount,
        });

        let cmd = machine.decide(&ReplyEvent::IssuanceConflicted);
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::Authenticating(AuthPath::Login));
        assert!(machine.welcome().is_none());
        assert_eq!(machine.outcome(), Some(&AuthOutcome::ExistingNeedsLogin));
    }

    #[test]
    fn failure_remembers_the_step_and_retry_resumes_there() {
        let s = session();
        let mut machine = ReplyMachine::new(Some(s));
        machine.decide(&submit_event());
        machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::AlreadyAuthenticated,
        });
        let token_before = machine.attempt();

        let cmd = machine.decide(&ReplyEvent::OperationFailed {
            step: Step::Submit,
            kind: ErrorKind::Transient,
            message: "The operation timed out. Please try again.".into(),
        });
        assert_eq!(cmd, None);
        assert_eq!(machine.failed().map(|f| f.step), Some(Step::Submit));

        let cmd = machine.decide(&ReplyEvent::RetryRequested);
        match cmd {
            Some(ReplyCommand::SubmitReply { attempt, .. }) => {
                assert_eq!(attempt, token_before, "retry must reuse the attempt token");
            }
            other => panic!("expected SubmitReply, got {:?}", other),
        }
        assert_eq!(*machine.phase(), Phase::Submitting);
    }

    #[test]
    fn auth_failures_are_not_blindly_retryable() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());
        machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::UnknownAccount,
        });
        machine.decide(&ReplyEvent::CredentialIssued {
            password: "pw".into(),
        });
        machine.decide(&ReplyEvent::OperationFailed {
            step: Step::Authenticate,
            kind: ErrorKind::Auth,
            message: "We couldn't sign you in.".into(),
        });

        let cmd = machine.decide(&ReplyEvent::RetryRequested);
        assert_eq!(cmd, None);
        assert!(matches!(machine.phase(), Phase::Failed(_)));
    }

    #[test]
    fn submit_mid_flow_is_ignored() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());
        assert_eq!(*machine.phase(), Phase::ValidatingEmail);

        let cmd = machine.decide(&submit_event());
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::ValidatingEmail);
    }

    #[test]
    fn a_fresh_submit_mints_a_fresh_attempt_token() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());
        let first = machine.attempt();
        machine.decide(&ReplyEvent::OperationFailed {
            step: Step::Resolve,
            kind: ErrorKind::Transient,
            message: "timeout".into(),
        });

        machine.decide(&submit_event());
        assert_ne!(machine.attempt(), first);
    }

    #[test]
    fn login_while_idle_only_records_the_session() {
        let mut machine = ReplyMachine::new(None);
        let cmd = machine.decide(&ReplyEvent::LoginSucceeded { session: session() });
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::Idle);
        assert!(machine.session().is_some());

        // The next submit short-circuits resolution.
        let cmd = machine.decide(&submit_event());
        assert!(matches!(
            cmd,
            Some(ReplyCommand::ResolveEmail { session_held: true, .. })
        ));
    }

    #[test]
    fn welcome_closed_clears_the_context() {
        let mut machine = ReplyMachine::new(None);
        machine.decide(&submit_event());
        machine.decide(&ReplyEvent::EmailResolved {
            resolution: Resolution::UnknownAccount,
        });
        machine.decide(&ReplyEvent::CredentialIssued {
            password: "pw".into(),
        });
        assert!(machine.welcome().is_some());

        machine.decide(&ReplyEvent::WelcomeClosed);
        assert!(machine.welcome().is_none());
    }

    #[test]
    fn stale_facts_are_ignored_outside_their_phase() {
        let mut machine = ReplyMachine::new(None);
        let cmd = machine.decide(&ReplyEvent::ReplyDelivered {
            receipt: crate::types::DeliveryReceipt { duplicate: false },
        });
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::Idle);

        let cmd = machine.decide(&ReplyEvent::CredentialIssued {
            password: "pw".into(),
        });
        assert_eq!(cmd, None);
        assert_eq!(*machine.phase(), Phase::Idle);
    }
}
