//! The operations layer: commands in, facts out.
//!
//! One command maps to at most one collaborator call, wrapped in the
//! configured timeout. Operations hold no flow state - commands carry all
//! the data they need. Failures never escape as `Err`: every error becomes a
//! sanitized [`ReplyEvent::OperationFailed`] fact, and the raw error is
//! logged here before sanitization discards it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error};

use crate::api::Collaborators;
use crate::commands::ReplyCommand;
use crate::error::{categorize, ApiError};
use crate::events::{ReplyEvent, Resolution};
use crate::types::{IdentityKind, Issuance, ReplySource};

pub struct Operations {
    collaborators: Arc<Collaborators>,
    source: ReplySource,
    timeout: Duration,
}

impl Operations {
    pub fn new(collaborators: Arc<Collaborators>, source: ReplySource, timeout: Duration) -> Self {
        Self {
            collaborators,
            source,
            timeout,
        }
    }

    /// Execute one command, always producing exactly one fact event.
    pub async fn run(&self, command: ReplyCommand) -> ReplyEvent {
        let step = command.step();
        match self.execute(command).await {
            Ok(event) => event,
            Err(err) => {
                error!(
                    step = step.name(),
                    message_id = %self.source.message_id,
                    error = %err,
                    "reply operation failed"
                );
                let (kind, message) = categorize(&err);
                ReplyEvent::OperationFailed {
                    step,
                    kind,
                    message,
                }
            }
        }
    }

    async fn execute(&self, command: ReplyCommand) -> Result<ReplyEvent> {
        match command {
            ReplyCommand::ResolveEmail {
                email,
                session_held,
            } => {
                // An injected or adopted session settles resolution locally.
                if session_held {
                    return Ok(ReplyEvent::EmailResolved {
                        resolution: Resolution::AlreadyAuthenticated,
                    });
                }
                let kind = self
                    .bounded(self.collaborators.resolver.resolve(&email))
                    .await?;
                let resolution = match kind {
                    IdentityKind::Known => Resolution::KnownAccount,
                    IdentityKind::Unknown => Resolution::UnknownAccount,
                };
                Ok(ReplyEvent::EmailResolved { resolution })
            }

            ReplyCommand::IssueCredential { email, attempt } => {
                let issuance = self
                    .bounded(self.collaborators.issuer.issue(&email, attempt))
                    .await?;
                match issuance {
                    Issuance::Created { password } => {
                        Ok(ReplyEvent::CredentialIssued { password })
                    }
                    Issuance::AlreadyRegistered => Ok(ReplyEvent::IssuanceConflicted),
                }
            }

            ReplyCommand::Authenticate { email, credential } => {
                let session = self
                    .bounded(
                        self.collaborators
                            .authenticator
                            .authenticate(&email, &credential),
                    )
                    .await?;
                Ok(ReplyEvent::SessionEstablished { session })
            }

            ReplyCommand::SubmitReply {
                session,
                body,
                attempt,
            } => {
                let receipt = self
                    .bounded(self.collaborators.submitter.submit(
                        &session,
                        &self.source,
                        &body,
                        attempt,
                    ))
                    .await?;
                if receipt.duplicate {
                    debug!(
                        message_id = %self.source.message_id,
                        attempt = %attempt,
                        "delivery already accepted for this attempt; treating as sent"
                    );
                }
                Ok(ReplyEvent::ReplyDelivered { receipt })
            }
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout.into()),
        }
    }
}
