//! Collaborator seams.
//!
//! The engine talks to the outside world through these four traits. HTTP
//! implementations belong to the API-client layer; the engine only sees the
//! traits, injected at construction. Implementations return `anyhow::Result`
//! and should wrap wire failures in [`crate::error::ApiError`] so the engine
//! can categorize them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    AttemptToken, Credential, DeliveryReceipt, IdentityKind, Issuance, ReplySource, Session,
};

/// Determines whether an email belongs to an existing account.
///
/// Read-only: resolution performs no registration and no login.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, email: &str) -> Result<IdentityKind>;
}

/// Creates a new account with a generated password.
///
/// Must be idempotent on (email, attempt): a retried call after an ambiguous
/// timeout returns the same created credential or
/// [`Issuance::AlreadyRegistered`], never a duplicate account.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, email: &str, attempt: AttemptToken) -> Result<Issuance>;
}

/// Exchanges a credential for an authenticated session.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate(&self, email: &str, credential: &Credential) -> Result<Session>;
}

/// Delivers a composed reply against a post.
///
/// A delivery the server has already accepted for this attempt token must be
/// reported with `duplicate: true`, not performed again.
#[async_trait]
pub trait ReplySubmitter: Send + Sync {
    async fn submit(
        &self,
        session: &Session,
        source: &ReplySource,
        body: &str,
        attempt: AttemptToken,
    ) -> Result<DeliveryReceipt>;
}

/// The injected bundle of collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn IdentityResolver>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub authenticator: Arc<dyn SessionAuthenticator>,
    pub submitter: Arc<dyn ReplySubmitter>,
}
