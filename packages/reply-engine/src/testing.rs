//! Testing utilities: a scriptable in-memory backend.
//!
//! `FakeBackend` implements all four collaborator traits against an
//! in-memory account directory, counts every call, records call order, and
//! can be scripted to fail specific steps. It honors the same idempotency
//! contracts the real backend promises: issuance is idempotent per
//! (email, attempt) and a replayed delivery for a known attempt token
//! reports `duplicate: true`.
//!
//! Available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! reply-engine = { version = "0.1", features = ["testing"] }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::api::{
    Collaborators, CredentialIssuer, IdentityResolver, ReplySubmitter, SessionAuthenticator,
};
use crate::error::ApiError;
use crate::types::{
    AttemptToken, Credential, DeliveryReceipt, IdentityKind, Issuance, ReplySource, Session,
};

const PASSWORD_CHARSET: &[u8] = b"abcdefghjkmnpqrstuvwxyzABCDEFGHJKMNPQRSTUVWXYZ23456789";
const PASSWORD_LEN: usize = 12;

/// Generate a password the way the real issuer would: short, random,
/// unambiguous characters.
pub fn generated_password() -> String {
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_CHARSET[fastrand::usize(..PASSWORD_CHARSET.len())] as char)
        .collect()
}

struct FakeAccount {
    member_id: Uuid,
    password: String,
}

#[derive(Default)]
struct Scripts {
    resolve: VecDeque<ApiError>,
    issue: VecDeque<ApiError>,
    authenticate: VecDeque<ApiError>,
    submit: VecDeque<ApiError>,
    resolve_overrides: VecDeque<IdentityKind>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, FakeAccount>,
    /// Credentials issued per (email, attempt) - the idempotency ledger.
    issued: HashMap<(String, AttemptToken), String>,
    delivered: HashSet<AttemptToken>,
    deliveries: Vec<(AttemptToken, String)>,
    submit_attempts: Vec<AttemptToken>,
    call_log: Vec<&'static str>,
    scripts: Scripts,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
    resolve_calls: AtomicUsize,
    issue_calls: AtomicUsize,
    auth_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    submit_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBackend {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bundle this backend as all four collaborators.
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            resolver: self.clone(),
            issuer: self.clone(),
            authenticator: self.clone(),
            submitter: self.clone(),
        }
    }

    /// Pre-seed a known account, returning a session for it.
    pub fn register_account(&self, email: &str) -> Session {
        let member_id = Uuid::new_v4();
        self.lock().accounts.insert(
            email.to_string(),
            FakeAccount {
                member_id,
                password: generated_password(),
            },
        );
        Session::new(member_id, format!("jwt-{member_id}"))
    }

    pub fn password_for(&self, email: &str) -> Option<String> {
        self.lock().accounts.get(email).map(|a| a.password.clone())
    }

    // ---- scripting ----

    pub fn push_resolve_failure(&self, err: ApiError) {
        self.lock().scripts.resolve.push_back(err);
    }

    pub fn push_issue_failure(&self, err: ApiError) {
        self.lock().scripts.issue.push_back(err);
    }

    pub fn push_auth_failure(&self, err: ApiError) {
        self.lock().scripts.authenticate.push_back(err);
    }

    pub fn push_submit_failure(&self, err: ApiError) {
        self.lock().scripts.submit.push_back(err);
    }

    /// Force the next resolution to report this identity kind regardless of
    /// the directory - simulates the directory changing under the flow.
    pub fn push_resolve_override(&self, kind: IdentityKind) {
        self.lock().scripts.resolve_overrides.push_back(kind);
    }

    /// Hold every subsequent submission until the returned gate is notified.
    pub fn hold_submissions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate_slot() = Some(gate.clone());
        gate
    }

    /// Stop holding submissions.
    pub fn release_submissions(&self) {
        *self.gate_slot() = None;
    }

    // ---- observation ----

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Which collaborators ran, in order.
    pub fn call_log(&self) -> Vec<&'static str> {
        self.lock().call_log.clone()
    }

    /// (attempt token, body) for every delivery the submitter performed.
    pub fn deliveries(&self) -> Vec<(AttemptToken, String)> {
        self.lock().deliveries.clone()
    }

    /// The attempt token of every submit call, successful or not.
    pub fn submit_attempts(&self) -> Vec<AttemptToken> {
        self.lock().submit_attempts.clone()
    }

    // ---- internals ----

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn gate_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Notify>>> {
        self.submit_gate.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn scripted_failure(
        &self,
        pick: impl FnOnce(&mut Scripts) -> Option<ApiError>,
    ) -> Option<ApiError> {
        pick(&mut self.lock().scripts)
    }
}

#[async_trait]
impl IdentityResolver for FakeBackend {
    async fn resolve(&self, email: &str) -> Result<IdentityKind> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().call_log.push("resolve");
        if let Some(err) = self.scripted_failure(|s| s.resolve.pop_front()) {
            return Err(err.into());
        }
        if let Some(kind) = self.lock().scripts.resolve_overrides.pop_front() {
            return Ok(kind);
        }
        let known = self.lock().accounts.contains_key(email);
        Ok(if known {
            IdentityKind::Known
        } else {
            IdentityKind::Unknown
        })
    }
}

#[async_trait]
impl CredentialIssuer for FakeBackend {
    async fn issue(&self, email: &str, attempt: AttemptToken) -> Result<Issuance> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().call_log.push("issue");
        if let Some(err) = self.scripted_failure(|s| s.issue.pop_front()) {
            return Err(err.into());
        }

        let mut state = self.lock();
        let key = (email.to_string(), attempt);

        // Replay of an issuance that already landed for this attempt.
        if let Some(password) = state.issued.get(&key) {
            return Ok(Issuance::Created {
                password: password.clone(),
            });
        }

        // The email gained an account some other way.
        if state.accounts.contains_key(email) {
            return Ok(Issuance::AlreadyRegistered);
        }

        let password = generated_password();
        state.accounts.insert(
            email.to_string(),
            FakeAccount {
                member_id: Uuid::new_v4(),
                password: password.clone(),
            },
        );
        state.issued.insert(key, password.clone());
        Ok(Issuance::Created { password })
    }
}

#[async_trait]
impl SessionAuthenticator for FakeBackend {
    async fn authenticate(&self, email: &str, credential: &Credential) -> Result<Session> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().call_log.push("authenticate");
        if let Some(err) = self.scripted_failure(|s| s.authenticate.pop_front()) {
            return Err(err.into());
        }

        let state = self.lock();
        let account = state
            .accounts
            .get(email)
            .ok_or(ApiError::InvalidCredential)?;
        let valid = match credential {
            Credential::Password(password) => *password == account.password,
            Credential::MagicLink(token) => *token == format!("magic-link:{email}"),
        };
        if !valid {
            return Err(ApiError::InvalidCredential.into());
        }
        Ok(Session::new(
            account.member_id,
            format!("jwt-{}", account.member_id),
        ))
    }
}

#[async_trait]
impl ReplySubmitter for FakeBackend {
    async fn submit(
        &self,
        _session: &Session,
        _source: &ReplySource,
        body: &str,
        attempt: AttemptToken,
    ) -> Result<DeliveryReceipt> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.lock();
            state.call_log.push("submit");
            state.submit_attempts.push(attempt);
        }

        let gate = self.gate_slot().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(err) = self.scripted_failure(|s| s.submit.pop_front()) {
            return Err(err.into());
        }

        let mut state = self.lock();
        if !state.delivered.insert(attempt) {
            return Ok(DeliveryReceipt { duplicate: true });
        }
        state.deliveries.push((attempt, body.to_string()));
        Ok(DeliveryReceipt { duplicate: false })
    }
}
