//! The reply engine: draft ownership, the submit gate, and the drive loop.
//!
//! The engine owns one [`ReplyMachine`] and one [`ReplyDraft`] for a single
//! post/user pairing. `submit()` feeds an event to the machine, executes the
//! resulting command through the operations layer, feeds the produced fact
//! back in, and repeats until the machine stops emitting commands - either
//! because the flow completed, failed, or suspended waiting for an
//! out-of-band login.
//!
//! # Concurrency
//!
//! All state lives behind one mutex, and the lock is never held across an
//! await. The submit gate is checked and flipped under that lock, so two
//! racing `submit()` calls observe exactly one winner and at most one
//! collaborator call is in flight at any time.
//!
//! # Teardown
//!
//! `close()` marks the engine closed. An operation already in flight runs to
//! completion on the network (a mutation that lands server-side is allowed
//! to land), but its result is discarded: no transition, no snapshot.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::Collaborators;
use crate::commands::ReplyCommand;
use crate::config::EngineConfig;
use crate::draft::ReplyDraft;
use crate::effects::Operations;
use crate::events::ReplyEvent;
use crate::machine::{AuthPath, Phase, ReplyMachine};
use crate::snapshot::ReplySnapshot;
use crate::types::{ReplySource, Session};

struct Inner {
    machine: ReplyMachine,
    draft: ReplyDraft,
    /// Local validation message. Operation failures are projected from the
    /// machine's failed phase instead.
    local_error: Option<String>,
    closed: bool,
}

pub struct ReplyEngine {
    inner: Mutex<Inner>,
    ops: Operations,
    source: ReplySource,
    tx: watch::Sender<ReplySnapshot>,
}

impl ReplyEngine {
    pub fn builder(collaborators: Arc<Collaborators>, source: ReplySource) -> EngineBuilder {
        EngineBuilder::new(collaborators, source)
    }

    /// Subscribe to the reactive projection. The receiver always holds the
    /// latest snapshot; intermediate states may be skipped by slow readers.
    pub fn subscribe(&self) -> watch::Receiver<ReplySnapshot> {
        self.tx.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> ReplySnapshot {
        self.tx.borrow().clone()
    }

    pub fn source(&self) -> &ReplySource {
        &self.source
    }

    // ------------------------------------------------------------------
    // Draft mutation
    // ------------------------------------------------------------------

    /// Update the reply text as the user types.
    pub fn start_typing(&self, reply_text: &str) {
        self.mutate_draft(|draft| draft.reply_text = reply_text.to_string());
    }

    pub fn set_email(&self, email: &str) {
        self.mutate_draft(|draft| draft.email = email.to_string());
    }

    pub fn set_collect_text(&self, collect_text: Option<String>) {
        self.mutate_draft(|draft| draft.collect_text = collect_text);
    }

    fn mutate_draft(&self, apply: impl FnOnce(&mut ReplyDraft)) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        apply(&mut inner.draft);
        // Typing resolves local validation complaints.
        inner.local_error = None;
        self.publish(&inner);
    }

    // ------------------------------------------------------------------
    // Flow triggers
    // ------------------------------------------------------------------

    /// Send the reply. A call while the draft is unsendable or an operation
    /// is outstanding is a no-op that surfaces a local message - the
    /// double-click guard.
    pub async fn submit(&self) {
        let first = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }

            if let Some(reason) = self.rejection_reason(&inner) {
                warn!(
                    phase = inner.machine.phase().name(),
                    message_id = %self.source.message_id,
                    reason,
                    "submit blocked"
                );
                inner.local_error = Some(reason.to_string());
                self.publish(&inner);
                return;
            }

            inner.local_error = None;
            let event = ReplyEvent::SubmitRequested {
                email: inner.draft.email.trim().to_string(),
                body: inner.draft.composed_body(),
            };
            let cmd = self.advance(&mut inner, event);
            self.publish(&inner);
            cmd
        };
        self.drive(first).await;
    }

    /// Retry the failed step of the current attempt. Earlier successful
    /// steps are not re-run. A no-op unless the engine is in a retryable
    /// failed state.
    pub async fn retry(&self) {
        let first = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            if !matches!(inner.machine.phase(), Phase::Failed(_)) {
                warn!(
                    phase = inner.machine.phase().name(),
                    "retry ignored: nothing failed"
                );
                return;
            }
            inner.local_error = None;
            let cmd = self.advance(&mut inner, ReplyEvent::RetryRequested);
            self.publish(&inner);
            cmd
        };
        self.drive(first).await;
    }

    /// Accept a session established out-of-band (a separate login modal).
    /// Mid-authentication this resumes the flow straight into submission;
    /// otherwise the session is recorded for the next submit.
    pub async fn on_login_success(&self, session: Session) {
        let first = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            let cmd = self.advance(&mut inner, ReplyEvent::LoginSucceeded { session });
            self.publish(&inner);
            cmd
        };
        self.drive(first).await;
    }

    /// Dismiss the post-registration welcome modal, discarding the
    /// generated-password disclosure.
    pub fn close_welcome_modal(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        self.advance(&mut inner, ReplyEvent::WelcomeClosed);
        self.publish(&inner);
    }

    /// Return a non-processing engine to idle. Clears the error, outcome and
    /// welcome surfaces but keeps the draft and any adopted session.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        if inner.machine.phase().is_processing() {
            warn!("reset ignored while an operation is outstanding");
            return;
        }
        let session = inner.machine.session().cloned();
        inner.machine = ReplyMachine::new(session);
        inner.local_error = None;
        self.publish(&inner);
    }

    /// Tear the engine down. In-flight work is abandoned on the UI side: no
    /// further transitions or snapshots, though a mutation already sent to
    /// the network may still land server-side.
    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            info!(message_id = %self.source.message_id, "reply engine closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Diagnostic view of the engine, safe to log.
    pub fn debug_info(&self) -> serde_json::Value {
        let inner = self.lock();
        json!({
            "phase": inner.machine.phase().name(),
            "message_id": self.source.message_id,
            "origin": self.source.origin,
            "email_valid": inner.draft.email_valid(),
            "has_reply": inner.draft.has_reply(),
            "has_collect": inner.draft.collect_text.is_some(),
            "is_logged_in": inner.machine.session().is_some(),
            "error": self.projected_error(&inner),
            "closed": inner.closed,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("reply engine mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Why a submit cannot start right now, if it cannot.
    fn rejection_reason(&self, inner: &Inner) -> Option<&'static str> {
        if !inner.machine.phase().accepts_submit() {
            return Some(if inner.machine.phase().is_processing() {
                "Your reply is already being sent."
            } else {
                "Your reply has already been sent."
            });
        }
        if self.source.expired(Utc::now()) {
            return Some("This post is no longer accepting replies.");
        }
        if !inner.draft.email_valid() {
            return Some("Please enter a valid email address.");
        }
        if !inner.draft.has_reply() {
            return Some("Please write a reply first.");
        }
        None
    }

    /// Feed one event to the machine and log the transition.
    fn advance(&self, inner: &mut Inner, event: ReplyEvent) -> Option<ReplyCommand> {
        let from = inner.machine.phase().name();
        let cmd = inner.machine.decide(&event);
        let to = inner.machine.phase().name();
        info!(
            from,
            event = event.name(),
            to,
            message_id = %self.source.message_id,
            origin = self.source.origin.as_deref(),
            "reply state transition"
        );
        cmd
    }

    /// Run commands until the machine stops emitting them.
    async fn drive(&self, mut command: Option<ReplyCommand>) {
        while let Some(cmd) = command {
            let event = self.ops.run(cmd).await;
            let mut inner = self.lock();
            if inner.closed {
                // Torn down mid-operation: the result has no UI observer.
                return;
            }
            // Operation facts supersede any local validation complaint.
            inner.local_error = None;
            command = self.advance(&mut inner, event);
            self.publish(&inner);
        }
    }

    fn projected_error(&self, inner: &Inner) -> Option<String> {
        inner
            .machine
            .failed()
            .map(|fa| fa.message.clone())
            .or_else(|| inner.local_error.clone())
    }

    fn publish(&self, inner: &Inner) {
        if inner.closed {
            return;
        }
        let phase = inner.machine.phase();
        let welcome = inner.machine.welcome();
        let is_complete = matches!(phase, Phase::Complete);
        let snapshot = ReplySnapshot {
            phase: phase.kind(),
            email: inner.draft.email.clone(),
            reply_text: inner.draft.reply_text.clone(),
            collect_text: inner.draft.collect_text.clone(),
            email_valid: inner.draft.email_valid(),
            can_send: phase.accepts_submit()
                && inner.draft.email_valid()
                && inner.draft.has_reply(),
            is_processing: phase.is_processing(),
            is_complete,
            login_required: matches!(phase, Phase::Authenticating(AuthPath::Login)),
            error: self.projected_error(inner),
            show_welcome_modal: is_complete && welcome.is_some(),
            new_user_password: welcome.map(|w| w.new_user_password.clone()),
        };
        self.tx.send_replace(snapshot);
    }
}

pub struct EngineBuilder {
    collaborators: Arc<Collaborators>,
    source: ReplySource,
    session: Option<Session>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new(collaborators: Arc<Collaborators>, source: ReplySource) -> Self {
        Self {
            collaborators,
            source,
            session: None,
            config: EngineConfig::default(),
        }
    }

    /// Inject an already-authenticated session so submission short-circuits
    /// the credential path.
    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<ReplyEngine> {
        let ops = Operations::new(
            self.collaborators,
            self.source.clone(),
            self.config.operation_timeout,
        );
        let inner = Inner {
            machine: ReplyMachine::new(self.session),
            draft: ReplyDraft::default(),
            local_error: None,
            closed: false,
        };
        let (tx, _rx) = watch::channel(ReplySnapshot::initial());
        let engine = Arc::new(ReplyEngine {
            inner: Mutex::new(inner),
            ops,
            source: self.source,
            tx,
        });
        engine.publish(&engine.lock());
        engine
    }
}
