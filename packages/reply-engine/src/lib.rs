//! # Reply Engine
//!
//! Orchestration for replying to a marketplace post: a typed state machine
//! decides, operations execute, and the UI only observes.
//!
//! The same flow serves three kinds of repliers:
//! - an already-authenticated member (straight to submission),
//! - a returning but logged-out visitor (suspends for an out-of-band login),
//! - a brand-new visitor (silently registered with a generated password,
//!   disclosed once through the welcome surface).
//!
//! ## Architecture
//!
//! ```text
//! UI ──submit()/retry()/on_login_success()──► ReplyEngine
//!                                                 │ event
//!                                                 ▼
//!                                   ReplyMachine.decide()  (pure, no IO)
//!                                                 │ command
//!                                                 ▼
//!                                   Operations.run()  (one collaborator
//!                                                 │    call, bounded)
//!                                                 ▼ fact
//!                                   back into decide(), until no command
//!
//! UI ◄──watch::Receiver<ReplySnapshot>── published after every transition
//! ```
//!
//! ## Key invariants
//!
//! 1. **Machines are pure** - `decide` is synchronous, serial, at most one
//!    command per event
//! 2. **Operations are stateless** - commands carry all needed data
//! 3. **One operation in flight** - the submit gate is checked and flipped
//!    under one lock
//! 4. **Errors never escape** - failures become one sanitized snapshot
//!    field, never a panic or an `Err` at the boundary
//! 5. **The draft survives failure** - retry never loses typed input
//! 6. **Teardown is silent** - a closed engine publishes nothing, though an
//!    in-flight mutation may still land server-side
//!
//! ## Example
//!
//! ```ignore
//! use reply_engine::{Collaborators, EngineConfig, ReplyEngine, ReplySource};
//!
//! let engine = ReplyEngine::builder(collaborators, ReplySource::new(message_id))
//!     .with_session(current_session)
//!     .build();
//!
//! let mut ui = engine.subscribe();
//!
//! engine.set_email("someone@example.com");
//! engine.start_typing("Can I collect this?");
//! engine.submit().await;
//!
//! if ui.borrow().show_welcome_modal {
//!     // show the generated password once, then:
//!     engine.close_welcome_modal();
//! }
//! ```

// Core modules
mod api;
mod commands;
mod config;
mod draft;
mod effects;
mod engine;
mod error;
mod events;
mod machine;
mod registry;
mod snapshot;
mod types;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


// Re-export collaborator seams
pub use api::{
    Collaborators, CredentialIssuer, IdentityResolver, ReplySubmitter, SessionAuthenticator,
};

// Re-export machine types
pub use commands::{ReplyCommand, Step};
pub use events::{ReplyEvent, Resolution};
pub use machine::{AuthPath, FailedAttempt, Phase, PhaseKind, ReplyMachine};

// Re-export engine types (primary entry point)
pub use config::EngineConfig;
pub use engine::{EngineBuilder, ReplyEngine};
pub use registry::EngineRegistry;
pub use snapshot::ReplySnapshot;

// Re-export error types
pub use error::{ApiError, ErrorKind};

// Re-export domain types
pub use draft::{is_valid_email, ReplyDraft, COLLECT_SEPARATOR};
pub use types::{
    AttemptToken, AuthOutcome, Credential, DeliveryReceipt, IdentityKind, Issuance, ReplySource,
    Session, WelcomeContext,
};

// Re-export commonly used external types
pub use async_trait::async_trait;
