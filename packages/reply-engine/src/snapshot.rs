//! The reactive projection the UI observes.
//!
//! A snapshot is published after every transition and draft mutation, never
//! after teardown. The UI binds form fields to the draft fields and drives
//! button disablement and banners from the booleans; it never inspects the
//! machine directly.

use serde::Serialize;

use crate::machine::PhaseKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplySnapshot {
    pub phase: PhaseKind,

    // Form data
    pub email: String,
    pub reply_text: String,
    pub collect_text: Option<String>,

    // Derived flags
    pub email_valid: bool,
    pub can_send: bool,
    pub is_processing: bool,
    pub is_complete: bool,
    /// True while the flow is suspended waiting for an out-of-band login.
    pub login_required: bool,

    // Failure surface
    pub error: Option<String>,

    // Post-registration welcome surface
    pub show_welcome_modal: bool,
    pub new_user_password: Option<String>,
}

impl ReplySnapshot {
    pub(crate) fn initial() -> Self {
        Self {
            phase: PhaseKind::Idle,
            email: String::new(),
            reply_text: String::new(),
            collect_text: None,
            email_valid: false,
            can_send: false,
            is_processing: false,
            is_complete: false,
            login_required: false,
            error: None,
            show_welcome_modal: false,
            new_user_password: None,
        }
    }
}
