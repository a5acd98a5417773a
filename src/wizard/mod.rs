//! The three-step wizard: wish → method fields → streamed report.
//!
//! [`WizardController`] owns the [`Session`] and is the only thing that
//! mutates it. Every change goes through one of the named transitions below,
//! and transitions that await the provider report each observable state to a
//! caller-supplied observer so partial report text can be rendered as it
//! arrives.

use futures::stream::StreamExt;

use crate::errors::OracleError;
use crate::form::FieldChange;
use crate::provider::FortuneService;
use crate::wire::{FortuneMethod, UserInfo};

pub const METHOD_FALLBACK_ERROR: &str = "connection timeout: the quantum field is unstable.";
pub const STREAM_FALLBACK_ERROR: &str = "decode failure: the fate chain collided.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    Wish,
    InfoGathering,
    Result,
}

/// What a transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Preconditions not met; nothing changed and no call was made.
    Ignored,
    Advanced,
    /// The call failed; `Session::error` holds the message.
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    step: WizardStep,
    wish: String,
    method: Option<FortuneMethod>,
    user_info: UserInfo,
    result_text: String,
    is_loading: bool,
    error: Option<String>,
}

impl Session {
    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn wish(&self) -> &str {
        &self.wish
    }

    pub fn method(&self) -> Option<&FortuneMethod> {
        self.method.as_ref()
    }

    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }

    pub fn result_text(&self) -> &str {
        &self.result_text
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct WizardController {
    session: Session,
}

impl WizardController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Edits the wish text. Only allowed on the wish step while idle.
    pub fn set_wish(&mut self, wish: impl Into<String>) -> bool {
        if self.session.step != WizardStep::Wish || self.session.is_loading {
            return false;
        }
        self.session.wish = wish.into();
        true
    }

    /// Applies a form edit to one UserInfo key. Unknown keys are rejected.
    pub fn apply_change(&mut self, change: FieldChange) -> bool {
        if self.session.step != WizardStep::InfoGathering || self.session.is_loading {
            return false;
        }
        self.session.user_info.set(&change.name, change.value)
    }

    /// WISH → INFO_GATHERING.
    pub async fn submit_wish<F>(&mut self, service: &dyn FortuneService, mut observe: F) -> Outcome
    where
        F: FnMut(&Session),
    {
        if self.session.is_loading
            || self.session.step != WizardStep::Wish
            || self.session.wish.trim().is_empty()
        {
            return Outcome::Ignored;
        }

        self.session.is_loading = true;
        self.session.error = None;
        observe(&self.session);

        let outcome = match service.select_method(&self.session.wish).await {
            Ok(method) => {
                self.session.user_info = UserInfo::for_method(&method);
                tracing::info!(method = %method.name, fields = self.session.user_info.len(), "method selected");
                self.session.method = Some(method);
                self.session.step = WizardStep::InfoGathering;
                Outcome::Advanced
            }
            Err(e) => {
                tracing::error!("method selection failed: {}", e);
                self.session.error = Some(user_message(&e, METHOD_FALLBACK_ERROR));
                Outcome::Failed
            }
        };

        self.session.is_loading = false;
        observe(&self.session);
        outcome
    }

    /// INFO_GATHERING → RESULT. The step changes before the provider is
    /// called; each chunk is appended and observed as soon as it arrives.
    pub async fn submit_info<F>(&mut self, service: &dyn FortuneService, mut observe: F) -> Outcome
    where
        F: FnMut(&Session),
    {
        if self.session.is_loading || self.session.step != WizardStep::InfoGathering {
            return Outcome::Ignored;
        }
        let Some(method) = self.session.method.clone() else {
            return Outcome::Ignored;
        };

        self.session.is_loading = true;
        self.session.error = None;
        self.session.result_text.clear();
        self.session.step = WizardStep::Result;
        observe(&self.session);

        let mut failure = None;
        match service
            .stream_report(&self.session.wish, &method, &self.session.user_info)
            .await
        {
            Ok(mut chunks) => {
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => {
                            self.session.result_text.push_str(&chunk);
                            observe(&self.session);
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
            }
            Err(e) => failure = Some(e),
        }

        let outcome = match failure {
            None => {
                tracing::info!(bytes = self.session.result_text.len(), "report complete");
                Outcome::Advanced
            }
            Some(e) => {
                tracing::error!(bytes = self.session.result_text.len(), "report stream failed: {}", e);
                self.session.error = Some(user_message(&e, STREAM_FALLBACK_ERROR));
                Outcome::Failed
            }
        };

        self.session.is_loading = false;
        observe(&self.session);
        outcome
    }

    /// RESULT → WISH. Only rewinds the step; wish, method and report text
    /// stay until the next run overwrites them.
    pub fn reset(&mut self) -> bool {
        if self.session.step != WizardStep::Result || self.session.is_loading {
            return false;
        }
        self.session.step = WizardStep::Wish;
        true
    }
}

/// The error's own message, or `fallback` when it carries none.
fn user_message(err: &OracleError, fallback: &str) -> String {
    let blank = match err {
        OracleError::Provider(m) | OracleError::Schema(m) | OracleError::Stream(m) => m.trim().is_empty(),
        OracleError::Http(_) => false,
    };
    if blank {
        fallback.to_string()
    } else {
        err.to_string()
    }
}
