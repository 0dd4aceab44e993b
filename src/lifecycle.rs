//! Apply / renew / return state machine for one open license detail.
//!
//! A session is scoped to one license id. It starts `Loading`, becomes `Loaded` or
//! `FetchFailed`, and exposes the actions the loaded status allows. Every action is
//! staged on the confirmation gate, confirmed, then committed; the status shown is only
//! ever the one the server returned, never an optimistic flip.

use crate::api::LicenseApi;
use crate::error::ApiError;
use crate::gate::{ConfirmGate, Prompt};
use crate::model::{
    ApplyRequest, LicenseStatus, RenewRequest, ReturnRequest, SoftwareLicense, UsageCommand,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_GRANT_DAYS: u32 = 60;
pub const DEFAULT_RENEW_DAYS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    Apply,
    Renew,
    Return,
}

impl LifecycleAction {
    pub fn label(self) -> &'static str {
        match self {
            LifecycleAction::Apply => "领用",
            LifecycleAction::Renew => "续期",
            LifecycleAction::Return => "归还",
        }
    }

    fn prompt(self, license_id: i64, terms: GrantTerms) -> Prompt {
        let title = format!("{}确认", self.label());
        let body = match self {
            LifecycleAction::Apply => format!(
                "确定领用授权 #{license_id}？领用期限 {} 天。",
                terms.grant_days
            ),
            LifecycleAction::Renew => format!(
                "确定为授权 #{license_id} 续期 {} 天？",
                terms.renew_days
            ),
            LifecycleAction::Return => format!("确定归还授权 #{license_id}？"),
        };
        Prompt::new(title, body)
    }

    pub fn command(self, license_id: i64, terms: GrantTerms) -> UsageCommand {
        match self {
            LifecycleAction::Apply => UsageCommand::Apply(ApplyRequest {
                license_id,
                duration_days: terms.grant_days,
            }),
            LifecycleAction::Renew => UsageCommand::Renew(RenewRequest {
                record_id: license_id,
                renew_days: terms.renew_days,
            }),
            LifecycleAction::Return => UsageCommand::Return(ReturnRequest { license_id }),
        }
    }
}

/// Actions offered for a loaded status. Expired and unknown statuses are read-only.
pub fn actions_for(status: LicenseStatus) -> &'static [LifecycleAction] {
    match status {
        LicenseStatus::Available => &[LifecycleAction::Apply],
        LicenseStatus::Assigned => &[LifecycleAction::Renew, LifecycleAction::Return],
        LicenseStatus::Expired | LicenseStatus::Unknown(_) => &[],
    }
}

/// Durations sent with apply and renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantTerms {
    pub grant_days: u32,
    pub renew_days: u32,
}

impl Default for GrantTerms {
    fn default() -> Self {
        Self {
            grant_days: DEFAULT_GRANT_DAYS,
            renew_days: DEFAULT_RENEW_DAYS,
        }
    }
}

/// Send one usage command.
pub async fn execute(api: &dyn LicenseApi, command: &UsageCommand) -> Result<(), ApiError> {
    match command {
        UsageCommand::Apply(req) => api.apply(req).await,
        UsageCommand::Renew(req) => api.renew(req).await,
        UsageCommand::Return(req) => api.release(req).await,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Loaded(Box<SoftwareLicense>),
    /// Terminal for this open; the view must be closed and reopened.
    FetchFailed(ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("license {0} has not finished loading")]
    NotLoaded(i64),
    #[error("{} is not available for a license that is {status}", .action.label())]
    Unavailable {
        action: LifecycleAction,
        status: &'static str,
    },
    #[error("another action is still being committed")]
    CommitInFlight,
}

/// What the owner of a session must do after a commit finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Fetch the license again to show its new status.
    Refetch(i64),
    /// The license left this user's scope; dismiss the detail view.
    Close,
    /// Nothing changed; the error is kept on the session.
    Failed(ApiError),
}

#[derive(Debug)]
pub struct LifecycleSession {
    id: u64,
    license_id: i64,
    terms: GrantTerms,
    state: SessionState,
    gate: ConfirmGate<LifecycleAction>,
    in_flight: Option<LifecycleAction>,
    error: Option<ApiError>,
    mutated: bool,
}

impl LifecycleSession {
    pub fn new(id: u64, license_id: i64, terms: GrantTerms) -> Self {
        tracing::debug!(session = id, license_id, "detail session opened");
        Self {
            id,
            license_id,
            terms,
            state: SessionState::Loading,
            gate: ConfirmGate::new(),
            in_flight: None,
            error: None,
            mutated: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn license_id(&self) -> i64 {
        self.license_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn license(&self) -> Option<&SoftwareLicense> {
        match &self.state {
            SessionState::Loaded(license) => Some(license),
            _ => None,
        }
    }

    /// Last commit error, cleared by the next successful commit.
    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Whether any commit succeeded during this session.
    pub fn mutated(&self) -> bool {
        self.mutated
    }

    pub fn in_flight(&self) -> Option<LifecycleAction> {
        self.in_flight
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.gate.prompt()
    }

    pub fn actions(&self) -> &'static [LifecycleAction] {
        self.license()
            .map(|l| actions_for(l.license_status))
            .unwrap_or(&[])
    }

    /// Action controls are disabled while a commit is outstanding or a prompt is open.
    pub fn can_trigger(&self) -> bool {
        self.in_flight.is_none() && !self.gate.is_open() && self.license().is_some()
    }

    pub fn on_fetched(&mut self, result: Result<SoftwareLicense, ApiError>) {
        self.state = match result {
            Ok(license) => {
                if license.license_id != self.license_id {
                    tracing::warn!(
                        expected = self.license_id,
                        got = license.license_id,
                        "detail response for a different license"
                    );
                }
                SessionState::Loaded(Box::new(license))
            }
            Err(e) => SessionState::FetchFailed(e),
        };
    }

    pub fn stage(&mut self, action: LifecycleAction) -> Result<(), LifecycleError> {
        if self.in_flight.is_some() {
            return Err(LifecycleError::CommitInFlight);
        }
        let license = self
            .license()
            .ok_or(LifecycleError::NotLoaded(self.license_id))?;
        if !actions_for(license.license_status).contains(&action) {
            return Err(LifecycleError::Unavailable {
                action,
                status: license.display_status(),
            });
        }
        let prompt = action.prompt(self.license_id, self.terms);
        self.gate.stage(prompt, action);
        Ok(())
    }

    /// Confirm the staged action. Returns the command to send, or `None` when nothing
    /// was staged. The session is marked busy until `on_committed`.
    pub fn confirm(&mut self) -> Option<UsageCommand> {
        if self.in_flight.is_some() {
            return None;
        }
        let license_id = self.license_id;
        let terms = self.terms;
        let command = self
            .gate
            .confirm_with(|action| action.command(license_id, terms))?;
        self.in_flight = Some(command.action());
        tracing::info!(session = self.id, license_id, action = ?command.action(), "commit started");
        Some(command)
    }

    pub fn cancel(&mut self) -> bool {
        self.gate.cancel()
    }

    pub fn on_committed(
        &mut self,
        action: LifecycleAction,
        result: Result<(), ApiError>,
    ) -> CommitOutcome {
        if self.in_flight != Some(action) {
            tracing::warn!(session = self.id, ?action, "commit result without matching commit");
        }
        self.in_flight = None;
        match result {
            Ok(()) => {
                tracing::info!(session = self.id, license_id = self.license_id, ?action, "commit succeeded");
                self.error = None;
                self.mutated = true;
                if action == LifecycleAction::Return {
                    CommitOutcome::Close
                } else {
                    self.state = SessionState::Loading;
                    CommitOutcome::Refetch(self.license_id)
                }
            }
            Err(e) => {
                tracing::warn!(session = self.id, ?action, error = %e, "commit failed");
                self.error = Some(e.clone());
                CommitOutcome::Failed(e)
            }
        }
    }

    /// Fetch the license into this session.
    pub async fn load(&mut self, api: &dyn LicenseApi) {
        let result = api.get(self.license_id).await;
        self.on_fetched(result);
    }

    /// Run the confirmed action to completion: send it, then re-fetch on success.
    /// Returns `None` when nothing was staged.
    pub async fn commit(&mut self, api: &dyn LicenseApi) -> Option<CommitOutcome> {
        let command = self.confirm()?;
        let result = execute(api, &command).await;
        let outcome = self.on_committed(command.action(), result);
        if let CommitOutcome::Refetch(_) = outcome {
            self.load(api).await;
        }
        Some(outcome)
    }
}
