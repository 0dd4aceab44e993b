//! One-shot flows behind the scripting subcommands.
//!
//! Each flow drives the same state machines the TUI uses, start to finish, against a
//! `LicenseApi`. Confirmation is asked through a `Confirmer` so the terminal prompt and
//! `--yes` are interchangeable.

use crate::api::LicenseApi;
use crate::editor::{execute_save, EditorState, LicenseDraft, LicenseEditor};
use crate::error::ApiError;
use crate::gate::Prompt;
use crate::lifecycle::{CommitOutcome, GrantTerms, LifecycleAction, LifecycleSession, SessionState};
use crate::model::{LicensePage, SoftwareLicense};
use crate::query::{QueryEngine, SearchCategory, StatusFilter};
use anyhow::{Context, Result};
use async_trait::async_trait;

/// Answers a confirmation prompt.
#[async_trait]
pub(crate) trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: &Prompt) -> bool;
}

/// Confirms everything (`--yes`).
pub(crate) struct AssumeYes;

#[async_trait]
impl Confirmer for AssumeYes {
    async fn confirm(&self, _prompt: &Prompt) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ListOptions {
    pub filter: StatusFilter,
    pub page: usize,
    pub page_size: usize,
    pub category: SearchCategory,
    pub keywords: Option<String>,
}

/// What a confirmed flow ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Cancelled,
    /// The action committed and the license was fetched again.
    Updated {
        action: LifecycleAction,
        license: Box<SoftwareLicense>,
    },
    /// The license was returned and left this user's scope.
    Released { license_id: i64 },
    Saved(Box<SoftwareLicense>),
}

pub(crate) async fn list(api: &dyn LicenseApi, opts: &ListOptions) -> Result<LicensePage> {
    let mut engine = QueryEngine::new(opts.page_size);
    engine.set_status_filter(opts.filter);
    let fetch = match opts.keywords.as_deref() {
        Some(keywords) => {
            engine.set_search_category(opts.category);
            engine.set_search_keywords(keywords);
            engine.submit_search()?
        }
        None => engine.refresh(),
    };
    // Only the last issued fetch is sent.
    let fetch = engine.set_page(opts.page).unwrap_or(fetch);
    engine.load(api, fetch).await.context("list licenses")?;
    match engine.state() {
        crate::query::PageState::Ready(page) => Ok(page.clone()),
        crate::query::PageState::Failed(e) => Err(e.clone().into()),
        crate::query::PageState::Loading => anyhow::bail!("list request was superseded"),
    }
}

async fn open_session(
    api: &dyn LicenseApi,
    terms: GrantTerms,
    license_id: i64,
) -> Result<LifecycleSession> {
    let mut session = LifecycleSession::new(1, license_id, terms);
    session.load(api).await;
    if let SessionState::FetchFailed(e) = session.state() {
        return Err(anyhow::Error::new(e.clone()).context(format!("load license {license_id}")));
    }
    Ok(session)
}

pub(crate) async fn show(api: &dyn LicenseApi, license_id: i64) -> Result<SoftwareLicense> {
    let session = open_session(api, GrantTerms::default(), license_id).await?;
    session
        .license()
        .cloned()
        .with_context(|| format!("license {license_id} did not load"))
}

/// Load the license, stage `action`, ask for confirmation and commit.
pub(crate) async fn run_action(
    api: &dyn LicenseApi,
    terms: GrantTerms,
    license_id: i64,
    action: LifecycleAction,
    confirmer: &dyn Confirmer,
) -> Result<Outcome> {
    let mut session = open_session(api, terms, license_id).await?;
    session.stage(action)?;
    let prompt = session
        .prompt()
        .cloned()
        .context("confirmation prompt missing after staging")?;
    if !confirmer.confirm(&prompt).await {
        session.cancel();
        return Ok(Outcome::Cancelled);
    }
    match session.commit(api).await {
        None => Ok(Outcome::Cancelled),
        Some(CommitOutcome::Close) => Ok(Outcome::Released { license_id }),
        Some(CommitOutcome::Failed(e)) => {
            Err(anyhow::Error::new(e).context(format!("{} license {license_id}", action.label())))
        }
        Some(CommitOutcome::Refetch(_)) => match session.state() {
            SessionState::Loaded(license) => Ok(Outcome::Updated {
                action,
                license: license.clone(),
            }),
            SessionState::FetchFailed(e) => Err(anyhow::Error::new(e.clone())
                .context(format!("{} succeeded but reloading license {license_id} failed", action.label()))),
            SessionState::Loading => anyhow::bail!("license {license_id} did not reload"),
        },
    }
}

/// Create (`license_id == None`) or update a license. `edit` fills in the draft after
/// the current values have been loaded.
pub(crate) async fn save(
    api: &dyn LicenseApi,
    license_id: Option<i64>,
    edit: impl FnOnce(&mut LicenseDraft) + Send,
    confirmer: &dyn Confirmer,
) -> Result<Outcome> {
    let mut editor = match license_id {
        None => LicenseEditor::create(1),
        Some(id) => {
            let mut editor = LicenseEditor::edit(1, id);
            editor.on_fetched(api.get(id).await);
            if let EditorState::FetchFailed(e) = editor.state() {
                return Err(anyhow::Error::new(e.clone()).context(format!("load license {id}")));
            }
            editor
        }
    };
    let mut draft = editor.draft().clone();
    edit(&mut draft);
    editor.set_draft(draft);
    editor.stage_save()?;

    let prompt = editor
        .prompt()
        .cloned()
        .context("confirmation prompt missing after staging")?;
    if !confirmer.confirm(&prompt).await {
        editor.cancel();
        return Ok(Outcome::Cancelled);
    }
    let Some(intent) = editor.confirm() else {
        return Ok(Outcome::Cancelled);
    };
    let result: Result<Box<SoftwareLicense>, ApiError> =
        execute_save(api, &intent).await.map(Box::new);
    editor.on_saved(&result);
    Ok(Outcome::Saved(result.context("save license")?))
}
