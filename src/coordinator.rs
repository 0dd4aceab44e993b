//! Keeps the open sub-view, its address and the list's freshness in step.
//!
//! The coordinator owns the single optional sub-view. Its `Route` is derived from that
//! sub-view, and the textual address is only a serialization of the route, so there is
//! no second "which dialog is open" flag to drift. Closing a sub-view that mutated data
//! yields `Effect::RefreshList`.

use crate::editor::LicenseEditor;
use crate::error::ApiError;
use crate::lifecycle::{CommitOutcome, GrantTerms, LifecycleAction, LifecycleSession};
use crate::model::SoftwareLicense;
use thiserror::Error;

pub const LIST_ADDRESS: &str = "/software";
pub const DETAIL_SEGMENT: &str = "softwareLicenseDetail";
pub const EDIT_SEGMENT: &str = "softwareLicenseEdit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    List,
    Detail { id: i64 },
    Edit { id: i64 },
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("address {0:?} is outside the license list")]
    Foreign(String),
    #[error("unknown sub-view {0:?}")]
    UnknownSegment(String),
    #[error("detail address needs an id")]
    MissingId,
    #[error("invalid id {0:?}")]
    InvalidId(String),
}

impl Route {
    pub fn to_address(self, base: &str) -> String {
        let base = base.trim_end_matches('/');
        match self {
            Route::List => base.to_string(),
            Route::Detail { id } => format!("{base}/{DETAIL_SEGMENT}?id={id}"),
            Route::Edit { id } => format!("{base}/{EDIT_SEGMENT}?id={id}"),
            Route::Create => format!("{base}/{EDIT_SEGMENT}"),
        }
    }

    /// Parse an address produced by `to_address`. An edit address with no id (or an
    /// empty one) means "create new".
    pub fn parse(base: &str, address: &str) -> Result<Route, RouteError> {
        let base = base.trim_end_matches('/');
        let (path, query) = match address.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (address, None),
        };
        let rest = path
            .strip_prefix(base)
            .ok_or_else(|| RouteError::Foreign(address.to_string()))?;
        let segment = rest.trim_matches('/');
        let id = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "id")
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty());
        let parse_id =
            |raw: &str| raw.parse::<i64>().map_err(|_| RouteError::InvalidId(raw.to_string()));

        match segment {
            "" => Ok(Route::List),
            DETAIL_SEGMENT => Ok(Route::Detail {
                id: parse_id(id.ok_or(RouteError::MissingId)?)?,
            }),
            EDIT_SEGMENT => match id {
                Some(raw) => Ok(Route::Edit { id: parse_id(raw)? }),
                None => Ok(Route::Create),
            },
            other => Err(RouteError::UnknownSegment(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum SubView {
    Detail(LifecycleSession),
    Editor(LicenseEditor),
}

/// Work the coordinator asks its owner to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Fetch one license for the sub-view `session`.
    FetchLicense { session: u64, license_id: i64 },
    RefreshList,
}

#[derive(Debug)]
pub struct Coordinator {
    base: String,
    terms: GrantTerms,
    view: Option<SubView>,
    next_session: u64,
}

impl Coordinator {
    pub fn new(base: impl Into<String>, terms: GrantTerms) -> Self {
        Self {
            base: base.into(),
            terms,
            view: None,
            next_session: 0,
        }
    }

    pub fn route(&self) -> Route {
        match &self.view {
            None => Route::List,
            Some(SubView::Detail(s)) => Route::Detail { id: s.license_id() },
            Some(SubView::Editor(e)) => match e.license_id() {
                Some(id) => Route::Edit { id },
                None => Route::Create,
            },
        }
    }

    pub fn address(&self) -> String {
        self.route().to_address(&self.base)
    }

    pub fn is_open(&self) -> bool {
        self.view.is_some()
    }

    pub fn view(&self) -> Option<&SubView> {
        self.view.as_ref()
    }

    pub fn detail(&self) -> Option<&LifecycleSession> {
        match &self.view {
            Some(SubView::Detail(s)) => Some(s),
            _ => None,
        }
    }

    pub fn detail_mut(&mut self) -> Option<&mut LifecycleSession> {
        match &mut self.view {
            Some(SubView::Detail(s)) => Some(s),
            _ => None,
        }
    }

    pub fn editor(&self) -> Option<&LicenseEditor> {
        match &self.view {
            Some(SubView::Editor(e)) => Some(e),
            _ => None,
        }
    }

    pub fn editor_mut(&mut self) -> Option<&mut LicenseEditor> {
        match &mut self.view {
            Some(SubView::Editor(e)) => Some(e),
            _ => None,
        }
    }

    fn session_id(&mut self) -> u64 {
        self.next_session += 1;
        self.next_session
    }

    /// Move to `route`. Whatever is open is closed first, so at most one sub-view exists.
    pub fn navigate(&mut self, route: Route) -> Vec<Effect> {
        if route == self.route() {
            return Vec::new();
        }
        let mut effects = self.close();
        match route {
            Route::List => {}
            Route::Detail { id } => {
                let session = self.session_id();
                self.view = Some(SubView::Detail(LifecycleSession::new(session, id, self.terms)));
                effects.push(Effect::FetchLicense {
                    session,
                    license_id: id,
                });
            }
            Route::Edit { id } => {
                let session = self.session_id();
                self.view = Some(SubView::Editor(LicenseEditor::edit(session, id)));
                effects.push(Effect::FetchLicense {
                    session,
                    license_id: id,
                });
            }
            Route::Create => {
                let session = self.session_id();
                self.view = Some(SubView::Editor(LicenseEditor::create(session)));
            }
        }
        tracing::debug!(address = %self.address(), "navigated");
        effects
    }

    pub fn navigate_to_address(&mut self, address: &str) -> Result<Vec<Effect>, RouteError> {
        let route = Route::parse(&self.base, address)?;
        Ok(self.navigate(route))
    }

    pub fn open_detail(&mut self, license_id: i64) -> Vec<Effect> {
        self.navigate(Route::Detail { id: license_id })
    }

    pub fn open_edit(&mut self, license_id: i64) -> Vec<Effect> {
        self.navigate(Route::Edit { id: license_id })
    }

    pub fn open_create(&mut self) -> Vec<Effect> {
        self.navigate(Route::Create)
    }

    /// Back to the bare list address. A detail session that committed anything asks for
    /// a list refresh; a pure cancel does not.
    pub fn close(&mut self) -> Vec<Effect> {
        match self.view.take() {
            Some(SubView::Detail(s)) if s.mutated() => {
                tracing::debug!(session = s.id(), "detail closed after mutation");
                vec![Effect::RefreshList]
            }
            _ => Vec::new(),
        }
    }

    /// Deliver a fetched license to whichever sub-view asked for it. Responses for a
    /// session that is no longer open are dropped.
    pub fn on_license_loaded(
        &mut self,
        session: u64,
        result: Result<SoftwareLicense, ApiError>,
    ) -> bool {
        match &mut self.view {
            Some(SubView::Detail(s)) if s.id() == session => s.on_fetched(result),
            Some(SubView::Editor(e)) if e.id() == session => e.on_fetched(result),
            _ => {
                tracing::debug!(session, "dropping license for closed sub-view");
                return false;
            }
        }
        true
    }

    pub fn on_commit_finished(
        &mut self,
        session: u64,
        action: LifecycleAction,
        result: Result<(), ApiError>,
    ) -> Vec<Effect> {
        let Some(detail) = self.detail_mut().filter(|s| s.id() == session) else {
            tracing::debug!(session, ?action, "dropping commit result for closed session");
            return Vec::new();
        };
        match detail.on_committed(action, result) {
            CommitOutcome::Refetch(license_id) => vec![Effect::FetchLicense {
                session,
                license_id,
            }],
            CommitOutcome::Close => self.close(),
            CommitOutcome::Failed(_) => Vec::new(),
        }
    }

    pub fn on_save_finished(
        &mut self,
        session: u64,
        result: Result<Box<SoftwareLicense>, ApiError>,
    ) -> Vec<Effect> {
        let Some(editor) = self.editor_mut().filter(|e| e.id() == session) else {
            tracing::debug!(session, "dropping save result for closed editor");
            return Vec::new();
        };
        if editor.on_saved(&result) {
            self.view = None;
            vec![Effect::RefreshList]
        } else {
            Vec::new()
        }
    }
}
