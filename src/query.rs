//! Paginated, filtered listing of licenses.
//!
//! `QueryEngine` is pure state: every parameter change that needs data hands back a
//! `Fetch` describing exactly one request, and results are fed back through `on_loaded`.
//! Responses carrying an older generation than the latest issued fetch are dropped.

use crate::api::LicenseApi;
use crate::error::ApiError;
use crate::model::{LicensePage, LicenseStatus, SoftwareLicense};
use clap::ValueEnum;
use serde::Serialize;

pub const LIST_PATH: &str = "/licenses_with_info";
pub const USED_LIST_PATH: &str = "/licenses_with_info/used_license";
pub const SEARCH_PATH: &str = "/licenses_with_info/search";

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 25, 50, 100];

/// Status scope of the list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum StatusFilter {
    /// Only licenses currently checked out
    #[default]
    Assigned,
    /// No status constraint
    All,
    /// Only licenses free to apply for
    Available,
    /// Only expired licenses
    Expired,
}

impl StatusFilter {
    pub const CHOICES: [StatusFilter; 4] = [
        StatusFilter::Assigned,
        StatusFilter::All,
        StatusFilter::Available,
        StatusFilter::Expired,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::Assigned => "已领用",
            StatusFilter::All => "全部",
            StatusFilter::Available => "未领用",
            StatusFilter::Expired => "已过期",
        }
    }

    /// `None` means no status constraint.
    pub fn status(self) -> Option<LicenseStatus> {
        match self {
            StatusFilter::Assigned => Some(LicenseStatus::Assigned),
            StatusFilter::All => None,
            StatusFilter::Available => Some(LicenseStatus::Available),
            StatusFilter::Expired => Some(LicenseStatus::Expired),
        }
    }

    pub fn next(self) -> Self {
        let i = Self::CHOICES.iter().position(|c| *c == self).unwrap_or(0);
        Self::CHOICES[(i + 1) % Self::CHOICES.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
pub enum SearchCategory {
    #[default]
    SoftwareName,
    SoftwareInfoId,
    SoftwareType,
    LicenseType,
    LicenseStatus,
}

impl SearchCategory {
    pub const ALL: [SearchCategory; 5] = [
        SearchCategory::SoftwareName,
        SearchCategory::SoftwareInfoId,
        SearchCategory::SoftwareType,
        SearchCategory::LicenseType,
        SearchCategory::LicenseStatus,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            SearchCategory::SoftwareName => "software_name",
            SearchCategory::SoftwareInfoId => "software_info_id",
            SearchCategory::SoftwareType => "software_type",
            SearchCategory::LicenseType => "license_type",
            SearchCategory::LicenseStatus => "license_status",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchCategory::SoftwareName => "软件名称",
            SearchCategory::SoftwareInfoId => "软件ID",
            SearchCategory::SoftwareType => "软件类型",
            SearchCategory::LicenseType => "授权类型",
            SearchCategory::LicenseStatus => "授权状态",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, SearchCategory::SoftwareName)
    }

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SearchValue {
    Text(String),
    Number(i64),
}

impl std::fmt::Display for SearchValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchValue::Text(s) => f.write_str(s),
            SearchValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A validated search, ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Search {
    pub category: SearchCategory,
    pub value: SearchValue,
}

impl Search {
    /// Validate keywords for a category. Blank keywords mean "no search".
    pub fn parse(category: SearchCategory, keywords: &str) -> Result<Option<Search>, ApiError> {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return Ok(None);
        }
        let value = if category.is_numeric() {
            let n = keywords.parse::<i64>().map_err(|_| {
                ApiError::Validation(format!("请输入数字 ({} expects a number)", category.label()))
            })?;
            SearchValue::Number(n)
        } else {
            SearchValue::Text(keywords.to_string())
        };
        Ok(Some(Search { category, value }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListEndpoint {
    All,
    Used,
    Search,
}

impl ListEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            ListEndpoint::All => LIST_PATH,
            ListEndpoint::Used => USED_LIST_PATH,
            ListEndpoint::Search => SEARCH_PATH,
        }
    }
}

/// One list request as it goes on the wire. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListRequest {
    pub endpoint: ListEndpoint,
    pub page: usize,
    pub limit: usize,
    pub status: Option<LicenseStatus>,
    pub search: Option<Search>,
}

impl ListRequest {
    /// Map view parameters (0-based page) to a request.
    ///
    /// A search always targets the search endpoint and carries the status scope as a
    /// parameter. Without a search, the assigned scope uses the dedicated `used_license`
    /// endpoint and every other scope the plain listing.
    pub fn build(
        filter: StatusFilter,
        search: Option<&Search>,
        page: usize,
        page_size: usize,
    ) -> Self {
        let (endpoint, status) = match (search, filter) {
            (Some(_), f) => (ListEndpoint::Search, f.status()),
            (None, StatusFilter::Assigned) => (ListEndpoint::Used, None),
            (None, f) => (ListEndpoint::All, f.status()),
        };
        ListRequest {
            endpoint,
            page: page + 1,
            limit: page_size,
            status,
            search: search.cloned(),
        }
    }

    pub fn path(&self) -> &'static str {
        self.endpoint.path()
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("limit", self.limit.to_string())];
        if let Some(status) = self.status {
            pairs.push(("status", status.code().to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search_category", search.category.wire_name().to_string()));
            pairs.push(("search_value", search.value.to_string()));
        }
        pairs
    }
}

/// A list request tagged with the generation that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub generation: u64,
    pub request: ListRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Loading,
    Ready(LicensePage),
    Failed(ApiError),
}

#[derive(Debug)]
pub struct QueryEngine {
    status_filter: StatusFilter,
    staged_category: SearchCategory,
    staged_keywords: String,
    applied_search: Option<Search>,
    page: usize,
    page_size: usize,
    generation: u64,
    state: PageState,
    validation: Option<String>,
}

impl QueryEngine {
    pub fn new(page_size: usize) -> Self {
        Self {
            status_filter: StatusFilter::default(),
            staged_category: SearchCategory::default(),
            staged_keywords: String::new(),
            applied_search: None,
            page: 0,
            page_size: page_size.max(1),
            generation: 0,
            state: PageState::Loading,
            validation: None,
        }
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.status_filter
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn search_category(&self) -> SearchCategory {
        self.staged_category
    }

    pub fn search_keywords(&self) -> &str {
        &self.staged_keywords
    }

    pub fn applied_search(&self) -> Option<&Search> {
        self.applied_search.as_ref()
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// Inline validation message from the last rejected search submission.
    pub fn validation(&self) -> Option<&str> {
        self.validation.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PageState::Loading)
    }

    /// Rows of the current page; empty while loading or after a failure.
    pub fn rows(&self) -> &[SoftwareLicense] {
        match &self.state {
            PageState::Ready(page) => &page.rows,
            _ => &[],
        }
    }

    pub fn row_count(&self) -> usize {
        match &self.state {
            PageState::Ready(page) => page.row_count,
            _ => 0,
        }
    }

    pub fn current_request(&self) -> ListRequest {
        ListRequest::build(
            self.status_filter,
            self.applied_search.as_ref(),
            self.page,
            self.page_size,
        )
    }

    fn issue(&mut self) -> Fetch {
        self.generation += 1;
        // Previous rows are dropped so they never show under changed parameters.
        self.state = PageState::Loading;
        Fetch {
            generation: self.generation,
            request: self.current_request(),
        }
    }

    /// Fetch for the current parameters, e.g. on first display or after a sub-view mutation.
    pub fn refresh(&mut self) -> Fetch {
        self.issue()
    }

    pub fn set_status_filter(&mut self, filter: StatusFilter) -> Option<Fetch> {
        if filter == self.status_filter {
            return None;
        }
        self.status_filter = filter;
        Some(self.issue())
    }

    pub fn set_page(&mut self, page: usize) -> Option<Fetch> {
        if page == self.page {
            return None;
        }
        self.page = page;
        Some(self.issue())
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Option<Fetch> {
        let page_size = page_size.max(1);
        if page_size == self.page_size {
            return None;
        }
        self.page_size = page_size;
        Some(self.issue())
    }

    pub fn next_page(&mut self) -> Option<Fetch> {
        // A short page means there is nothing after it.
        if matches!(&self.state, PageState::Ready(p) if p.rows.len() < self.page_size) {
            return None;
        }
        self.set_page(self.page + 1)
    }

    pub fn prev_page(&mut self) -> Option<Fetch> {
        self.set_page(self.page.checked_sub(1)?)
    }

    /// Staged only; takes effect on `submit_search`.
    pub fn set_search_category(&mut self, category: SearchCategory) {
        self.staged_category = category;
    }

    /// Staged only; takes effect on `submit_search`.
    pub fn set_search_keywords(&mut self, keywords: impl Into<String>) {
        self.staged_keywords = keywords.into();
    }

    /// Apply the staged search. Invalid keywords issue no request and leave the current
    /// results and search untouched.
    pub fn submit_search(&mut self) -> Result<Fetch, ApiError> {
        match Search::parse(self.staged_category, &self.staged_keywords) {
            Ok(search) => {
                self.validation = None;
                self.applied_search = search;
                self.page = 0;
                Ok(self.issue())
            }
            Err(e) => {
                self.validation = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Feed back a response. Returns false when it belongs to a superseded fetch.
    pub fn on_loaded(&mut self, generation: u64, result: Result<LicensePage, ApiError>) -> bool {
        if generation != self.generation {
            tracing::debug!(generation, latest = self.generation, "dropping stale list response");
            return false;
        }
        self.state = match result {
            Ok(page) => PageState::Ready(page),
            Err(e) => PageState::Failed(e),
        };
        true
    }

    /// Issue `fetch` against `api` and record the outcome.
    pub async fn load(&mut self, api: &dyn LicenseApi, fetch: Fetch) -> Result<(), ApiError> {
        let result = api.list(&fetch.request).await;
        let outcome = result.as_ref().map(|_| ()).map_err(|e| e.clone());
        self.on_loaded(fetch.generation, result);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{sample_license, Call, FakeApi};

    #[test]
    fn assigned_scope_uses_used_license_endpoint() {
        let mut engine = QueryEngine::new(25);
        let fetch = engine.refresh();
        assert_eq!(fetch.request.path(), USED_LIST_PATH);
        assert_eq!(
            fetch.request.query_pairs(),
            vec![("page", "1".to_string()), ("limit", "25".to_string())]
        );
    }

    #[test]
    fn other_scopes_use_plain_listing() {
        let all = ListRequest::build(StatusFilter::All, None, 2, 10);
        assert_eq!(all.path(), LIST_PATH);
        assert_eq!(all.page, 3);
        assert_eq!(all.status, None);

        let available = ListRequest::build(StatusFilter::Available, None, 0, 10);
        assert_eq!(available.path(), LIST_PATH);
        assert!(available
            .query_pairs()
            .contains(&("status", "0".to_string())));
    }

    #[test]
    fn search_targets_search_endpoint_with_scope() {
        let search = Search::parse(SearchCategory::SoftwareName, "  office ").unwrap();
        let req = ListRequest::build(StatusFilter::Assigned, search.as_ref(), 0, 25);
        assert_eq!(req.path(), SEARCH_PATH);
        let pairs = req.query_pairs();
        assert!(pairs.contains(&("search_category", "software_name".to_string())));
        assert!(pairs.contains(&("search_value", "office".to_string())));
        assert!(pairs.contains(&("status", "1".to_string())));
    }

    #[test]
    fn each_parameter_change_issues_exactly_one_fetch() {
        let mut engine = QueryEngine::new(25);
        let first = engine.refresh();

        let f = engine.set_status_filter(StatusFilter::All).unwrap();
        assert_eq!(f.generation, first.generation + 1);
        assert_eq!(f.request.page, 1);
        assert!(engine.set_status_filter(StatusFilter::All).is_none());

        let f = engine.set_page(3).unwrap();
        assert_eq!((f.request.page, f.request.limit), (4, 25));
        assert!(engine.set_page(3).is_none());

        let f = engine.set_page_size(50).unwrap();
        assert_eq!((f.request.page, f.request.limit), (4, 50));
        assert!(engine.set_page_size(50).is_none());
        assert!(engine.is_loading());
    }

    #[test]
    fn keyword_and_category_edits_are_staged() {
        let mut engine = QueryEngine::new(25);
        let before = engine.refresh();
        engine.set_search_category(SearchCategory::SoftwareName);
        engine.set_search_keywords("adobe");
        assert_eq!(engine.current_request(), before.request);

        let f = engine.submit_search().unwrap();
        assert_eq!(f.request.path(), SEARCH_PATH);
        assert_eq!(engine.applied_search().unwrap().value, SearchValue::Text("adobe".into()));
    }

    #[test]
    fn non_numeric_id_search_is_rejected_before_any_request() {
        let mut engine = QueryEngine::new(25);
        let before = engine.refresh();
        engine.set_search_category(SearchCategory::SoftwareInfoId);
        engine.set_search_keywords("abc");
        let err = engine.submit_search().unwrap_err();
        assert!(err.is_validation());
        assert!(engine.validation().unwrap().contains("请输入数字"));
        // applied parameters are untouched
        assert_eq!(engine.current_request(), before.request);

        engine.set_search_keywords("17");
        let f = engine.submit_search().unwrap();
        assert_eq!(engine.validation(), None);
        assert!(f
            .request
            .query_pairs()
            .contains(&("search_value", "17".to_string())));
    }

    #[test]
    fn blank_search_clears_applied_search() {
        let mut engine = QueryEngine::new(25);
        engine.set_search_keywords("office");
        engine.submit_search().unwrap();
        engine.set_search_keywords("   ");
        let f = engine.submit_search().unwrap();
        assert_eq!(f.request.path(), USED_LIST_PATH);
        assert!(engine.applied_search().is_none());
    }

    #[test]
    fn stale_responses_are_dropped() {
        let mut engine = QueryEngine::new(25);
        let old = engine.refresh();
        let new = engine.set_status_filter(StatusFilter::All).unwrap();
        let page = LicensePage {
            rows: vec![sample_license(1, LicenseStatus::Assigned)],
            row_count: 1,
        };
        assert!(!engine.on_loaded(old.generation, Ok(page.clone())));
        assert!(engine.is_loading());
        assert!(engine.on_loaded(new.generation, Ok(page)));
        assert_eq!(engine.row_count(), 1);
    }

    #[test]
    fn failure_shows_no_rows() {
        let mut engine = QueryEngine::new(25);
        let f = engine.refresh();
        engine.on_loaded(f.generation, Err(ApiError::Timeout));
        assert!(engine.rows().is_empty());
        assert_eq!(engine.state(), &PageState::Failed(ApiError::Timeout));
    }

    #[test]
    fn paging_stops_at_short_page_and_zero() {
        let mut engine = QueryEngine::new(2);
        assert!(engine.prev_page().is_none());
        let f = engine.refresh();
        engine.on_loaded(
            f.generation,
            Ok(LicensePage {
                rows: vec![sample_license(1, LicenseStatus::Assigned)],
                row_count: 1,
            }),
        );
        assert!(engine.next_page().is_none());
    }

    #[tokio::test]
    async fn assigned_page_scenario() {
        let api = FakeApi::with_licenses([
            sample_license(1, LicenseStatus::Assigned),
            sample_license(2, LicenseStatus::Assigned),
            sample_license(3, LicenseStatus::Available),
            sample_license(4, LicenseStatus::Assigned),
        ]);
        let mut engine = QueryEngine::new(25);
        let fetch = engine.refresh();
        engine.load(&api, fetch).await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        let Call::List(req) = &calls[0] else {
            panic!("expected a list call, got {calls:?}");
        };
        assert_eq!(req.path(), USED_LIST_PATH);
        assert_eq!((req.page, req.limit), (1, 25));
        assert_eq!(engine.row_count(), 3);
        assert_eq!(engine.page(), 0);
        let ids: Vec<i64> = engine.rows().iter().map(|l| l.license_id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn rejected_search_sends_nothing() {
        let api = FakeApi::default();
        let mut engine = QueryEngine::new(25);
        engine.set_search_category(SearchCategory::SoftwareInfoId);
        engine.set_search_keywords("abc");
        if let Ok(fetch) = engine.submit_search() {
            engine.load(&api, fetch).await.unwrap();
        }
        assert!(api.calls().is_empty());
    }
}
