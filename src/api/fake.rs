//! In-memory `LicenseApi` that records every call and mimics the server's status rules.

use super::LicenseApi;
use crate::error::ApiError;
use crate::model::{
    ApplyRequest, LicensePage, LicensePayload, LicenseStatus, RenewRequest, ReturnRequest,
    SoftwareInfo, SoftwareLicense, SoftwareType,
};
use crate::query::{ListEndpoint, ListRequest, SearchCategory, SearchValue};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(ListRequest),
    Get(i64),
    Apply(ApplyRequest),
    Renew(RenewRequest),
    Return(ReturnRequest),
    Create(LicensePayload),
    Update(i64, LicensePayload),
}

#[derive(Default)]
struct State {
    licenses: BTreeMap<i64, SoftwareLicense>,
    calls: Vec<Call>,
    fail_next: Option<ApiError>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

pub fn sample_license(id: i64, status: LicenseStatus) -> SoftwareLicense {
    SoftwareLicense {
        license_id: id,
        software_info_id: 100 + id,
        license_type: Some(SoftwareType::Office),
        license_status: status,
        license_key: Some(format!("KEY-{id:04}")),
        expired_at: Some("2026-01-01T00:00:00+00:00".into()),
        level_limit: Some(1),
        remark: None,
        created_at: Some("2025-01-01T00:00:00+00:00".into()),
        last_updated_at: None,
        software_info: Some(SoftwareInfo {
            id: 100 + id,
            name: format!("Software {id}"),
            software_type: Some(SoftwareType::Office),
            match_rule: None,
        }),
    }
}

impl FakeApi {
    pub fn with_licenses(licenses: impl IntoIterator<Item = SoftwareLicense>) -> Self {
        let api = Self::default();
        {
            let mut state = api.state.lock().unwrap();
            for license in licenses {
                state.licenses.insert(license.license_id, license);
            }
        }
        api
    }

    /// Make the next call fail with `error` (after it has been recorded).
    pub fn fail_next(&self, error: ApiError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn license(&self, id: i64) -> Option<SoftwareLicense> {
        self.state.lock().unwrap().licenses.get(&id).cloned()
    }

    fn record(&self, call: Call) -> Result<std::sync::MutexGuard<'_, State>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.fail_next.take() {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }
}

fn matches_search(license: &SoftwareLicense, category: SearchCategory, value: &SearchValue) -> bool {
    match (category, value) {
        (SearchCategory::SoftwareName, SearchValue::Text(text)) => license
            .software_name()
            .map(|n| n.to_lowercase().contains(&text.to_lowercase()))
            .unwrap_or(false),
        (SearchCategory::SoftwareInfoId, SearchValue::Number(n)) => license.software_info_id == *n,
        (SearchCategory::SoftwareType, SearchValue::Number(n)) => license
            .software_info
            .as_ref()
            .and_then(|i| i.software_type)
            .is_some_and(|t| t.code() == *n),
        (SearchCategory::LicenseType, SearchValue::Number(n)) => {
            license.license_type.is_some_and(|t| t.code() == *n)
        }
        (SearchCategory::LicenseStatus, SearchValue::Number(n)) => {
            license.license_status.code() == *n
        }
        _ => false,
    }
}

#[async_trait]
impl LicenseApi for FakeApi {
    async fn list(&self, request: &ListRequest) -> Result<LicensePage, ApiError> {
        let state = self.record(Call::List(request.clone()))?;
        let status = match request.endpoint {
            ListEndpoint::Used => Some(LicenseStatus::Assigned),
            _ => request.status,
        };
        let rows: Vec<SoftwareLicense> = state
            .licenses
            .values()
            .filter(|l| status.map(|s| l.license_status == s).unwrap_or(true))
            .filter(|l| {
                request
                    .search
                    .as_ref()
                    .map(|s| matches_search(l, s.category, &s.value))
                    .unwrap_or(true)
            })
            .skip((request.page - 1) * request.limit)
            .take(request.limit)
            .cloned()
            .collect();
        Ok(LicensePage {
            row_count: rows.len(),
            rows,
        })
    }

    async fn get(&self, license_id: i64) -> Result<SoftwareLicense, ApiError> {
        let state = self.record(Call::Get(license_id))?;
        state
            .licenses
            .get(&license_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound {
                detail: format!("Software license with ID {license_id} not found"),
            })
    }

    async fn apply(&self, request: &ApplyRequest) -> Result<(), ApiError> {
        let mut state = self.record(Call::Apply(*request))?;
        let license = state
            .licenses
            .get_mut(&request.license_id)
            .ok_or_else(|| ApiError::NotFound {
                detail: "您请求的授权ID不存在".into(),
            })?;
        if license.license_status != LicenseStatus::Available {
            return Err(ApiError::Conflict {
                detail: "此授权已被使用".into(),
            });
        }
        license.license_status = LicenseStatus::Assigned;
        Ok(())
    }

    async fn renew(&self, request: &RenewRequest) -> Result<(), ApiError> {
        let state = self.record(Call::Renew(*request))?;
        match state.licenses.get(&request.record_id) {
            Some(l) if l.license_status == LicenseStatus::Assigned => Ok(()),
            _ => Err(ApiError::NotFound {
                detail: format!("授权ID：{}没被领用", request.record_id),
            }),
        }
    }

    async fn release(&self, request: &ReturnRequest) -> Result<(), ApiError> {
        let mut state = self.record(Call::Return(*request))?;
        match state.licenses.get_mut(&request.license_id) {
            Some(l) if l.license_status == LicenseStatus::Assigned => {
                l.license_status = LicenseStatus::Available;
                Ok(())
            }
            _ => Err(ApiError::NotFound {
                detail: "没有找到使用记录".into(),
            }),
        }
    }

    async fn create(&self, payload: &LicensePayload) -> Result<SoftwareLicense, ApiError> {
        let mut state = self.record(Call::Create(payload.clone()))?;
        let id = state.licenses.keys().next_back().copied().unwrap_or(0) + 1;
        let license = license_from_payload(id, payload);
        state.licenses.insert(id, license.clone());
        Ok(license)
    }

    async fn update(
        &self,
        license_id: i64,
        payload: &LicensePayload,
    ) -> Result<SoftwareLicense, ApiError> {
        let mut state = self.record(Call::Update(license_id, payload.clone()))?;
        if !state.licenses.contains_key(&license_id) {
            return Err(ApiError::NotFound {
                detail: format!("Software license with ID {license_id} not found"),
            });
        }
        let license = license_from_payload(license_id, payload);
        state.licenses.insert(license_id, license.clone());
        Ok(license)
    }
}

fn license_from_payload(id: i64, payload: &LicensePayload) -> SoftwareLicense {
    SoftwareLicense {
        license_id: id,
        software_info_id: payload.software_info_id,
        license_type: Some(payload.license_type),
        license_status: payload.license_status,
        license_key: Some(payload.license_key.clone()),
        expired_at: payload.expired_at.clone(),
        level_limit: payload.level_limit,
        remark: Some(payload.remark.clone()),
        created_at: None,
        last_updated_at: None,
        software_info: None,
    }
}
