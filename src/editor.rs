//! Create / edit form for a license record.

use crate::api::LicenseApi;
use crate::error::ApiError;
use crate::gate::{ConfirmGate, Prompt};
use crate::model::{parse_timestamp, LicensePayload, LicenseStatus, SoftwareLicense, SoftwareType};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    SoftwareInfoId,
    LicenseType,
    LicenseStatus,
    LicenseKey,
    ExpiredAt,
    LevelLimit,
    Remark,
}

impl DraftField {
    pub const ALL: [DraftField; 7] = [
        DraftField::SoftwareInfoId,
        DraftField::LicenseType,
        DraftField::LicenseStatus,
        DraftField::LicenseKey,
        DraftField::ExpiredAt,
        DraftField::LevelLimit,
        DraftField::Remark,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DraftField::SoftwareInfoId => "软件ID",
            DraftField::LicenseType => "授权类型",
            DraftField::LicenseStatus => "授权状态",
            DraftField::LicenseKey => "授权密钥",
            DraftField::ExpiredAt => "过期时间",
            DraftField::LevelLimit => "职级限制",
            DraftField::Remark => "备注",
        }
    }

    /// Enum fields cycle through known values instead of taking text.
    pub fn is_choice(self) -> bool {
        matches!(self, DraftField::LicenseType | DraftField::LicenseStatus)
    }

    fn step(self, forward: bool) -> Self {
        let n = Self::ALL.len();
        let i = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        if forward {
            Self::ALL[(i + 1) % n]
        } else {
            Self::ALL[(i + n - 1) % n]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("软件ID必须为正整数: {0:?}")]
    SoftwareInfoId(String),
    #[error("授权密钥不能为空")]
    EmptyKey,
    #[error("职级限制必须为非负整数: {0:?}")]
    LevelLimit(String),
    #[error("无法识别的过期时间: {0:?}")]
    ExpiredAt(String),
    #[error("license has not finished loading")]
    NotReady,
    #[error("a save is already in progress")]
    SaveInFlight,
}

/// Text-level form values. Numeric fields stay as typed until `validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseDraft {
    pub software_info_id: String,
    pub license_type: SoftwareType,
    pub license_status: LicenseStatus,
    pub license_key: String,
    pub expired_at: String,
    pub level_limit: String,
    pub remark: String,
}

impl Default for LicenseDraft {
    fn default() -> Self {
        Self {
            software_info_id: String::new(),
            license_type: SoftwareType::Os,
            license_status: LicenseStatus::Available,
            license_key: String::new(),
            expired_at: String::new(),
            level_limit: "0".into(),
            remark: String::new(),
        }
    }
}

impl LicenseDraft {
    pub fn from_license(license: &SoftwareLicense) -> Self {
        Self {
            software_info_id: license.software_info_id.to_string(),
            // a type is required on save; an absent one starts the choice at OS
            license_type: license.license_type.unwrap_or(SoftwareType::Os),
            license_status: license.license_status,
            license_key: license.license_key.clone().unwrap_or_default(),
            expired_at: license.expired_at.clone().unwrap_or_default(),
            level_limit: license
                .level_limit
                .map(|lv| lv.to_string())
                .unwrap_or_default(),
            remark: license.remark.clone().unwrap_or_default(),
        }
    }

    pub fn text(&self, field: DraftField) -> String {
        match field {
            DraftField::SoftwareInfoId => self.software_info_id.clone(),
            DraftField::LicenseType => self.license_type.label().to_string(),
            DraftField::LicenseStatus => self.license_status.label().to_string(),
            DraftField::LicenseKey => self.license_key.clone(),
            DraftField::ExpiredAt => self.expired_at.clone(),
            DraftField::LevelLimit => self.level_limit.clone(),
            DraftField::Remark => self.remark.clone(),
        }
    }

    fn text_mut(&mut self, field: DraftField) -> Option<&mut String> {
        match field {
            DraftField::SoftwareInfoId => Some(&mut self.software_info_id),
            DraftField::LicenseKey => Some(&mut self.license_key),
            DraftField::ExpiredAt => Some(&mut self.expired_at),
            DraftField::LevelLimit => Some(&mut self.level_limit),
            DraftField::Remark => Some(&mut self.remark),
            DraftField::LicenseType | DraftField::LicenseStatus => None,
        }
    }

    /// Replace a text field. Choice fields ignore this.
    pub fn set_text(&mut self, field: DraftField, value: impl Into<String>) {
        if let Some(slot) = self.text_mut(field) {
            *slot = value.into();
        }
    }

    pub fn cycle(&mut self, field: DraftField, forward: bool) {
        match field {
            DraftField::LicenseType => self.license_type = self.license_type.cycle(forward),
            DraftField::LicenseStatus => self.license_status = self.license_status.cycle(forward),
            _ => {}
        }
    }

    pub fn validate(&self) -> Result<LicensePayload, DraftError> {
        let software_info_id = self
            .software_info_id
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| DraftError::SoftwareInfoId(self.software_info_id.clone()))?;

        let license_key = self.license_key.trim();
        if license_key.is_empty() {
            return Err(DraftError::EmptyKey);
        }

        // blank means no limit
        let level_limit = match self.level_limit.trim() {
            "" => None,
            raw => Some(
                raw.parse::<i64>()
                    .ok()
                    .filter(|lv| *lv >= 0)
                    .ok_or_else(|| DraftError::LevelLimit(self.level_limit.clone()))?,
            ),
        };

        let expired_at = match self.expired_at.trim() {
            "" => None,
            raw => Some(normalize_expiry(raw).ok_or_else(|| DraftError::ExpiredAt(raw.into()))?),
        };

        Ok(LicensePayload {
            software_info_id,
            license_type: self.license_type,
            license_status: self.license_status,
            license_key: license_key.to_string(),
            expired_at,
            level_limit,
            remark: self.remark.trim().to_string(),
        })
    }
}

fn normalize_expiry(raw: &str) -> Option<String> {
    parse_timestamp(raw)?
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Create,
    Edit(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorState {
    Loading,
    Ready,
    FetchFailed(ApiError),
}

/// A confirmed save, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveIntent {
    pub license_id: Option<i64>,
    pub payload: LicensePayload,
}

/// Send a confirmed save: create when there is no id, update otherwise.
pub async fn execute_save(
    api: &dyn LicenseApi,
    intent: &SaveIntent,
) -> Result<SoftwareLicense, ApiError> {
    match intent.license_id {
        None => api.create(&intent.payload).await,
        Some(id) => api.update(id, &intent.payload).await,
    }
}

#[derive(Debug)]
pub struct LicenseEditor {
    id: u64,
    mode: EditorMode,
    state: EditorState,
    draft: LicenseDraft,
    focus: DraftField,
    gate: ConfirmGate<LicensePayload>,
    saving: bool,
    error: Option<String>,
}

impl LicenseEditor {
    pub fn create(id: u64) -> Self {
        Self::new(id, EditorMode::Create, EditorState::Ready)
    }

    /// Edit an existing license; the draft is filled once `on_fetched` delivers it.
    pub fn edit(id: u64, license_id: i64) -> Self {
        Self::new(id, EditorMode::Edit(license_id), EditorState::Loading)
    }

    fn new(id: u64, mode: EditorMode, state: EditorState) -> Self {
        tracing::debug!(session = id, ?mode, "editor opened");
        Self {
            id,
            mode,
            state,
            draft: LicenseDraft::default(),
            focus: DraftField::SoftwareInfoId,
            gate: ConfirmGate::new(),
            saving: false,
            error: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn license_id(&self) -> Option<i64> {
        match self.mode {
            EditorMode::Create => None,
            EditorMode::Edit(id) => Some(id),
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn draft(&self) -> &LicenseDraft {
        &self.draft
    }

    pub fn focus(&self) -> DraftField {
        self.focus
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.gate.prompt()
    }

    pub fn on_fetched(&mut self, result: Result<SoftwareLicense, ApiError>) {
        match result {
            Ok(license) => {
                self.draft = LicenseDraft::from_license(&license);
                self.state = EditorState::Ready;
            }
            Err(e) => self.state = EditorState::FetchFailed(e),
        }
    }

    fn editable(&self) -> bool {
        self.state == EditorState::Ready && !self.saving && !self.gate.is_open()
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.step(true);
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.step(false);
    }

    pub fn input(&mut self, c: char) {
        if !self.editable() {
            return;
        }
        if let Some(slot) = self.draft.text_mut(self.focus) {
            slot.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if !self.editable() {
            return;
        }
        if let Some(slot) = self.draft.text_mut(self.focus) {
            slot.pop();
        }
    }

    pub fn cycle(&mut self, forward: bool) {
        if self.editable() {
            self.draft.cycle(self.focus, forward);
        }
    }

    pub fn set_draft(&mut self, draft: LicenseDraft) {
        self.draft = draft;
    }

    /// Validate and open the save prompt. Validation failures stay local.
    pub fn stage_save(&mut self) -> Result<(), DraftError> {
        if self.saving {
            return Err(DraftError::SaveInFlight);
        }
        if self.state != EditorState::Ready {
            return Err(DraftError::NotReady);
        }
        let payload = match self.draft.validate() {
            Ok(p) => p,
            Err(e) => {
                self.error = Some(e.to_string());
                return Err(e);
            }
        };
        self.error = None;
        let prompt = match self.mode {
            EditorMode::Create => Prompt::new("创建确认", "确定创建该授权记录？"),
            EditorMode::Edit(_) => Prompt::new("保存确认", "确定保存修改？"),
        };
        self.gate.stage(prompt, payload);
        Ok(())
    }

    pub fn confirm(&mut self) -> Option<SaveIntent> {
        if self.saving {
            return None;
        }
        let license_id = self.license_id();
        let intent = self
            .gate
            .confirm_with(|payload| SaveIntent { license_id, payload })?;
        self.saving = true;
        tracing::info!(session = self.id, ?license_id, "save started");
        Some(intent)
    }

    pub fn cancel(&mut self) -> bool {
        self.gate.cancel()
    }

    /// Returns true when the save succeeded and the editor should close.
    pub fn on_saved(&mut self, result: &Result<Box<SoftwareLicense>, ApiError>) -> bool {
        self.saving = false;
        match result {
            Ok(license) => {
                tracing::info!(session = self.id, license_id = license.license_id, "save succeeded");
                true
            }
            Err(e) => {
                tracing::warn!(session = self.id, error = %e, "save failed");
                self.error = Some(e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{sample_license, Call, FakeApi};

    fn valid_draft() -> LicenseDraft {
        LicenseDraft {
            software_info_id: " 7 ".into(),
            license_key: "ABCD-1234".into(),
            expired_at: "2026-03-01T08:00".into(),
            level_limit: "2".into(),
            remark: "  seat ".into(),
            ..LicenseDraft::default()
        }
    }

    #[test]
    fn create_defaults() {
        let draft = LicenseDraft::default();
        assert_eq!(draft.license_type, SoftwareType::Os);
        assert_eq!(draft.license_status, LicenseStatus::Available);
        assert_eq!(draft.level_limit, "0");
        assert_eq!(draft.validate(), Err(DraftError::SoftwareInfoId(String::new())));
    }

    #[test]
    fn validation_normalizes_fields() {
        let payload = valid_draft().validate().unwrap();
        assert_eq!(payload.software_info_id, 7);
        assert_eq!(payload.level_limit, Some(2));
        assert_eq!(payload.remark, "seat");
        assert_eq!(payload.expired_at.as_deref(), Some("2026-03-01T08:00:00Z"));

        let offset = LicenseDraft {
            expired_at: "2026-03-01T08:00:00+08:00".into(),
            ..valid_draft()
        };
        assert_eq!(
            offset.validate().unwrap().expired_at.as_deref(),
            Some("2026-03-01T00:00:00Z")
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let cases = [
            (DraftField::SoftwareInfoId, "0"),
            (DraftField::SoftwareInfoId, "abc"),
            (DraftField::LicenseKey, "   "),
            (DraftField::LevelLimit, "-1"),
            (DraftField::ExpiredAt, "next tuesday"),
        ];
        for (field, value) in cases {
            let mut draft = valid_draft();
            draft.set_text(field, value);
            assert!(draft.validate().is_err(), "{field:?} = {value:?}");
        }
    }

    #[test]
    fn choice_fields_cycle_and_ignore_text() {
        let mut draft = LicenseDraft::default();
        draft.set_text(DraftField::LicenseType, "x");
        assert_eq!(draft.license_type, SoftwareType::Os);
        draft.cycle(DraftField::LicenseType, true);
        assert_eq!(draft.license_type, SoftwareType::Office);
        draft.cycle(DraftField::LicenseStatus, false);
        assert_eq!(draft.license_status, LicenseStatus::Expired);
    }

    #[test]
    fn edit_loads_before_it_can_save() {
        let mut editor = LicenseEditor::edit(3, 42);
        assert_eq!(editor.stage_save(), Err(DraftError::NotReady));
        editor.on_fetched(Ok(sample_license(42, LicenseStatus::Assigned)));
        assert_eq!(editor.draft().software_info_id, "142");
        assert_eq!(editor.draft().license_key, "KEY-0042");
        editor.stage_save().unwrap();
        assert_eq!(editor.prompt().unwrap().title, "保存确认");
    }

    #[test]
    fn blank_level_limit_is_kept_through_edit() {
        let mut license = sample_license(42, LicenseStatus::Assigned);
        license.level_limit = None;
        let draft = LicenseDraft::from_license(&license);
        assert_eq!(draft.level_limit, "");
        let payload = draft.validate().unwrap();
        assert_eq!(payload.level_limit, None);
        assert_eq!(
            serde_json::to_value(&payload).unwrap()["LvLimit"],
            serde_json::Value::Null
        );
    }

    #[test]
    fn invalid_draft_never_reaches_the_gate() {
        let mut editor = LicenseEditor::create(1);
        assert!(editor.stage_save().is_err());
        assert!(editor.prompt().is_none());
        assert!(editor.error().is_some());
        assert!(editor.confirm().is_none());
    }

    #[test]
    fn typing_goes_to_focused_text_field() {
        let mut editor = LicenseEditor::create(1);
        for c in "12".chars() {
            editor.input(c);
        }
        editor.backspace();
        assert_eq!(editor.draft().software_info_id, "1");
        editor.focus_next();
        assert_eq!(editor.focus(), DraftField::LicenseType);
        editor.input('z');
        editor.cycle(true);
        assert_eq!(editor.draft().license_type, SoftwareType::Office);
        editor.focus_prev();
        editor.focus_prev();
        assert_eq!(editor.focus(), DraftField::Remark);
    }

    #[test]
    fn one_save_in_flight() {
        let mut editor = LicenseEditor::create(1);
        editor.set_draft(valid_draft());
        editor.stage_save().unwrap();
        assert_eq!(editor.prompt().unwrap().title, "创建确认");
        let intent = editor.confirm().unwrap();
        assert_eq!(intent.license_id, None);
        assert!(editor.is_saving());
        assert_eq!(editor.stage_save(), Err(DraftError::SaveInFlight));

        let failed = Err(ApiError::Conflict {
            detail: "duplicate key".into(),
        });
        assert!(!editor.on_saved(&failed));
        assert!(!editor.is_saving());
        assert_eq!(editor.draft(), &valid_draft());
        assert!(editor.error().unwrap().contains("duplicate key"));
    }

    #[tokio::test]
    async fn execute_save_creates_or_updates() {
        let api = FakeApi::with_licenses([sample_license(5, LicenseStatus::Available)]);
        let payload = valid_draft().validate().unwrap();

        let created = execute_save(
            &api,
            &SaveIntent {
                license_id: None,
                payload: payload.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(created.license_id, 6);

        let updated = execute_save(
            &api,
            &SaveIntent {
                license_id: Some(5),
                payload: payload.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.license_key.as_deref(), Some("ABCD-1234"));
        assert_eq!(
            api.calls(),
            vec![Call::Create(payload.clone()), Call::Update(5, payload)]
        );
    }
}
