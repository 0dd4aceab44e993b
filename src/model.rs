use crate::error::ApiError;
use crate::lifecycle::LifecycleAction;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Shown wherever a timestamp is absent.
pub const UNSET_LABEL: &str = "未设置";
/// Shown for any enum code this client does not know.
pub const UNKNOWN_LABEL: &str = "未知";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub page_size: usize,
    pub grant_days: u32,
    pub renew_days: u32,
    pub user_agent: String,
}

/// Lifecycle status of a license as reported by the server.
///
/// Codes: 0 available, 1 assigned, 2 expired. Any other code is kept verbatim in
/// `Unknown` so it survives a round trip and renders as "未知".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum LicenseStatus {
    Available,
    Assigned,
    Expired,
    Unknown(i64),
}

impl LicenseStatus {
    pub const KNOWN: [LicenseStatus; 3] = [
        LicenseStatus::Available,
        LicenseStatus::Assigned,
        LicenseStatus::Expired,
    ];

    pub fn code(self) -> i64 {
        match self {
            LicenseStatus::Available => 0,
            LicenseStatus::Assigned => 1,
            LicenseStatus::Expired => 2,
            LicenseStatus::Unknown(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LicenseStatus::Available => "未领用",
            LicenseStatus::Assigned => "已领用",
            LicenseStatus::Expired => "已过期",
            LicenseStatus::Unknown(_) => UNKNOWN_LABEL,
        }
    }

    /// Next known status, used by form fields that cycle through values.
    pub fn cycle(self, forward: bool) -> Self {
        cycle_known(&Self::KNOWN, self, forward)
    }
}

impl From<i64> for LicenseStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => LicenseStatus::Available,
            1 => LicenseStatus::Assigned,
            2 => LicenseStatus::Expired,
            other => LicenseStatus::Unknown(other),
        }
    }
}

impl Default for LicenseStatus {
    fn default() -> Self {
        LicenseStatus::Available
    }
}

impl From<LicenseStatus> for i64 {
    fn from(status: LicenseStatus) -> Self {
        status.code()
    }
}

/// Software category, shared by `SoftwareInfo` and a license's `LicenseType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum SoftwareType {
    Os,
    Office,
    Dev,
    Design,
    Streaming,
    Other,
    Unknown(i64),
}

impl SoftwareType {
    pub const KNOWN: [SoftwareType; 6] = [
        SoftwareType::Os,
        SoftwareType::Office,
        SoftwareType::Dev,
        SoftwareType::Design,
        SoftwareType::Streaming,
        SoftwareType::Other,
    ];

    pub fn code(self) -> i64 {
        match self {
            SoftwareType::Os => 0,
            SoftwareType::Office => 1,
            SoftwareType::Dev => 2,
            SoftwareType::Design => 3,
            SoftwareType::Streaming => 4,
            SoftwareType::Other => 5,
            SoftwareType::Unknown(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SoftwareType::Os => "操作系统授权",
            SoftwareType::Office => "办公类软件",
            SoftwareType::Dev => "开发类软件",
            SoftwareType::Design => "设计类软件",
            SoftwareType::Streaming => "流媒体访问许可",
            SoftwareType::Other => "其他",
            SoftwareType::Unknown(_) => UNKNOWN_LABEL,
        }
    }

    pub fn cycle(self, forward: bool) -> Self {
        cycle_known(&Self::KNOWN, self, forward)
    }
}

impl From<i64> for SoftwareType {
    fn from(code: i64) -> Self {
        match code {
            0 => SoftwareType::Os,
            1 => SoftwareType::Office,
            2 => SoftwareType::Dev,
            3 => SoftwareType::Design,
            4 => SoftwareType::Streaming,
            5 => SoftwareType::Other,
            other => SoftwareType::Unknown(other),
        }
    }
}

impl From<SoftwareType> for i64 {
    fn from(t: SoftwareType) -> Self {
        t.code()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn cycle_known<T: Copy + PartialEq>(known: &[T], current: T, forward: bool) -> T {
    let n = known.len();
    match known.iter().position(|k| *k == current) {
        Some(i) if forward => known[(i + 1) % n],
        Some(i) => known[(i + n - 1) % n],
        None => known[0],
    }
}

/// Catalog entry a license points at. Read-only from this client's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareInfo {
    #[serde(rename = "SoftwareInfoID")]
    pub id: i64,
    #[serde(rename = "SoftwareInfoName")]
    pub name: String,
    #[serde(rename = "SoftwareInfoType", default)]
    pub software_type: Option<SoftwareType>,
    #[serde(rename = "SoftwareInfoMatchRule", default)]
    pub match_rule: Option<String>,
}

impl SoftwareInfo {
    pub fn type_label(&self) -> &'static str {
        self.software_type.map_or(UNKNOWN_LABEL, SoftwareType::label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareLicense {
    #[serde(rename = "LicenseID")]
    pub license_id: i64,
    #[serde(rename = "SoftwareInfoID")]
    pub software_info_id: i64,
    #[serde(rename = "LicenseType", default)]
    pub license_type: Option<SoftwareType>,
    /// The server defaults a missing status to available.
    #[serde(rename = "LicenseStatus", default, deserialize_with = "null_as_default")]
    pub license_status: LicenseStatus,
    #[serde(rename = "LicenseKey", default)]
    pub license_key: Option<String>,
    #[serde(rename = "LicenseExpiredDate", default)]
    pub expired_at: Option<String>,
    #[serde(rename = "LvLimit", default)]
    pub level_limit: Option<i64>,
    #[serde(rename = "Remark", default)]
    pub remark: Option<String>,
    #[serde(rename = "CreateTime", default)]
    pub created_at: Option<String>,
    #[serde(rename = "LastUpdateTime", default)]
    pub last_updated_at: Option<String>,
    /// `None` while the nested catalog data is missing; callers must not assume it.
    #[serde(rename = "software_info", default)]
    pub software_info: Option<SoftwareInfo>,
}

impl SoftwareLicense {
    /// Build a license from an arbitrary server payload.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ApiError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn software_name(&self) -> Option<&str> {
        self.software_info.as_ref().map(|info| info.name.as_str())
    }

    pub fn display_status(&self) -> &'static str {
        self.license_status.label()
    }

    pub fn license_type_label(&self) -> &'static str {
        self.license_type.map_or(UNKNOWN_LABEL, SoftwareType::label)
    }

    pub fn formatted_expired_at(&self) -> String {
        format_optional_timestamp(self.expired_at.as_deref())
    }

    pub fn formatted_last_updated_at(&self) -> String {
        format_optional_timestamp(self.last_updated_at.as_deref())
    }
}

/// Parse the timestamp shapes the server and users produce: RFC 3339, or a naive
/// `YYYY-MM-DD[T ]HH:MM[:SS[.frac]]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    let naive = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ];
    naive
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(raw, *fmt).ok())
        .map(PrimitiveDateTime::assume_utc)
}

/// Local date-time text for display. Unparseable input is shown as-is.
pub fn format_timestamp(raw: &str) -> String {
    let Some(t) = parse_timestamp(raw) else {
        return raw.to_string();
    };
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    t.to_offset(offset)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| raw.to_string())
}

fn format_optional_timestamp(raw: Option<&str>) -> String {
    match raw {
        Some(s) if !s.trim().is_empty() => format_timestamp(s),
        _ => UNSET_LABEL.to_string(),
    }
}

/// One page of list results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PageBody")]
pub struct LicensePage {
    pub rows: Vec<SoftwareLicense>,
    pub row_count: usize,
}

/// The server answers with a bare array today; an envelope with a total is accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageBody {
    Rows(Vec<SoftwareLicense>),
    Envelope {
        #[serde(alias = "rows")]
        items: Vec<SoftwareLicense>,
        #[serde(default, alias = "count")]
        total: Option<usize>,
    },
}

impl From<PageBody> for LicensePage {
    fn from(body: PageBody) -> Self {
        match body {
            PageBody::Rows(rows) => LicensePage {
                row_count: rows.len(),
                rows,
            },
            PageBody::Envelope { items, total } => LicensePage {
                row_count: total.unwrap_or(items.len()),
                rows: items,
            },
        }
    }
}

/// Body of `POST /softwarelicense` and `PUT /softwarelicense/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    #[serde(rename = "SoftwareInfoID")]
    pub software_info_id: i64,
    #[serde(rename = "LicenseType")]
    pub license_type: SoftwareType,
    #[serde(rename = "LicenseStatus")]
    pub license_status: LicenseStatus,
    #[serde(rename = "LicenseKey")]
    pub license_key: String,
    #[serde(rename = "LicenseExpiredDate")]
    pub expired_at: Option<String>,
    #[serde(rename = "LvLimit")]
    pub level_limit: Option<i64>,
    #[serde(rename = "Remark")]
    pub remark: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRequest {
    #[serde(rename = "LicenseID")]
    pub license_id: i64,
    #[serde(rename = "Duration_Days")]
    pub duration_days: u32,
}

/// The server resolves `RecordID` to the active usage record of that license id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewRequest {
    #[serde(rename = "RecordID")]
    pub record_id: i64,
    #[serde(rename = "Renew_Days")]
    pub renew_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    #[serde(rename = "LicenseID")]
    pub license_id: i64,
}

/// A usage-record command ready to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCommand {
    Apply(ApplyRequest),
    Renew(RenewRequest),
    Return(ReturnRequest),
}

impl UsageCommand {
    pub fn action(&self) -> LifecycleAction {
        match self {
            UsageCommand::Apply(_) => LifecycleAction::Apply,
            UsageCommand::Renew(_) => LifecycleAction::Renew,
            UsageCommand::Return(_) => LifecycleAction::Return,
        }
    }
}

/// Results delivered from the request controller back to presentation layers.
#[derive(Debug, Clone)]
pub enum AppEvent {
    ListLoaded {
        generation: u64,
        result: Result<LicensePage, ApiError>,
    },
    DetailLoaded {
        session: u64,
        result: Result<SoftwareLicense, ApiError>,
    },
    CommitFinished {
        session: u64,
        action: LifecycleAction,
        result: Result<(), ApiError>,
    },
    SaveFinished {
        session: u64,
        // Box to keep AppEvent small; a license with nested info is the largest payload.
        result: Result<Box<SoftwareLicense>, ApiError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> serde_json::Value {
        json!({
            "LicenseID": 42,
            "SoftwareInfoID": 7,
            "LicenseType": 1,
            "LicenseStatus": 0,
            "LicenseKey": "ABCD-EFGH",
            "LicenseExpiredDate": "2025-12-31T16:00:00+00:00",
            "LvLimit": 3,
            "Remark": "team seat",
            "CreateTime": "2025-01-02T03:04:05+00:00",
            "LastUpdateTime": "2025-02-03T04:05:06+00:00",
            "software_info": {
                "SoftwareInfoID": 7,
                "SoftwareInfoName": "Office 365",
                "SoftwareInfoType": 1,
                "SoftwareInfoMatchRule": "office*"
            }
        })
    }

    #[test]
    fn round_trip_keeps_every_field() {
        let original = full_payload();
        let license = SoftwareLicense::from_value(original.clone()).unwrap();
        assert_eq!(license.license_id, 42);
        assert_eq!(license.license_status, LicenseStatus::Available);
        assert_eq!(license.software_name(), Some("Office 365"));
        assert_eq!(serde_json::to_value(&license).unwrap(), original);
    }

    #[test]
    fn null_software_info_round_trips_as_null() {
        let mut payload = full_payload();
        payload["software_info"] = serde_json::Value::Null;
        let license = SoftwareLicense::from_value(payload.clone()).unwrap();
        assert!(license.software_info.is_none());
        assert_eq!(license.software_name(), None);
        assert_eq!(serde_json::to_value(&license).unwrap(), payload);
    }

    #[test]
    fn missing_status_and_type_do_not_fail() {
        let license = SoftwareLicense::from_value(json!({
            "LicenseID": 1,
            "SoftwareInfoID": 2,
            "LicenseType": 0
        }))
        .unwrap();
        assert_eq!(license.license_status, LicenseStatus::Available);
        assert_eq!(license.license_type, Some(SoftwareType::Os));

        let license = SoftwareLicense::from_value(json!({
            "LicenseID": 1,
            "SoftwareInfoID": 2,
            "LicenseType": null,
            "LicenseStatus": null
        }))
        .unwrap();
        assert_eq!(license.license_status, LicenseStatus::Available);
        assert_eq!(license.license_type, None);
        assert_eq!(license.license_type_label(), UNKNOWN_LABEL);
    }

    #[test]
    fn page_keeps_rows_with_null_software_type() {
        let mut odd = full_payload();
        odd["LicenseID"] = json!(43);
        odd["software_info"]["SoftwareInfoType"] = serde_json::Value::Null;
        let page: LicensePage = serde_json::from_value(json!([full_payload(), odd])).unwrap();
        assert_eq!(page.row_count, 2);
        let info = page.rows[1].software_info.as_ref().unwrap();
        assert_eq!(info.software_type, None);
        assert_eq!(info.type_label(), UNKNOWN_LABEL);
        assert_eq!(
            serde_json::to_value(&page.rows[1]).unwrap()["software_info"]["SoftwareInfoType"],
            serde_json::Value::Null
        );
    }

    #[test]
    fn unknown_status_degrades_to_unknown_label() {
        let mut payload = full_payload();
        payload["LicenseStatus"] = json!(9);
        payload["LicenseType"] = json!(42);
        let license = SoftwareLicense::from_value(payload.clone()).unwrap();
        assert_eq!(license.license_status, LicenseStatus::Unknown(9));
        assert_eq!(license.display_status(), UNKNOWN_LABEL);
        assert_eq!(license.license_type, Some(SoftwareType::Unknown(42)));
        assert_eq!(license.license_type_label(), UNKNOWN_LABEL);
        // unknown codes still round-trip verbatim
        assert_eq!(serde_json::to_value(&license).unwrap(), payload);
    }

    #[test]
    fn timestamps_format_or_fall_back() {
        assert_eq!(format_timestamp("not a date"), "not a date");
        let shown = format_timestamp("2025-06-01T12:30:00Z");
        assert!(shown.starts_with("2025-"), "{shown}");
        assert_eq!(shown.len(), "2025-06-01 12:30:00".len());

        let naive = parse_timestamp("2025-06-01T12:30").unwrap();
        assert_eq!(naive.offset(), UtcOffset::UTC);
        assert_eq!(naive.hour(), 12);
        assert!(parse_timestamp("2025-06-01T12:30:00.123456+08:00").is_some());
    }

    #[test]
    fn blank_expiry_is_unset() {
        let mut license = SoftwareLicense::from_value(full_payload()).unwrap();
        license.expired_at = Some("  ".into());
        assert_eq!(license.formatted_expired_at(), UNSET_LABEL);
    }

    #[test]
    fn page_accepts_array_and_envelope() {
        let row = full_payload();
        let page: LicensePage = serde_json::from_value(json!([row.clone(), row.clone()])).unwrap();
        assert_eq!(page.row_count, 2);

        let page: LicensePage =
            serde_json::from_value(json!({ "items": [row.clone()], "total": 30 })).unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.row_count, 30);

        let page: LicensePage = serde_json::from_value(json!({ "rows": [row] })).unwrap();
        assert_eq!(page.row_count, 1);
    }

    #[test]
    fn usage_bodies_use_server_field_names() {
        let apply = ApplyRequest {
            license_id: 42,
            duration_days: 60,
        };
        assert_eq!(
            serde_json::to_value(apply).unwrap(),
            json!({ "LicenseID": 42, "Duration_Days": 60 })
        );
        let renew = RenewRequest {
            record_id: 42,
            renew_days: 60,
        };
        assert_eq!(
            serde_json::to_value(renew).unwrap(),
            json!({ "RecordID": 42, "Renew_Days": 60 })
        );
    }

    #[test]
    fn enum_cycles_skip_unknown() {
        assert_eq!(LicenseStatus::Expired.cycle(true), LicenseStatus::Available);
        assert_eq!(LicenseStatus::Available.cycle(false), LicenseStatus::Expired);
        assert_eq!(LicenseStatus::Unknown(7).cycle(true), LicenseStatus::Available);
        assert_eq!(SoftwareType::Other.cycle(true), SoftwareType::Os);
    }
}
