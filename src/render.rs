//! Text and JSON output for the scripting modes.

use crate::lifecycle::actions_for;
use crate::model::{LicensePage, SoftwareLicense, UNSET_LABEL};
use crate::orchestrator::scripted::Outcome;
use anyhow::Result;
use serde_json::json;

const NO_NAME: &str = "-";

/// One tab-separated line per license, with a header line first.
pub(crate) fn list_lines(page: &LicensePage) -> Vec<String> {
    let mut lines = Vec::with_capacity(page.rows.len() + 2);
    lines.push("ID\t软件名称\t授权类型\t状态\t过期时间\t职级限制".to_string());
    for license in &page.rows {
        lines.push(format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            license.license_id,
            license.software_name().unwrap_or(NO_NAME),
            license.license_type_label(),
            license.display_status(),
            license.formatted_expired_at(),
            level_limit(license),
        ));
    }
    lines.push(format!("共 {} 条", page.row_count));
    lines
}

fn level_limit(license: &SoftwareLicense) -> String {
    license
        .level_limit
        .map(|lv| lv.to_string())
        .unwrap_or_else(|| NO_NAME.to_string())
}

pub(crate) fn detail_lines(license: &SoftwareLicense) -> Vec<String> {
    let mut lines = vec![
        format!("授权ID: {}", license.license_id),
        format!(
            "软件: {} (ID {})",
            license.software_name().unwrap_or(NO_NAME),
            license.software_info_id
        ),
    ];
    if let Some(info) = &license.software_info {
        lines.push(format!("软件类型: {}", info.type_label()));
    }
    lines.push(format!("授权类型: {}", license.license_type_label()));
    lines.push(format!("状态: {}", license.display_status()));
    lines.push(format!(
        "授权密钥: {}",
        license.license_key.as_deref().unwrap_or(UNSET_LABEL)
    ));
    lines.push(format!("过期时间: {}", license.formatted_expired_at()));
    lines.push(format!("职级限制: {}", level_limit(license)));
    if let Some(remark) = license.remark.as_deref().filter(|r| !r.trim().is_empty()) {
        lines.push(format!("备注: {remark}"));
    }
    lines.push(format!("最后更新: {}", license.formatted_last_updated_at()));

    let actions: Vec<&str> = actions_for(license.license_status)
        .iter()
        .map(|a| a.label())
        .collect();
    if !actions.is_empty() {
        lines.push(format!("可用操作: {}", actions.join(" / ")));
    }
    lines
}

pub(crate) fn outcome_lines(outcome: &Outcome) -> Vec<String> {
    match outcome {
        Outcome::Cancelled => vec!["已取消".to_string()],
        Outcome::Updated { action, license } => {
            let mut lines = vec![format!("{}成功", action.label())];
            lines.extend(detail_lines(license));
            lines
        }
        Outcome::Released { license_id } => vec![format!("已归还授权 #{license_id}")],
        Outcome::Saved(license) => {
            let mut lines = vec!["保存成功".to_string()];
            lines.extend(detail_lines(license));
            lines
        }
    }
}

pub(crate) fn outcome_json(outcome: &Outcome) -> Result<String> {
    let value = match outcome {
        Outcome::Cancelled => json!({ "cancelled": true }),
        Outcome::Updated { action, license } => json!({ "action": action, "license": license }),
        Outcome::Released { license_id } => json!({ "action": "Return", "LicenseID": license_id }),
        Outcome::Saved(license) => json!({ "saved": true, "license": license }),
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
