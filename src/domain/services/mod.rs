pub mod discovery;
pub mod normalizer;
pub mod params;

use crate::utils::error::{EtlError, Result};
use url::Url;

/// 沒有 scheme 的 domain 預設為 https
pub fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// 相對連結以 tournament domain 為基準解析，絕對連結原樣使用
pub fn resolve_url(domain: &str, link: &str) -> Result<String> {
    let link = link.trim();
    if link.starts_with("http://") || link.starts_with("https://") {
        return Ok(link.to_string());
    }

    let base = Url::parse(&normalize_domain(domain)).map_err(|e| EtlError::InvalidValueError {
        field: "domain".to_string(),
        value: domain.to_string(),
        reason: e.to_string(),
    })?;

    base.join(link)
        .map(String::from)
        .map_err(|e| EtlError::InvalidValueError {
            field: "link".to_string(),
            value: link.to_string(),
            reason: e.to_string(),
        })
}
