//! Request context extraction
//!
//! The upstream gateway authenticates the terminal and forwards its tenant
//! and branch in trusted headers.

use hyper::header::{HeaderMap, IF_MATCH};
use percent_encoding::percent_decode_str;
use tenantsync_core::domain::TenantContext;

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const BRANCH_HEADER: &str = "x-branch-id";
pub const BASE_HASH_HEADER: &str = "x-base-hash";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| ApiError::bad_request(format!("header {name} is not valid text"))),
    }
}

/// Reads the tenant context: missing headers are 401, invalid ids 400
pub fn tenant_context(headers: &HeaderMap) -> Result<TenantContext, ApiError> {
    let tenant = header(headers, TENANT_HEADER)?;
    let branch = header(headers, BRANCH_HEADER)?;
    match (tenant, branch) {
        (Some(tenant), Some(branch)) => {
            TenantContext::parse(tenant, branch).map_err(|e| ApiError::bad_request(e.to_string()))
        }
        _ => Err(ApiError::unauthorized(format!(
            "{TENANT_HEADER} and {BRANCH_HEADER} headers are required"
        ))),
    }
}

/// Precondition hash from `X-Base-Hash`, falling back to `If-Match`
pub fn base_hash(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let raw = match header(headers, BASE_HASH_HEADER)? {
        Some(value) => Some(value),
        None => header(headers, IF_MATCH.as_str())?,
    };
    Ok(raw
        .map(|v| v.trim_start_matches("W/").trim_matches('"').to_string())
        .filter(|v| !v.is_empty()))
}

/// Value of a query parameter, form-decoded
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != name {
            return None;
        }
        let value = value.replace('+', " ");
        Some(percent_decode_str(&value).decode_utf8_lossy().into_owned())
    })
}
