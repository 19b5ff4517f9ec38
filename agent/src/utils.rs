//! Utility functions

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Version information for the worker binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Random record id (32 hex chars)
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Current unix time in seconds
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Current time as an RFC 3339 string, used to prefix job log lines
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
