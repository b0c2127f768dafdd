//! Filesystem protocol shared with the requesting process.
//!
//! The requester drops `request-<opaque>.json` into the shared permission
//! directory and waits for `response-<requestId>.json` to appear next to it:
//!
//! ```text
//! request-8f2c.json   {"requestId": "r1", "toolName": "Bash", "inputs": {"command": "ls"}}
//! response-r1.json    {"allow": true}
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Prefix of request artifact file names.
pub const REQUEST_PREFIX: &str = "request-";
/// Prefix of response artifact file names.
pub const RESPONSE_PREFIX: &str = "response-";
/// Extension shared by both artifact kinds.
pub const ARTIFACT_SUFFIX: &str = ".json";
/// Name of the shared directory under the OS temp dir.
pub const PERMISSION_DIR_NAME: &str = "claude-permission";

/// Tool parameters, in the key order they appeared in the artifact.
pub type Inputs = serde_json::Map<String, serde_json::Value>;

/// Outcome of a permission decision.
///
/// The discriminants are the wire codes exchanged with prompt providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Allow this invocation only.
    Allow = 1,
    /// Allow and remember for every later invocation of the tool.
    AllowAlways = 2,
    /// Refuse this invocation.
    Deny = 3,
}

impl Verdict {
    /// Wire code of this verdict.
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Decode a wire code. Anything unrecognised is treated as a refusal.
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Allow,
            2 => Self::AllowAlways,
            _ => Self::Deny,
        }
    }

    /// Whether the tool may run.
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow | Self::AllowAlways)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::AllowAlways => "allow_always",
            Self::Deny => "deny",
        }
    }
}

impl From<Verdict> for i64 {
    fn from(verdict: Verdict) -> Self {
        verdict.code()
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A pending permission request read from a request artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    /// Correlation id chosen by the requester; names the response artifact.
    pub request_id: String,
    /// Tool asking for permission (e.g. `Bash`, `Write`).
    pub tool_name: String,
    /// Concrete parameters of the invocation.
    pub inputs: Inputs,
}

impl PermissionRequest {
    /// Parse a request artifact body.
    ///
    /// Fails when the body is not JSON, a field is missing or mistyped, or
    /// the request id could not safely name a response file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedRequest(e.to_string()))?;
        validate_request_id(&request.request_id)?;
        Ok(request)
    }

    /// File name of the response artifact for this request.
    pub fn response_file_name(&self) -> String {
        response_file_name(&self.request_id)
    }
}

fn validate_request_id(request_id: &str) -> Result<()> {
    if request_id.is_empty() {
        return Err(Error::MalformedRequest("empty requestId".to_string()));
    }
    if request_id.contains(['/', '\\']) || request_id.contains("..") {
        return Err(Error::MalformedRequest(format!(
            "requestId {request_id:?} is not a valid file name component"
        )));
    }
    Ok(())
}

/// Body of a response artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionReply {
    pub allow: bool,
}

impl PermissionReply {
    pub const fn new(allow: bool) -> Self {
        Self { allow }
    }
}

/// Whether a directory entry name looks like a request artifact.
pub fn is_request_file_name(name: &str) -> bool {
    name.len() > REQUEST_PREFIX.len() + ARTIFACT_SUFFIX.len()
        && name.starts_with(REQUEST_PREFIX)
        && name.ends_with(ARTIFACT_SUFFIX)
}

/// `response-<request_id>.json`
pub fn response_file_name(request_id: &str) -> String {
    format!("{RESPONSE_PREFIX}{request_id}{ARTIFACT_SUFFIX}")
}

/// Default shared directory: `<tmp>/claude-permission`.
pub fn default_permission_dir() -> PathBuf {
    std::env::temp_dir().join(PERMISSION_DIR_NAME)
}

/// Structural fingerprint of tool inputs.
///
/// BLAKE3 over the compact JSON serialisation in stored key order. Inputs
/// that are equal as maps but were written with keys in a different order
/// produce different fingerprints.
pub fn inputs_fingerprint(inputs: &Inputs) -> String {
    let bytes = serde_json::to_vec(inputs).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}
