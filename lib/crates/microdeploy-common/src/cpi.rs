//! CPI wire protocol.
//!
//! Each call writes exactly one [`CpiCommand`] to the plugin's stdin and reads
//! exactly one [`CpiResult`] from its stdout. Optional context fields are
//! omitted from the JSON, never sent as `null`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request sent to the CPI executable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpiCommand {
    pub method: String,
    /// Positional arguments. Order is fixed per method.
    pub arguments: Vec<Value>,
    pub context: CpiContext,
    pub api_version: u32,
}

/// Per-call context telling the plugin which dialect to speak.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpiContext {
    #[serde(rename = "director_uuid")]
    pub director_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<CpiVmContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpiVmContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stemcell: Option<CpiStemcellContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpiStemcellContext {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub api_version: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if signature
fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl CpiContext {
    /// Context carrying only the director identity.
    #[must_use]
    pub fn new(director_id: impl Into<String>) -> Self {
        Self {
            director_id: director_id.into(),
            vm: None,
        }
    }

    /// Context for a VM built from a stemcell speaking `api_version`.
    ///
    /// A zero version means the stemcell predates versioning, in which case
    /// the `vm` block is left out entirely.
    #[must_use]
    pub fn with_stemcell_api_version(mut self, api_version: u32) -> Self {
        self.vm = (api_version > 0).then(|| CpiVmContext {
            stemcell: Some(CpiStemcellContext { api_version }),
        });
        self
    }
}

/// Response read back from the CPI executable.
///
/// Exactly one of `result` / `error` is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpiResult {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<CpiErrorPayload>,
    #[serde(default)]
    pub log: String,
}

/// Domain failure reported by the plugin over a successful exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CpiErrorPayload {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
    /// Advisory only; never acted upon automatically.
    #[serde(default)]
    pub ok_to_retry: bool,
}

impl fmt::Display for CpiErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "CmdError{json}")
    }
}
