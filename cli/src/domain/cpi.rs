//! CPI error taxonomy and `info` negotiation.
//!
//! Pure functions only: no I/O, no async, no process spawning.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::domain::error::CloudError;

/// Highest CPI API version this deployer speaks.
pub const MAX_SUPPORTED_API_VERSION: u32 = 2;

/// API version used for the `info` call itself, before anything is negotiated.
pub const INFO_REQUEST_API_VERSION: u32 = 1;

/// Closed set of CPI error kinds the lifecycle engines react to.
///
/// Anything the plugin reports that is not one of the named kinds is `Cloud`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpiErrorKind {
    VmNotFound,
    DiskNotFound,
    StemcellNotFound,
    NotImplemented,
    Cloud,
}

impl CpiErrorKind {
    /// Classify a wire `type` string.
    ///
    /// Only the last `::`-separated segment is significant, and a trailing
    /// `Error` is ignored, so `Bosh::Clouds::VMNotFound` and `VMNotFoundError`
    /// land on the same kind.
    #[must_use]
    pub fn classify(error_type: &str) -> Self {
        let segment = error_type.rsplit("::").next().unwrap_or(error_type);
        let segment = segment.strip_suffix("Error").unwrap_or(segment);
        match segment {
            "VMNotFound" | "VmNotFound" => Self::VmNotFound,
            "DiskNotFound" => Self::DiskNotFound,
            "StemcellNotFound" => Self::StemcellNotFound,
            "NotImplemented" => Self::NotImplemented,
            _ => Self::Cloud,
        }
    }
}

/// Capabilities a CPI reports from `info`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpiInfo {
    pub stemcell_formats: BTreeSet<String>,
    /// Negotiated version: the reported value clamped to
    /// [`MAX_SUPPORTED_API_VERSION`]. Zero when the plugin reports none.
    pub api_version: u32,
}

impl CpiInfo {
    /// Parse the `result` of an `info` call.
    ///
    /// A missing `stemcell_formats` is an empty set and a missing or `null`
    /// `api_version` is 0. Anything present with the wrong shape is an error.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::ResponseUnmarshalling`] if the result is not an
    /// object, the formats are not a list of strings, or the version is not a
    /// non-negative integer.
    pub fn from_result(result: &Value) -> Result<Self, CloudError> {
        let malformed = |reason: String| CloudError::ResponseUnmarshalling {
            method: "info".to_string(),
            reason,
        };

        let Some(object) = result.as_object() else {
            return Err(malformed(format!("expected an object, got '{result}'")));
        };

        let stemcell_formats = match object.get("stemcell_formats") {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        malformed(format!("stemcell format '{item}' is not a string"))
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(malformed(format!(
                    "stemcell_formats '{other}' is not a list"
                )));
            }
        };

        let reported = match object.get("api_version") {
            None | Some(Value::Null) => 0,
            Some(value) => parse_api_version(value)
                .ok_or_else(|| malformed(format!("api_version '{value}' is not an integer")))?,
        };

        Ok(Self {
            stemcell_formats,
            api_version: negotiate_api_version(reported),
        })
    }
}

/// The version both sides understand.
#[must_use]
pub fn negotiate_api_version(reported: u64) -> u32 {
    u32::try_from(reported.min(u64::from(MAX_SUPPORTED_API_VERSION)))
        .unwrap_or(MAX_SUPPORTED_API_VERSION)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_api_version(value: &Value) -> Option<u64> {
    if let Some(v) = value.as_u64() {
        return Some(v);
    }
    // 2.0 is accepted; 2.5 and -1 are not.
    let f = value.as_f64()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}
