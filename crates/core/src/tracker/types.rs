use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::converter::Format;

/// Outcome of one format conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    Success,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// A persisted conversion outcome. Rows are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: i64,
    pub attachment_id: i64,
    pub original_path: String,
    /// Empty for failures.
    pub converted_path: String,
    pub format: Format,
    pub status: ConversionStatus,
    /// Percent, negative when the output grew.
    pub size_reduction: f64,
    /// Seconds.
    pub processing_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Original size minus converted size, measured at insert.
    pub bytes_saved: i64,
    pub created_at: DateTime<Utc>,
}

/// Conjunctive filter over conversion records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsFilter {
    #[serde(default)]
    pub format: Option<Format>,
    #[serde(default)]
    pub status: Option<ConversionStatus>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachment_id: Option<i64>,
}

impl StatsFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_status(mut self, status: ConversionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_attachment(mut self, attachment_id: i64) -> Self {
        self.attachment_id = Some(attachment_id);
        self
    }
}

/// Aggregates over the records matching a filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_conversions: u64,
    pub successful_conversions: u64,
    pub failed_conversions: u64,
    /// Percent of successful conversions, 0 when there are none.
    pub success_rate: f64,
    /// Mean size reduction over successful conversions.
    pub average_size_reduction: f64,
    /// Sum of bytes saved, in bytes.
    pub total_space_saved: i64,
    pub conversions_by_format: BTreeMap<Format, u64>,
}

impl Statistics {
    pub(crate) fn compute_success_rate(&mut self) {
        self.success_rate = if self.total_conversions == 0 {
            0.0
        } else {
            self.successful_conversions as f64 / self.total_conversions as f64 * 100.0
        };
    }
}
