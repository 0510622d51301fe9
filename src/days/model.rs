use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

/// Body region a photo was taken of.
///
/// The three regions the app ships with are closed variants. Anything else a
/// client sends is kept verbatim in [`ScanType::Other`] so new regions can be
/// rolled out without a server release.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanType {
    Fullbody,
    Back,
    Legs,
    Other(String),
}

impl ScanType {
    pub fn as_str(&self) -> &str {
        match self {
            ScanType::Fullbody => "fullbody",
            ScanType::Back => "back",
            ScanType::Legs => "legs",
            ScanType::Other(key) => key,
        }
    }
}

/// Keys are case-insensitive: `"Arms"` and `"arms"` name the same scan type.
impl From<String> for ScanType {
    fn from(raw: String) -> Self {
        let key = raw.trim().to_lowercase();
        match key.as_str() {
            "fullbody" => ScanType::Fullbody,
            "back" => ScanType::Back,
            "legs" => ScanType::Legs,
            _ => ScanType::Other(key),
        }
    }
}

impl From<&str> for ScanType {
    fn from(raw: &str) -> Self {
        ScanType::from(raw.to_string())
    }
}

impl From<ScanType> for String {
    fn from(scan: ScanType) -> Self {
        match scan {
            ScanType::Other(key) => key,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sub-metric of an analysis. Which field is set depends on the metric:
/// scores for body parts, `percentage` for body fat, `age` for body age,
/// `monthsNumber` for time-to-goal estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months_number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    pub suggestion: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub improvement_suggestions: Vec<ImprovementSuggestion>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Metric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_fat_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AnalysisDetails>,
}

pub type Progress = BTreeMap<ScanType, AnalysisResult>;

/// One user's tracked calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: Date,
    pub progress: Progress,
    pub pic_by_type: BTreeMap<ScanType, String>,
    /// Bumped by every successful write; conditional updates key on it.
    pub revision: i64,
}

impl DayRecord {
    pub fn empty(id: Uuid, user_id: Uuid, created_at: Date) -> Self {
        Self {
            id,
            user_id,
            created_at,
            progress: Progress::new(),
            pic_by_type: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Incoming keys replace whole entries; every other key is kept.
    pub fn merge_progress(&self, partial: &Progress) -> Self {
        let mut next = self.clone();
        for (scan, result) in partial {
            next.progress.insert(scan.clone(), result.clone());
        }
        next
    }

    pub fn with_pic(&self, scan: &ScanType, url: &str) -> Self {
        let mut next = self.clone();
        next.pic_by_type.insert(scan.clone(), url.to_string());
        next
    }

    pub fn without_scan(&self, scan: &ScanType) -> Self {
        let mut next = self.clone();
        next.progress.remove(scan);
        next.pic_by_type.remove(scan);
        next
    }

    pub fn pic(&self, scan: &ScanType) -> Option<&str> {
        self.pic_by_type.get(scan).map(String::as_str)
    }
}
