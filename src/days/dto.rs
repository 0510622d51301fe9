use serde::{Deserialize, Serialize};
use time::Date;

use super::model::DayRecord;
use super::state::{DaysState, LoadStatus};
use super::store::Direction;
use crate::analysis::transform;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub current_date: Date,
    pub status: LoadStatus,
    pub day: Option<DayRecord>,
    pub has_previous_day: bool,
    pub has_next_day: bool,
    pub total_score: f64,
    pub body_fat: String,
    pub error: Option<String>,
}

impl From<&DaysState> for DayView {
    fn from(s: &DaysState) -> Self {
        let (total_score, body_fat) = match &s.current {
            Some(day) => (
                transform::total_score(&day.progress),
                transform::average_body_fat(&day.progress),
            ),
            None => (0.0, "-".to_string()),
        };
        Self {
            current_date: s.current_date,
            status: s.status,
            day: s.current.clone(),
            has_previous_day: s.has_previous_day,
            has_next_day: s.has_next_day,
            total_score,
            body_fat,
            error: s.error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDaysResponse {
    pub days: Vec<DayRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenDayRequest {
    #[serde(default)]
    pub date: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub direction: Direction,
}
