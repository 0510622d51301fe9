use serde::Serialize;
use time::Date;
use uuid::Uuid;

use super::model::DayRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Unloaded,
    Loading,
    Loaded,
    Error,
}

/// What one signed-in client is looking at.
#[derive(Debug, Clone, PartialEq)]
pub struct DaysState {
    pub session: Option<Uuid>,
    pub current_date: Date,
    pub current: Option<DayRecord>,
    pub status: LoadStatus,
    pub has_previous_day: bool,
    pub has_next_day: bool,
    /// Records prefetched for the last few days, newest first.
    pub recent: Vec<DayRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DaysAction {
    Started,
    Loaded(DayRecord),
    Failed(String),
    DateChanged(Date),
    AdjacencyChecked { prev: bool, next: bool },
    RecentLoaded(Vec<DayRecord>),
}

impl DaysState {
    pub fn new(session: Option<Uuid>, today: Date) -> Self {
        Self {
            session,
            current_date: today,
            current: None,
            status: LoadStatus::Unloaded,
            has_previous_day: false,
            has_next_day: false,
            recent: Vec::new(),
            error: None,
        }
    }

    pub fn dispatch(&mut self, action: DaysAction) {
        *self = reduce(self, action);
    }

    pub fn cached(&self, date: Date) -> Option<&DayRecord> {
        self.recent.iter().find(|r| r.created_at == date)
    }
}

pub fn reduce(state: &DaysState, action: DaysAction) -> DaysState {
    let mut next = state.clone();
    match action {
        DaysAction::Started => {
            next.status = LoadStatus::Loading;
            next.error = None;
        }
        DaysAction::Loaded(record) => {
            if let Some(slot) = next.recent.iter_mut().find(|r| r.id == record.id) {
                *slot = record.clone();
            }
            next.current = Some(record);
            next.status = LoadStatus::Loaded;
            next.error = None;
        }
        DaysAction::Failed(message) => {
            // the last loaded record stays on screen
            next.status = LoadStatus::Error;
            next.error = Some(message);
        }
        DaysAction::DateChanged(date) => next.current_date = date,
        DaysAction::AdjacencyChecked { prev, next: has_next } => {
            next.has_previous_day = prev;
            next.has_next_day = has_next;
        }
        DaysAction::RecentLoaded(mut records) => {
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            next.recent = records;
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn record(day: Date) -> DayRecord {
        DayRecord::empty(Uuid::new_v4(), Uuid::new_v4(), day)
    }

    #[test]
    fn loading_then_loaded() {
        let s = DaysState::new(Some(Uuid::new_v4()), date!(2024 - 06 - 01));
        assert_eq!(s.status, LoadStatus::Unloaded);
        let s = reduce(&s, DaysAction::Started);
        assert_eq!(s.status, LoadStatus::Loading);
        let rec = record(date!(2024 - 06 - 01));
        let s = reduce(&s, DaysAction::Loaded(rec.clone()));
        assert_eq!(s.status, LoadStatus::Loaded);
        assert_eq!(s.current, Some(rec));
    }

    #[test]
    fn failure_retains_previous_record_and_retry_clears_error() {
        let rec = record(date!(2024 - 06 - 01));
        let mut s = DaysState::new(None, date!(2024 - 06 - 01));
        s.dispatch(DaysAction::Loaded(rec.clone()));
        s.dispatch(DaysAction::Failed("boom".into()));
        assert_eq!(s.status, LoadStatus::Error);
        assert_eq!(s.error.as_deref(), Some("boom"));
        assert_eq!(s.current, Some(rec));

        s.dispatch(DaysAction::Started);
        assert_eq!(s.status, LoadStatus::Loading);
        assert_eq!(s.error, None);
    }

    #[test]
    fn loaded_refreshes_matching_cache_entry() {
        let old = record(date!(2024 - 06 - 01));
        let mut s = DaysState::new(None, date!(2024 - 06 - 01));
        s.dispatch(DaysAction::RecentLoaded(vec![old.clone(), record(date!(2024 - 06 - 02))]));
        assert_eq!(s.recent[0].created_at, date!(2024 - 06 - 02));

        let mut newer = old.clone();
        newer.revision = 7;
        s.dispatch(DaysAction::Loaded(newer));
        assert_eq!(s.cached(date!(2024 - 06 - 01)).map(|r| r.revision), Some(7));
    }

    #[test]
    fn reduce_leaves_input_untouched() {
        let s = DaysState::new(None, date!(2024 - 06 - 01));
        let _ = reduce(&s, DaysAction::DateChanged(date!(2024 - 06 - 02)));
        assert_eq!(s.current_date, date!(2024 - 06 - 01));
    }
}
