use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use time::Date;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::model::{DayRecord, Progress, ScanType};
use super::repo::DayRepo;
use super::state::{DaysAction, DaysState};
use crate::analysis::{transform, AnalysisError, AnalysisGateway};
use crate::error::StoreError;
use crate::images::services::{delete_scan_image, upload_scan_image};
use crate::storage::StorageClient;

pub const DEFAULT_MERGE_ATTEMPTS: usize = 3;
pub const DEFAULT_RECENT_DAYS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "previous")]
    Prev,
    Next,
}

/// Operations behind every day screen. The store itself is stateless; each
/// call reads and updates the caller's [`DaysState`].
pub struct DayStore {
    repo: Arc<dyn DayRepo>,
    storage: Arc<dyn StorageClient>,
    analyzer: Arc<dyn AnalysisGateway>,
    merge_attempts: usize,
    recent_days: usize,
}

impl DayStore {
    pub fn new(
        repo: Arc<dyn DayRepo>,
        storage: Arc<dyn StorageClient>,
        analyzer: Arc<dyn AnalysisGateway>,
    ) -> Self {
        Self {
            repo,
            storage,
            analyzer,
            merge_attempts: DEFAULT_MERGE_ATTEMPTS,
            recent_days: DEFAULT_RECENT_DAYS,
        }
    }

    pub fn with_recent_days(mut self, days: usize) -> Self {
        self.recent_days = days.max(1);
        self
    }

    pub fn with_merge_attempts(mut self, attempts: usize) -> Self {
        self.merge_attempts = attempts.max(1);
        self
    }

    /// Finds the (user, date) record or creates an empty one, and makes it
    /// current.
    #[instrument(skip(self, state), fields(user_id = ?state.session))]
    pub async fn fetch_or_create(
        &self,
        state: &mut DaysState,
        date: Date,
    ) -> Result<DayRecord, StoreError> {
        state.dispatch(DaysAction::Started);
        let result = self.load(state, date).await;
        self.settle(state, "fetch_or_create", result)
    }

    /// Fetch-or-create, then point the current date at it and refresh the
    /// adjacency flags.
    pub async fn open_day(&self, state: &mut DaysState, date: Date) -> Result<DayRecord, StoreError> {
        let record = self.fetch_or_create(state, date).await?;
        state.dispatch(DaysAction::DateChanged(date));
        self.check_adjacent(state, date).await;
        Ok(record)
    }

    pub async fn refresh_current(&self, state: &mut DaysState) -> Result<DayRecord, StoreError> {
        let date = state.current_date;
        self.fetch_or_create(state, date).await
    }

    #[instrument(skip(self, state), fields(user_id = ?state.session))]
    pub async fn navigate(
        &self,
        state: &mut DaysState,
        direction: Direction,
    ) -> Result<DayRecord, StoreError> {
        if state.session.is_none() {
            return Err(self.fail(state, "navigate", StoreError::NotAuthenticated));
        }
        let target = match direction {
            Direction::Prev => state.current_date.previous_day(),
            Direction::Next => state.current_date.next_day(),
        };
        let Some(target) = target else {
            let err = StoreError::InvalidInput("date out of range".into());
            return Err(self.fail(state, "navigate", err));
        };

        let cached = state.cached(target).cloned();
        let record = match cached {
            Some(cached) => {
                state.dispatch(DaysAction::Loaded(cached.clone()));
                cached
            }
            None => self.fetch_or_create(state, target).await?,
        };
        state.dispatch(DaysAction::DateChanged(target));
        self.check_adjacent(state, target).await;
        Ok(record)
    }

    /// Looks up the neighbouring days in the remote store. Lookup failures
    /// count as "no record".
    pub async fn check_adjacent(&self, state: &mut DaysState, date: Date) {
        let Some(user_id) = state.session else {
            state.dispatch(DaysAction::AdjacencyChecked { prev: false, next: false });
            return;
        };
        let (prev, next) = tokio::join!(
            self.exists(user_id, date.previous_day()),
            self.exists(user_id, date.next_day()),
        );
        state.dispatch(DaysAction::AdjacencyChecked { prev, next });
    }

    async fn exists(&self, user_id: Uuid, date: Option<Date>) -> bool {
        let Some(date) = date else { return false };
        match self.repo.exists(user_id, date).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, %user_id, %date, "adjacent day check failed");
                false
            }
        }
    }

    /// Loads `today` and the days before it into the recent cache, creating
    /// the ones that do not exist yet.
    #[instrument(skip(self, state), fields(user_id = ?state.session))]
    pub async fn prefetch_recent(
        &self,
        state: &mut DaysState,
        today: Date,
    ) -> Result<Vec<DayRecord>, StoreError> {
        match self.load_recent(state, today).await {
            Ok(records) => {
                state.dispatch(DaysAction::RecentLoaded(records.clone()));
                Ok(records)
            }
            Err(e) => Err(self.fail(state, "prefetch_recent", e)),
        }
    }

    async fn load_recent(&self, state: &DaysState, today: Date) -> Result<Vec<DayRecord>, StoreError> {
        let user_id = session(state)?;
        let mut dates = vec![today];
        while dates.len() < self.recent_days {
            match dates.last().and_then(|d| d.previous_day()) {
                Some(d) => dates.push(d),
                None => break,
            }
        }

        let mut records = self
            .repo
            .list_for_dates(user_id, &dates)
            .await
            .map_err(StoreError::remote)?;
        for date in dates {
            if records.iter().any(|r| r.created_at == date) {
                continue;
            }
            let created = self
                .repo
                .insert(user_id, date)
                .await
                .map_err(StoreError::remote)?;
            records.push(created);
        }
        Ok(records)
    }

    /// Shallow-merges `partial` into the current record's progress. Local
    /// state changes only once the write is stored.
    #[instrument(skip(self, state, partial), fields(user_id = ?state.session))]
    pub async fn merge_progress(
        &self,
        state: &mut DaysState,
        partial: Progress,
    ) -> Result<DayRecord, StoreError> {
        let Some(current) = state.current.clone() else {
            return Err(self.fail(state, "merge_progress", StoreError::NoCurrentRecord));
        };
        state.dispatch(DaysAction::Started);
        let result = self.write(current, |r| r.merge_progress(&partial)).await;
        self.settle(state, "merge_progress", result)
    }

    /// Uploads a freshly captured photo and records its URL for `scan`.
    #[instrument(skip(self, state, body), fields(user_id = ?state.session, scan = %scan))]
    pub async fn attach_scan_image(
        &self,
        state: &mut DaysState,
        scan: ScanType,
        body: Bytes,
        content_type: &str,
    ) -> Result<DayRecord, StoreError> {
        state.dispatch(DaysAction::Started);
        let result = self.attach(state, &scan, body, content_type).await;
        self.settle(state, "attach_scan_image", result)
    }

    async fn attach(
        &self,
        state: &DaysState,
        scan: &ScanType,
        body: Bytes,
        content_type: &str,
    ) -> Result<DayRecord, StoreError> {
        let user_id = session(state)?;
        let current = match &state.current {
            Some(r) if r.created_at == state.current_date => r.clone(),
            _ => self.load(state, state.current_date).await?,
        };

        let url = upload_scan_image(
            self.storage.as_ref(),
            user_id,
            scan,
            current.created_at,
            body,
            content_type,
        )
        .await
        .map_err(StoreError::remote)?;

        match self.write_from(current, |r| r.with_pic(scan, &url)).await {
            Ok((saved, base)) => {
                // the replaced photo goes only once nothing points at it
                if let Some(old) = base.pic(scan).filter(|old| *old != url) {
                    delete_scan_image(self.storage.as_ref(), old).await;
                }
                Ok(saved)
            }
            Err(e) => {
                delete_scan_image(self.storage.as_ref(), &url).await;
                Err(e)
            }
        }
    }

    /// Sends the stored photo for `scan` to the analysis service and merges
    /// the result. A failed or timed out analysis leaves progress untouched.
    #[instrument(skip(self, state), fields(user_id = ?state.session, scan = %scan))]
    pub async fn analyze_scan(
        &self,
        state: &mut DaysState,
        scan: ScanType,
    ) -> Result<DayRecord, StoreError> {
        state.dispatch(DaysAction::Started);
        let result = self.analyze(state, &scan).await;
        self.settle(state, "analyze_scan", result)
    }

    async fn analyze(&self, state: &DaysState, scan: &ScanType) -> Result<DayRecord, StoreError> {
        let record = self.load(state, state.current_date).await?;
        let image_url = record
            .pic(scan)
            .ok_or_else(|| StoreError::MissingImage(scan.clone()))?
            .to_string();

        let raw = self.analyzer.analyze(&image_url).await.map_err(|e| match e {
            AnalysisError::Timeout(_) => StoreError::Timeout,
            other => StoreError::remote(other),
        })?;
        let analysis = transform::into_result(&raw);
        info!(
            day_id = %record.id,
            general_score = ?analysis.general_score,
            "analysis completed"
        );

        let partial = Progress::from([(scan.clone(), analysis)]);
        self.write(record, |r| r.merge_progress(&partial)).await
    }

    /// Drops one scan type's analysis and photo from the current day.
    #[instrument(skip(self, state), fields(user_id = ?state.session, scan = %scan))]
    pub async fn remove_scan(
        &self,
        state: &mut DaysState,
        scan: ScanType,
    ) -> Result<DayRecord, StoreError> {
        let Some(current) = state.current.clone() else {
            return Err(self.fail(state, "remove_scan", StoreError::NoCurrentRecord));
        };
        state.dispatch(DaysAction::Started);
        let result = match self.write_from(current, |r| r.without_scan(&scan)).await {
            Ok((saved, base)) => {
                if let Some(url) = base.pic(&scan) {
                    delete_scan_image(self.storage.as_ref(), url).await;
                }
                Ok(saved)
            }
            Err(e) => Err(e),
        };
        self.settle(state, "remove_scan", result)
    }

    /// Short-lived signed URL for the current day's `scan` photo.
    pub async fn presigned_scan_url(
        &self,
        state: &DaysState,
        scan: &ScanType,
        seconds: u64,
    ) -> Result<String, StoreError> {
        session(state)?;
        let current = state.current.as_ref().ok_or(StoreError::NoCurrentRecord)?;
        let url = current
            .pic(scan)
            .ok_or_else(|| StoreError::MissingImage(scan.clone()))?;
        let key = self
            .storage
            .key_from_public_url(url)
            .ok_or_else(|| StoreError::InvalidInput("image is not held in our storage".into()))?;
        self.storage
            .presign_get(&key, seconds)
            .await
            .map_err(StoreError::remote)
    }

    async fn load(&self, state: &DaysState, date: Date) -> Result<DayRecord, StoreError> {
        let user_id = session(state)?;
        if let Some(existing) = self
            .repo
            .find(user_id, date)
            .await
            .map_err(StoreError::remote)?
        {
            return Ok(existing);
        }
        let created = self
            .repo
            .insert(user_id, date)
            .await
            .map_err(StoreError::remote)?;
        info!(%user_id, %date, day_id = %created.id, "day created");
        Ok(created)
    }

    /// Applies `change` and stores it conditionally on the revision. When the
    /// row moved underneath us the change is re-applied to a fresh copy.
    async fn write<F>(&self, base: DayRecord, change: F) -> Result<DayRecord, StoreError>
    where
        F: Fn(&DayRecord) -> DayRecord,
    {
        self.write_from(base, change).await.map(|(saved, _)| saved)
    }

    /// Like [`Self::write`], also returning the row version the stored change
    /// was derived from.
    async fn write_from<F>(
        &self,
        base: DayRecord,
        change: F,
    ) -> Result<(DayRecord, DayRecord), StoreError>
    where
        F: Fn(&DayRecord) -> DayRecord,
    {
        let mut base = base;
        for attempt in 1..=self.merge_attempts {
            let next = change(&base);
            if let Some(saved) = self.repo.update(&next).await.map_err(StoreError::remote)? {
                return Ok((saved, base));
            }
            warn!(day_id = %base.id, attempt, revision = base.revision, "stale day revision");
            base = self
                .repo
                .get(base.id)
                .await
                .map_err(StoreError::remote)?
                .ok_or(StoreError::NoCurrentRecord)?;
        }
        Err(StoreError::Conflict)
    }

    fn settle(
        &self,
        state: &mut DaysState,
        op: &'static str,
        result: Result<DayRecord, StoreError>,
    ) -> Result<DayRecord, StoreError> {
        match result {
            Ok(record) => {
                state.dispatch(DaysAction::Loaded(record.clone()));
                Ok(record)
            }
            Err(e) => Err(self.fail(state, op, e)),
        }
    }

    fn fail(&self, state: &mut DaysState, op: &'static str, err: StoreError) -> StoreError {
        error!(error = %err, op, user_id = ?state.session, "day store operation failed");
        state.dispatch(DaysAction::Failed(err.to_string()));
        err
    }
}

fn session(state: &DaysState) -> Result<Uuid, StoreError> {
    state.session.ok_or(StoreError::NotAuthenticated)
}
