use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::Date;
use uuid::Uuid;

use super::model::{DayRecord, Progress, ScanType};

/// Row-level access to the `days` collection.
#[async_trait]
pub trait DayRepo: Send + Sync {
    async fn find(&self, user_id: Uuid, date: Date) -> anyhow::Result<Option<DayRecord>>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<DayRecord>>;
    async fn exists(&self, user_id: Uuid, date: Date) -> anyhow::Result<bool>;
    async fn list_for_dates(&self, user_id: Uuid, dates: &[Date]) -> anyhow::Result<Vec<DayRecord>>;

    /// Creates the (user, date) row, or returns the existing one.
    async fn insert(&self, user_id: Uuid, date: Date) -> anyhow::Result<DayRecord>;

    /// Writes progress and pictures if the stored revision still equals
    /// `record.revision`. `Ok(None)` means someone else wrote first.
    async fn update(&self, record: &DayRecord) -> anyhow::Result<Option<DayRecord>>;
}

#[derive(Debug, FromRow)]
struct DayRow {
    id: Uuid,
    user_id: Uuid,
    created_at: Date,
    progress_json: Json<Progress>,
    pic_fullbody: Option<String>,
    pic_back: Option<String>,
    pic_legs: Option<String>,
    pics_extra: Json<BTreeMap<String, String>>,
    revision: i64,
}

impl From<DayRow> for DayRecord {
    fn from(r: DayRow) -> Self {
        let mut pic_by_type = BTreeMap::new();
        for (scan, pic) in [
            (ScanType::Fullbody, r.pic_fullbody),
            (ScanType::Back, r.pic_back),
            (ScanType::Legs, r.pic_legs),
        ] {
            if let Some(url) = pic {
                pic_by_type.insert(scan, url);
            }
        }
        for (key, url) in r.pics_extra.0 {
            pic_by_type.insert(ScanType::from(key), url);
        }
        Self {
            id: r.id,
            user_id: r.user_id,
            created_at: r.created_at,
            progress: r.progress_json.0,
            pic_by_type,
            revision: r.revision,
        }
    }
}

const DAY_COLUMNS: &str =
    "id, user_id, created_at, progress_json, pic_fullbody, pic_back, pic_legs, pics_extra, revision";

#[derive(Clone)]
pub struct PgDayRepo {
    db: PgPool,
}

impl PgDayRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DayRepo for PgDayRepo {
    async fn find(&self, user_id: Uuid, date: Date) -> anyhow::Result<Option<DayRecord>> {
        let row = sqlx::query_as::<_, DayRow>(&format!(
            "SELECT {DAY_COLUMNS} FROM days WHERE user_id = $1 AND created_at = $2"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await
        .context("select day")?;
        Ok(row.map(DayRecord::from))
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<DayRecord>> {
        let row = sqlx::query_as::<_, DayRow>(&format!("SELECT {DAY_COLUMNS} FROM days WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select day by id")?;
        Ok(row.map(DayRecord::from))
    }

    async fn exists(&self, user_id: Uuid, date: Date) -> anyhow::Result<bool> {
        let (found,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM days WHERE user_id = $1 AND created_at = $2)
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.db)
        .await
        .context("check day exists")?;
        Ok(found)
    }

    async fn list_for_dates(&self, user_id: Uuid, dates: &[Date]) -> anyhow::Result<Vec<DayRecord>> {
        let rows = sqlx::query_as::<_, DayRow>(&format!(
            "SELECT {DAY_COLUMNS} FROM days
             WHERE user_id = $1 AND created_at = ANY($2)
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(dates.to_vec())
        .fetch_all(&self.db)
        .await
        .context("list days")?;
        Ok(rows.into_iter().map(DayRecord::from).collect())
    }

    async fn insert(&self, user_id: Uuid, date: Date) -> anyhow::Result<DayRecord> {
        // the no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, DayRow>(&format!(
            "INSERT INTO days (user_id, created_at)
             VALUES ($1, $2)
             ON CONFLICT (user_id, created_at) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING {DAY_COLUMNS}"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.db)
        .await
        .context("insert day")?;
        Ok(row.into())
    }

    async fn update(&self, record: &DayRecord) -> anyhow::Result<Option<DayRecord>> {
        let mut extra = BTreeMap::new();
        for (scan, url) in &record.pic_by_type {
            if let ScanType::Other(key) = scan {
                extra.insert(key.clone(), url.clone());
            }
        }
        let row = sqlx::query_as::<_, DayRow>(&format!(
            "UPDATE days
             SET progress_json = $3, pic_fullbody = $4, pic_back = $5, pic_legs = $6,
                 pics_extra = $7, revision = revision + 1
             WHERE id = $1 AND revision = $2
             RETURNING {DAY_COLUMNS}"
        ))
        .bind(record.id)
        .bind(record.revision)
        .bind(Json(&record.progress))
        .bind(record.pic(&ScanType::Fullbody))
        .bind(record.pic(&ScanType::Back))
        .bind(record.pic(&ScanType::Legs))
        .bind(Json(extra))
        .fetch_optional(&self.db)
        .await
        .context("update day")?;
        Ok(row.map(DayRecord::from))
    }
}
