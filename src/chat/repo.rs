use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

impl Role {
    /// Role name understood by the completion endpoint.
    pub fn as_completion_role(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn insert(&self, user_id: Uuid, role: Role, content: &str) -> anyhow::Result<Message>;

    /// Last `limit` messages, oldest first.
    async fn recent(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Message>>;

    /// Newest first; `page` starts at 1.
    async fn page(&self, user_id: Uuid, page: i64, per_page: i64) -> anyhow::Result<Vec<Message>>;
}

#[derive(Clone)]
pub struct PgMessageRepo {
    db: PgPool,
}

impl PgMessageRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageRepo for PgMessageRepo {
    async fn insert(&self, user_id: Uuid, role: Role, content: &str) -> anyhow::Result<Message> {
        let msg = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (user_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, role, content, created_at
            "#,
        )
        .bind(user_id)
        .bind(role)
        .bind(content)
        .fetch_one(&self.db)
        .await
        .context("insert message")?;
        Ok(msg)
    }

    async fn recent(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Message>> {
        let mut rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, user_id, role, content, created_at
            FROM messages
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("select recent messages")?;
        rows.reverse();
        Ok(rows)
    }

    async fn page(&self, user_id: Uuid, page: i64, per_page: i64) -> anyhow::Result<Vec<Message>> {
        let offset = (page.max(1) - 1) * per_page;
        let rows = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, user_id, role, content, created_at
            FROM messages
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("select messages page")?;
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryMessageRepo {
        rows: Mutex<Vec<Message>>,
    }

    impl MemoryMessageRepo {
        pub fn all(&self) -> Vec<Message> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageRepo for MemoryMessageRepo {
        async fn insert(&self, user_id: Uuid, role: Role, content: &str) -> anyhow::Result<Message> {
            let mut rows = self.rows.lock().unwrap();
            // strictly increasing timestamps keep ordering deterministic
            let created_at = rows
                .last()
                .map(|m| m.created_at + time::Duration::milliseconds(1))
                .unwrap_or_else(OffsetDateTime::now_utc);
            let msg = Message {
                id: Uuid::new_v4(),
                user_id,
                role,
                content: content.to_string(),
                created_at,
            };
            rows.push(msg.clone());
            Ok(msg)
        }

        async fn recent(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Message>> {
            let rows = self.rows.lock().unwrap();
            let mine: Vec<Message> = rows.iter().filter(|m| m.user_id == user_id).cloned().collect();
            let skip = mine.len().saturating_sub(limit.max(0) as usize);
            Ok(mine.into_iter().skip(skip).collect())
        }

        async fn page(&self, user_id: Uuid, page: i64, per_page: i64) -> anyhow::Result<Vec<Message>> {
            let rows = self.rows.lock().unwrap();
            let offset = ((page.max(1) - 1) * per_page).max(0) as usize;
            Ok(rows
                .iter()
                .rev()
                .filter(|m| m.user_id == user_id)
                .skip(offset)
                .take(per_page.max(0) as usize)
                .cloned()
                .collect())
        }
    }

    mod tests {
        use super::*;

        #[tokio::test]
        async fn pages_newest_first_per_user() {
            let repo = MemoryMessageRepo::default();
            let me = Uuid::new_v4();
            for i in 0..5 {
                repo.insert(me, Role::User, &format!("m{i}")).await.unwrap();
            }
            repo.insert(Uuid::new_v4(), Role::User, "other").await.unwrap();

            let first = repo.page(me, 1, 2).await.unwrap();
            assert_eq!(first.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["m4", "m3"]);
            let last = repo.page(me, 3, 2).await.unwrap();
            assert_eq!(last.len(), 1);
            assert_eq!(last[0].content, "m0");

            let recent = repo.recent(me, 2).await.unwrap();
            assert_eq!(recent.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), ["m3", "m4"]);
        }
    }
}
