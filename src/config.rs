use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base URL that stored objects are publicly reachable under.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub chat: ChatConfig,
    pub recent_days: usize,
    pub merge_attempts: usize,
    pub session_idle_minutes: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "swole".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "swole-users".into()),
            ttl_minutes: env_parse("JWT_TTL_MINUTES").unwrap_or(60),
        };

        let endpoint = std::env::var("MINIO_ENDPOINT")?;
        let bucket = std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "images".into());
        let public_url = std::env::var("STORAGE_PUBLIC_URL").unwrap_or_else(|_| {
            format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
        });
        let storage = StorageConfig {
            access_key: std::env::var("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY")?,
            endpoint,
            bucket,
            public_url,
        };

        let analysis = AnalysisConfig {
            base_url: std::env::var("ANALYSIS_BASE_URL")
                .unwrap_or_else(|_| "https://open-ai-image-test.vercel.app".into()),
            timeout_secs: env_parse("ANALYSIS_TIMEOUT_SECS").unwrap_or(30),
        };

        let chat = ChatConfig {
            api_key: std::env::var("OPENAI_API_KEY")?,
            api_url: std::env::var("OPENAI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".into()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            analysis,
            chat,
            recent_days: env_parse("RECENT_DAYS").unwrap_or(3),
            merge_attempts: env_parse("MERGE_ATTEMPTS").unwrap_or(3),
            session_idle_minutes: env_parse("SESSION_IDLE_MINUTES").unwrap_or(30),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
