use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use super::dto::{DayView, NavigateRequest, OpenDayRequest, RecentDaysResponse, ScanUrlResponse};
use super::model::{Progress, ScanType};
use crate::{
    auth::jwt::AuthUser, error::StoreError, images::services::DEFAULT_CONTENT_TYPE,
    state::AppState,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

const PRESIGN_SECS: u64 = 3600;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/days/current", get(current_day))
        .route("/days/current/scans/:scan_type/url", get(scan_url))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/days/open", post(open_day))
        .route("/days/refresh", post(refresh_day))
        .route("/days/navigate", post(navigate))
        .route("/days/prefetch", post(prefetch))
        .route("/days/current/progress", patch(merge_progress))
        .route(
            "/days/current/scans/:scan_type",
            post(upload_scan).delete(remove_scan),
        )
        .route("/days/current/scans/:scan_type/analyze", post(analyze_scan))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

fn today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

fn parse_scan_type(raw: &str) -> Result<ScanType, StoreError> {
    let ok = !raw.is_empty()
        && raw.len() <= 32
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !ok {
        return Err(StoreError::InvalidInput(format!("invalid scan type: {raw}")));
    }
    Ok(ScanType::from(raw))
}

#[instrument(skip(state))]
pub async fn current_day(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<DayView> {
    let days = state.sessions.for_user(user_id);
    let view = days.lock().await;
    Ok(Json(DayView::from(&*view)))
}

#[instrument(skip(state))]
pub async fn scan_url(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(scan_type): Path<String>,
) -> ApiResult<ScanUrlResponse> {
    let scan = parse_scan_type(&scan_type)?;
    let days = state.sessions.for_user(user_id);
    let view = days.lock().await;
    let url = state
        .days
        .presigned_scan_url(&view, &scan, PRESIGN_SECS)
        .await?;
    Ok(Json(ScanUrlResponse {
        url,
        expires_in: PRESIGN_SECS,
    }))
}

/// POST /days/open { date?: "YYYY-MM-DD" }, today when no date is given.
#[instrument(skip(state, body))]
pub async fn open_day(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<OpenDayRequest>,
) -> ApiResult<DayView> {
    let date = body.date.unwrap_or_else(today);
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state.days.open_day(&mut view, date).await?;
    Ok(Json(DayView::from(&*view)))
}

#[instrument(skip(state))]
pub async fn refresh_day(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<DayView> {
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state.days.refresh_current(&mut view).await?;
    Ok(Json(DayView::from(&*view)))
}

#[instrument(skip(state))]
pub async fn navigate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<NavigateRequest>,
) -> ApiResult<DayView> {
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state.days.navigate(&mut view, body.direction).await?;
    Ok(Json(DayView::from(&*view)))
}

#[instrument(skip(state))]
pub async fn prefetch(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<RecentDaysResponse> {
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    let records = state.days.prefetch_recent(&mut view, today()).await?;
    Ok(Json(RecentDaysResponse { days: records }))
}

/// PATCH /days/current/progress { "<scanType>": AnalysisResult, ... }
#[instrument(skip(state, partial))]
pub async fn merge_progress(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(partial): Json<Progress>,
) -> ApiResult<DayView> {
    if partial.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "progress must be non-empty".into()));
    }
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state.days.merge_progress(&mut view, partial).await?;
    Ok(Json(DayView::from(&*view)))
}

/// POST /days/current/scans/:scan_type (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn upload_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(scan_type): Path<String>,
    mut mp: Multipart,
) -> ApiResult<DayView> {
    let scan = parse_scan_type(&scan_type)?;

    let mut upload = None;
    loop {
        let field = match mp.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return Err((StatusCode::BAD_REQUEST, e.to_string()));
            }
        };
        if !matches!(field.name(), Some("file" | "image")) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        upload = Some((data, content_type));
        break;
    }
    let Some((body, content_type)) = upload else {
        return Err((StatusCode::BAD_REQUEST, "file is required".into()));
    };

    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state
        .days
        .attach_scan_image(&mut view, scan, body, &content_type)
        .await?;
    Ok(Json(DayView::from(&*view)))
}

#[instrument(skip(state))]
pub async fn analyze_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(scan_type): Path<String>,
) -> ApiResult<DayView> {
    let scan = parse_scan_type(&scan_type)?;
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state.days.analyze_scan(&mut view, scan).await?;
    Ok(Json(DayView::from(&*view)))
}

#[instrument(skip(state))]
pub async fn remove_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(scan_type): Path<String>,
) -> ApiResult<DayView> {
    let scan = parse_scan_type(&scan_type)?;
    let days = state.sessions.for_user(user_id);
    let mut view = days.lock().await;
    state.days.remove_scan(&mut view, scan).await?;
    Ok(Json(DayView::from(&*view)))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::app::build_app;

    fn bearer(state: &AppState, user: Uuid) -> String {
        let keys = crate::auth::jwt::JwtKeys::from_config(&state.config.jwt);
        format!("Bearer {}", keys.sign_access(user).unwrap())
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
        (status, body)
    }

    fn json_req(method: &str, uri: &str, auth: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn scan_type_validation() {
        assert_eq!(parse_scan_type("back").unwrap(), ScanType::Back);
        assert_eq!(parse_scan_type("arms").unwrap(), ScanType::Other("arms".into()));
        assert!(parse_scan_type("../etc").is_err());
        assert!(parse_scan_type("").is_err());
    }

    #[tokio::test]
    async fn rejects_missing_token() {
        let state = AppState::fake();
        let req = Request::builder()
            .uri("/api/v1/days/current")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn open_merge_and_navigate_over_http() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());

        let (status, body) = send(
            &state,
            json_req("POST", "/api/v1/days/open", &auth, json!({ "date": "2024-06-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["currentDate"], "2024-06-01");
        assert_eq!(body["status"], "loaded");
        let day_id = body["day"]["id"].clone();

        let (status, body) = send(
            &state,
            json_req(
                "PATCH",
                "/api/v1/days/current/progress",
                &auth,
                json!({ "back": { "generalScore": 61 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["day"]["progress"]["back"]["generalScore"], 61.0);

        let (_, body) = send(
            &state,
            json_req("POST", "/api/v1/days/navigate", &auth, json!({ "direction": "prev" })),
        )
        .await;
        assert_eq!(body["currentDate"], "2024-05-31");
        assert_eq!(body["hasNextDay"], true);

        let (_, body) = send(
            &state,
            json_req("POST", "/api/v1/days/navigate", &auth, json!({ "direction": "next" })),
        )
        .await;
        assert_eq!(body["currentDate"], "2024-06-01");
        assert_eq!(body["day"]["id"], day_id);
    }

    #[tokio::test]
    async fn open_rejects_malformed_date_and_defaults_to_today() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());

        let (status, _) = send(
            &state,
            json_req("POST", "/api/v1/days/open", &auth, json!({ "date": "06/01/2024" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &state,
            json_req("POST", "/api/v1/days/open", &auth, json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["currentDate"], today().to_string());
        assert_eq!(body["status"], "loaded");
    }

    #[tokio::test]
    async fn merge_before_open_is_conflict_and_sticks_in_view() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let (status, _) = send(
            &state,
            json_req(
                "PATCH",
                "/api/v1/days/current/progress",
                &auth,
                json!({ "legs": { "generalScore": 1 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let req = Request::builder()
            .uri("/api/v1/days/current")
            .header(header::AUTHORIZATION, &auth)
            .body(Body::empty())
            .unwrap();
        let (_, body) = send(&state, req).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "No day loaded");
    }

    #[tokio::test]
    async fn multipart_upload_attaches_picture() {
        let state = AppState::fake();
        let auth = bearer(&state, Uuid::new_v4());
        let boundary = "XBOUNDARY";
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/days/current/scans/legs")
            .header(header::AUTHORIZATION, &auth)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .unwrap();
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let pic = body["day"]["picByType"]["legs"].as_str().unwrap();
        assert!(pic.starts_with("https://fake.local/"));
        assert!(pic.ends_with(".png"));
    }
}
