use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use smartstate_core::Credentials;
use tracing::debug;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};
use crate::infra::scan::ScanSnapshot;

pub const SCAN_INITIATED_MESSAGE: &str = "Scan initiated.";
pub const NO_RESULTS_MESSAGE: &str = "No results available yet. The process may not have started or is still in progress.";

/// Body of `POST /init_scan`. Every field is required and must be non-empty.
#[derive(Debug, Default, Deserialize)]
pub struct StartScanRequest {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl StartScanRequest {
    pub fn into_credentials(self) -> Result<Credentials, AppError> {
        let missing: Vec<&str> = [
            ("server", &self.server),
            ("username", &self.username),
            ("password", &self.password),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
        .map(|(field, _)| field)
        .collect();

        match (self.server, self.username, self.password) {
            (Some(server), Some(username), Some(password)) if missing.is_empty() => {
                Ok(Credentials::new(server, username, password))
            }
            _ => Err(AppError::bad_request("Missing required fields.")
                .with_details(format!("missing or empty: {}", missing.join(", ")))),
        }
    }
}

/// `POST /init_scan`
///
/// The body is parsed as JSON regardless of the declared content type and
/// must be an object.
pub async fn start_scan_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let credentials = parse_start_request(&body)?.into_credentials()?;

    state.scan_control().start_scan(credentials).await?;

    Ok(Json(json!({
        "status": "success",
        "message": SCAN_INITIATED_MESSAGE,
    })))
}

fn parse_start_request(body: &[u8]) -> Result<StartScanRequest, AppError> {
    let invalid = |details: String| {
        debug!(%details, "rejecting malformed scan request");
        AppError::bad_request("Invalid JSON payload.").with_details(details)
    };

    let fields = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(invalid("expected a JSON object".to_string())),
        Err(err) => return Err(invalid(err.to_string())),
    };
    serde_json::from_value(Value::Object(fields)).map_err(|err| invalid(err.to_string()))
}

/// `GET /results`
pub async fn results_handler(State(state): State<AppState>) -> AppResult<Response> {
    match state.scan_control().latest_result().await? {
        Some(result) => Ok((StatusCode::OK, Json(result)).into_response()),
        None => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "unknown",
                "message": NO_RESULTS_MESSAGE,
            })),
        )
            .into_response()),
    }
}

/// `GET /scan/status`
pub async fn scan_status_handler(State(state): State<AppState>) -> Json<ScanSnapshot> {
    Json(state.scan_control().snapshot().await)
}
