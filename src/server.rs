use crate::service::FlightService;
use crate::types::{BoundingBox, PositionRecord};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

const MIN_LATITUDE: &str = "min_lat";
const MAX_LATITUDE: &str = "max_lat";
const MIN_LONGITUDE: &str = "min_lon";
const MAX_LONGITUDE: &str = "max_lon";

pub struct AppState {
    service: std::sync::Arc<FlightService>,
    index_path: std::path::PathBuf,
}

/// A bounding-box form field is missing or not a finite number.
#[derive(Debug, PartialEq)]
pub enum QueryRejection {
    Missing(&'static str),
    NotNumeric { field: &'static str, value: String },
}

impl std::fmt::Display for QueryRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryRejection::Missing(field) => write!(f, "Missing field '{field}'"),
            QueryRejection::NotNumeric { field, value } => {
                write!(f, "Field '{field}' is not a number: '{value}'")
            }
        }
    }
}

impl std::error::Error for QueryRejection {}

impl IntoResponse for QueryRejection {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

pub fn router(service: std::sync::Arc<FlightService>, index_path: std::path::PathBuf) -> Router {
    let state = std::sync::Arc::new(AppState {
        service,
        index_path,
    });
    Router::new()
        .route("/", get(index))
        .route("/get_flights", post(get_flights))
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn serve(address: std::net::SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    log::info!("Server: listening on http://{address}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Server: unable to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("Server: shutdown requested");
}

async fn index(State(state): State<std::sync::Arc<AppState>>) -> Result<Html<String>, StatusCode> {
    tokio::fs::read_to_string(&state.index_path)
        .await
        .map(Html)
        .map_err(|err| {
            log::warn!(
                "Server: cannot read index page '{}': {err}",
                state.index_path.display()
            );
            StatusCode::NOT_FOUND
        })
}

async fn get_flights(
    State(state): State<std::sync::Arc<AppState>>,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> Result<Json<Vec<PositionRecord>>, QueryRejection> {
    let bounding_box = parse_bounding_box(&form).map_err(|rejection| {
        log::debug!("Server: rejecting query: {rejection}");
        rejection
    })?;
    Ok(Json(state.service.query(&bounding_box)))
}

pub fn parse_bounding_box(
    form: &std::collections::HashMap<String, String>,
) -> Result<BoundingBox, QueryRejection> {
    Ok(BoundingBox::new(
        parse_bound(form, MIN_LATITUDE)?,
        parse_bound(form, MAX_LATITUDE)?,
        parse_bound(form, MIN_LONGITUDE)?,
        parse_bound(form, MAX_LONGITUDE)?,
    ))
}

fn parse_bound(
    form: &std::collections::HashMap<String, String>,
    field: &'static str,
) -> Result<f64, QueryRejection> {
    let value = form.get(field).ok_or(QueryRejection::Missing(field))?;
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|bound| bound.is_finite())
        .ok_or_else(|| QueryRejection::NotNumeric {
            field,
            value: value.clone(),
        })
}
