use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::core::{
    FieldError, SimulationConfig, SimulationError, TargetGoal, compound_projection, run_simulation,
};

mod rate_limit;

use rate_limit::{RateLimiter, rate_limit_middleware};

const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:19006",
];

const DEFAULT_INFLATION: f64 = 0.02;
const DEFAULT_SALARY_GROWTH: f64 = 0.03;
const DEFAULT_N_PATHS: u32 = 10_000;

#[derive(Parser, Debug, Clone)]
#[command(name = "nestegg", about = "Monte Carlo retirement projection API")]
pub struct ServeConfig {
    #[arg(long, default_value_t = 8000)]
    pub port: u16,
    #[arg(
        long,
        default_value_t = 60,
        help = "Requests per minute allowed per client address"
    )]
    pub rate_limit: u32,
    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        help = "Origin allowed for cross-site requests; repeat for multiple, defaults to the local frontend ports"
    )]
    pub allow_origins: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MonteCarloPayload {
    current_age: Option<u32>,
    retire_age: Option<u32>,
    current_balance: Option<f64>,
    annual_contrib: Option<f64>,
    employer_match_rate: Option<f64>,
    expected_return: Option<f64>,
    return_volatility: Option<f64>,
    inflation: Option<f64>,
    salary_growth: Option<f64>,
    n_paths: Option<u32>,
    seed: Option<u64>,
    fees_annual: Option<f64>,
    glidepath: Option<bool>,
    rebalance_annually: Option<bool>,
    target_goal: Option<TargetGoalPayload>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(default)]
struct TargetGoalPayload {
    retirement_spend: Option<f64>,
    horizon_years: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionPayload {
    initial_balance: f64,
    annual_contribution: f64,
    years: u32,
    annual_return: f64,
    inflation: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    nominal_balances: Vec<f64>,
    real_balances: Vec<f64>,
}

fn config_from_payload(payload: MonteCarloPayload) -> Result<SimulationConfig, Vec<FieldError>> {
    fn required<T: Default>(
        value: Option<T>,
        field: &'static str,
        errors: &mut Vec<FieldError>,
    ) -> T {
        match value {
            Some(v) => v,
            None => {
                errors.push(FieldError {
                    field,
                    message: "field required".to_string(),
                });
                T::default()
            }
        }
    }

    let mut errors = Vec::new();
    let current_age = required(payload.current_age, "current_age", &mut errors);
    let retire_age = required(payload.retire_age, "retire_age", &mut errors);
    let current_balance = required(payload.current_balance, "current_balance", &mut errors);
    let annual_contrib = required(payload.annual_contrib, "annual_contrib", &mut errors);
    let expected_return = required(payload.expected_return, "expected_return", &mut errors);
    let return_volatility = required(payload.return_volatility, "return_volatility", &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }

    let config = SimulationConfig {
        current_age,
        retire_age,
        current_balance,
        annual_contrib,
        employer_match_rate: payload.employer_match_rate.unwrap_or(0.0),
        expected_return,
        return_volatility,
        inflation: payload.inflation.unwrap_or(DEFAULT_INFLATION),
        salary_growth: payload.salary_growth.unwrap_or(DEFAULT_SALARY_GROWTH),
        n_paths: payload.n_paths.unwrap_or(DEFAULT_N_PATHS),
        seed: payload.seed,
        fees_annual: payload.fees_annual.unwrap_or(0.0),
        glidepath: payload.glidepath.unwrap_or(false),
        rebalance_annually: payload.rebalance_annually.unwrap_or(true),
        target_goal: payload.target_goal.map(|goal| TargetGoal {
            retirement_spend: goal.retirement_spend,
            horizon_years: goal.horizon_years,
        }),
    };
    config.validate()?;
    Ok(config)
}

pub async fn run_http_server(config: ServeConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = build_router(&config);

    let listener = TcpListener::bind(addr).await?;
    info!("nestegg API listening on http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

fn build_router(config: &ServeConfig) -> Router {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(healthz_handler))
        .route("/monte-carlo", post(monte_carlo_handler))
        .route("/calculate", post(calculate_handler))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(build_cors(&config.allow_origins))
        .layer(TraceLayer::new_for_http())
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let configured: Vec<HeaderValue> = if origins.is_empty() {
        DEFAULT_ALLOWED_ORIGINS
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect()
    } else {
        origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect()
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(configured))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn root_handler() -> Response {
    json_response(
        StatusCode::OK,
        json!({ "message": "nestegg API is running" }),
    )
}

async fn healthz_handler() -> Response {
    json_response(StatusCode::OK, json!({ "ok": true }))
}

async fn monte_carlo_handler(Json(payload): Json<MonteCarloPayload>) -> Response {
    let config = match config_from_payload(payload) {
        Ok(config) => config,
        Err(errors) => return validation_error_response(&errors),
    };

    tracing::debug!(
        n_paths = config.n_paths,
        years = config.years(),
        "running simulation"
    );
    match run_simulation(&config) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(SimulationError::InvalidConfig(errors)) => validation_error_response(&errors),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn calculate_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    let projection = compound_projection(
        payload.initial_balance,
        payload.annual_contribution,
        payload.years,
        payload.annual_return,
        payload.inflation,
    );
    json_response(
        StatusCode::OK,
        ProjectionResponse {
            nominal_balances: projection.nominal,
            real_balances: projection.real,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

fn validation_error_response(errors: &[FieldError]) -> Response {
    json_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "detail": validation_detail(errors) }),
    )
}

fn validation_detail(errors: &[FieldError]) -> Value {
    Value::Array(
        errors
            .iter()
            .map(|e| {
                json!({
                    "loc": ["body", e.field],
                    "msg": e.message,
                    "type": "value_error",
                })
            })
            .collect(),
    )
}

fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(status, json!({ "detail": message }))
}
