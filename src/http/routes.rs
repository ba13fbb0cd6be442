//! HTTP route definitions

use axum::{
    extract::{Extension, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::game::{
    ActiveRobot, GameError, GameState, HeightRange, PublicGameInfo, PublicRobot, RobotAction,
    Size, Tile,
};
use crate::http::middleware::{require_auth, AuthenticatedUser};
use crate::store::StoreError;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/game", get(game_info_handler))
        .route("/game/robots", get(robots_handler))
        .route("/game/map", get(known_map_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/robot", get(own_robot_handler))
        .route("/robot/register", post(register_handler))
        .route("/robot/action", post(action_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    game_state: GameState,
    active_robots: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        game_state: state.game.state().current_state(),
        active_robots: state.game.active_robots().len(),
    })
}

async fn game_info_handler(State(state): State<AppState>) -> Json<PublicGameInfo> {
    Json(state.game.public_game_info())
}

async fn robots_handler(State(state): State<AppState>) -> Json<Vec<PublicRobot>> {
    let robots = state
        .game
        .active_robots()
        .iter()
        .map(ActiveRobot::public)
        .collect();
    Json(robots)
}

#[derive(Serialize)]
struct KnownMapResponse {
    size: Size,
    height: Option<HeightRange>,
    tiles: Vec<Tile>,
}

async fn known_map_handler(State(state): State<AppState>) -> Json<KnownMapResponse> {
    Json(KnownMapResponse {
        size: state.game.public_game_info().map.map_size,
        height: state.game.map_height_metadata(),
        tiles: state.game.current_known_map(),
    })
}

async fn own_robot_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<ActiveRobot>, AppError> {
    state
        .game
        .active_robot_for_user(auth.user_id)
        .map(Json)
        .ok_or_else(|| no_active_robot().into())
}

#[derive(Serialize)]
struct RegisterResponse {
    registered: bool,
    robot: Option<ActiveRobot>,
}

async fn register_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<RegisterResponse>, AppError> {
    let info = state
        .stores
        .robots
        .robot_for_user(auth.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No robot found for user".to_string()))?;

    let robot = state.game.register_robot_for_next_game(info.id).await?;
    Ok(Json(RegisterResponse {
        registered: robot.is_some(),
        robot,
    }))
}

async fn action_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Json(action): Json<RobotAction>,
) -> Result<Json<ActiveRobot>, AppError> {
    if !state.action_limiter.check(auth.user_id) {
        warn!(user_id = %auth.user_id, "Rate limited action submission");
        return Err(AppError::RateLimited);
    }

    let robot = state
        .game
        .active_robot_for_user(auth.user_id)
        .ok_or_else(no_active_robot)?;

    debug!(user_id = %auth.user_id, robot_id = robot.id, action = %action, "Action submitted");
    state
        .game
        .next_action_for_robot(robot.id, action)?
        .map(Json)
        .ok_or_else(|| no_active_robot().into())
}

fn no_active_robot() -> GameError {
    GameError::RobotNotActive("Robot is not active in the current game".to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests")]
    RateLimited,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Game(e) => match e {
                // 425 Too Early: the game is not in the right phase yet
                GameError::GameState(_) => {
                    StatusCode::from_u16(425).unwrap_or(StatusCode::CONFLICT)
                }
                GameError::PositionOutOfMap(_) => StatusCode::NOT_ACCEPTABLE,
                GameError::PositionNotAllowed(_) => StatusCode::CONFLICT,
                GameError::InsufficientFuel(_) => StatusCode::RANGE_NOT_SATISFIABLE,
                GameError::WrongTileType(_) => StatusCode::METHOD_NOT_ALLOWED,
                GameError::ActionDeniedByConfig(_) => StatusCode::PRECONDITION_FAILED,
                GameError::RobotNotActive(_) => StatusCode::NOT_FOUND,
                GameError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Game(e) => e.code(),
            AppError::Store(_) => "store",
            AppError::NotFound(_) => "not_found",
            AppError::RateLimited => "rate_limited",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: GameError) -> u16 {
        AppError::from(error).into_response().status().as_u16()
    }

    #[test]
    fn game_errors_map_to_distinct_statuses() {
        let msg = || "x".to_string();
        assert_eq!(status_of(GameError::GameState(msg())), 425);
        assert_eq!(status_of(GameError::PositionOutOfMap(msg())), 406);
        assert_eq!(status_of(GameError::PositionNotAllowed(msg())), 409);
        assert_eq!(status_of(GameError::InsufficientFuel(msg())), 416);
        assert_eq!(status_of(GameError::WrongTileType(msg())), 405);
        assert_eq!(status_of(GameError::ActionDeniedByConfig(msg())), 412);
        assert_eq!(status_of(GameError::RobotNotActive(msg())), 404);
    }

    #[test]
    fn rate_limit_is_429() {
        assert_eq!(AppError::RateLimited.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
