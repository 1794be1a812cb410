use axum::{
    http::{header, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, middleware, state::AppState};

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/server-version", get(handlers::server::server_version))
        .route("/users/signup", post(handlers::users::signup))
        .route("/users/login", post(handlers::users::login))
        .route(
            "/users/password-reset",
            post(handlers::users::request_password_reset),
        )
        .route(
            "/users/password-reset/confirm",
            post(handlers::users::confirm_password_reset),
        )
        .route(
            "/family/join/{token}",
            get(handlers::families::preview_join),
        );

    let protected_routes = Router::new()
        .route("/users/me", get(handlers::users::me))
        .route(
            "/users/me/push-address",
            put(handlers::users::update_push_address),
        )
        .route("/family", post(handlers::families::create_family))
        .route("/family/{id}", get(handlers::families::get_family))
        .route("/family/{id}/invite", post(handlers::families::invite))
        .route("/family/{id}/leave", post(handlers::families::leave))
        .route("/family/join/{token}", post(handlers::families::join))
        .route(
            "/family/{id}/session",
            post(handlers::check_in::start_session)
                .put(handlers::check_in::update_session)
                .delete(handlers::check_in::end_session),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
                ),
        )
        .with_state(state)
}
