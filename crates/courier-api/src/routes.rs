use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::middleware::{log_requests, rate_limit, require_admin, require_auth, restrict_hours};
use crate::state::AppState;
use crate::{auth, conversations, messages, notifications, threads, unread, users};

/// Full API router. CORS and HTTP tracing are layered on by the server.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register/", post(auth::register))
        .route("/api/token/", post(auth::login))
        .route("/api/token/refresh/", post(auth::refresh))
        .route("/api/logout/", post(auth::logout));

    let protected_routes = Router::new()
        .route("/api/users/me/", get(users::me).delete(users::delete_me))
        .route(
            "/api/conversations/",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}/",
            get(conversations::get_conversation)
                .patch(conversations::update_conversation)
                .delete(conversations::delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages/",
            get(messages::list_conversation_messages).post(messages::create_conversation_message),
        )
        .route("/api/conversations/{id}/threaded/", get(threads::threaded_conversation))
        .route(
            "/api/messages/",
            get(messages::list_messages).post(messages::create_message),
        )
        .route("/api/messages/mark-read/", post(unread::mark_read))
        .route(
            "/api/messages/{id}/",
            get(messages::get_message)
                .patch(messages::update_message)
                .put(messages::update_message)
                .delete(messages::delete_message),
        )
        .route("/api/messages/{id}/edit/", post(messages::edit_message))
        .route("/api/messages/{id}/history/", get(messages::message_history))
        .route("/api/messages/{id}/reply/", post(messages::reply))
        .route("/api/messages/{id}/thread/", get(threads::message_thread))
        .route("/api/unread/", get(unread::inbox))
        .route("/api/unread/direct/", get(unread::direct))
        .route("/api/unread/conversation/{id}/", get(unread::in_conversation))
        .route("/api/unread/count/", get(unread::count))
        .route("/api/notifications/", get(notifications::list_notifications))
        .route("/api/notifications/read-all/", post(notifications::mark_all_read))
        .route("/api/notifications/{id}/read/", post(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Layers run bottom-up: auth first, then the admin check
    let admin_routes = Router::new()
        .route("/api/admin/users/", get(users::list_users))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), restrict_hours))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
