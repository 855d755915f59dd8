pub mod auth;
pub mod cache;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod pagination;
pub mod routes;
pub mod state;
pub mod threads;
pub mod throttle;
pub mod tokens;
pub mod unread;
pub mod users;

pub use error::ApiError;
pub use routes::router;
pub use state::{ApiSettings, AppState, AppStateInner};
