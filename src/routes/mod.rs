mod auth;
mod health_check;

pub use auth::{
    authenticate, provide, refresh, registrate, session, ACCESS_COOKIE, REFRESH_COOKIE,
};
pub use health_check::health_check;
