pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, Identity, Role};
pub use auth_service_impl::SeaOrmAuthService;

pub mod session;
pub use session::{IssuedSession, SessionClaims, SessionService};

pub mod gate;
pub use gate::Decision;
