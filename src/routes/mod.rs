mod auth;
mod health_check;
mod protected;

pub use auth::{login, refresh, register, AuthResponse, CredentialsRequest};
pub use health_check::health_check;
pub use protected::{protected_resource, UserResponse};
