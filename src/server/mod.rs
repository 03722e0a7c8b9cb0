pub mod dto;
mod internal;
pub mod response;
mod router;
mod user;

pub use internal::internal_router;
pub use router::{AppState, create_router};
pub use user::user_router;
