pub mod session;
pub mod user;

pub use session::{NewSession, Session};
pub use user::{NewUser, User, UserInfo, DEFAULT_ROLE_ID};
