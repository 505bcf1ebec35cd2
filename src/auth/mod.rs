pub mod claims;
pub mod jwt;
pub mod password;

pub use jwt::{AccessSubject, AuthUser, TokenIssuer};
pub use password::PasswordCodec;
