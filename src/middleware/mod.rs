mod admin_auth;

pub use admin_auth::{admin_auth, extract_bearer_token, is_admin};
