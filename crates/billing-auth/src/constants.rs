//! Backend auth endpoints and storage keys
//!
//! These values must match the billing backend exactly; they are part of the
//! wire contract, not configuration.

/// Exchange a refresh credential for a new access credential
pub const REFRESH_PATH: &str = "/api/auth/refresh/";

/// Username-or-email + password login, returns both credentials
pub const LOGIN_PATH: &str = "/api/auth/login/";

/// Blacklists the refresh credential server-side
pub const LOGOUT_PATH: &str = "/api/auth/logout/";

/// Storage key holding the access credential
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key holding the refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Authorization scheme prefix for authenticated requests
pub const BEARER_PREFIX: &str = "Bearer ";
