//! Credential handling for the billing API client
//!
//! Owns the access/refresh credential pair and everything that touches it
//! directly: durable key/value storage, the process-wide `TokenStore`, the
//! wire contract of the login/refresh/logout endpoints, and the bearer
//! request stage. It has no knowledge of retry or refresh policy; that lives
//! in `billing-session`.
//!
//! Credential flow:
//! 1. `TokenStore::load()` reads `access_token` / `refresh_token` from `Storage`
//! 2. `exchange::login()` mints both credentials, stored via `set_session()`
//! 3. `BearerInterceptor` attaches the current access credential to requests
//! 4. `exchange::refresh_access()` mints a new access credential, stored via `set_access()`
//! 5. Logout or an irrecoverable refresh failure calls `TokenStore::clear()`

pub mod constants;
pub mod error;
pub mod exchange;
pub mod interceptor;
pub mod storage;
pub mod token_store;

pub use constants::*;
pub use error::{Error, Result};
pub use exchange::{LoginResponse, Profile, RefreshResponse, login, refresh_access};
pub use interceptor::{BearerInterceptor, bearer_token};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use token_store::{Session, TokenStore};
