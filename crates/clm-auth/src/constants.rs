//! Fixed names shared by the token store and the token endpoints
//!
//! The storage keys mirror the browser key space the web client persisted
//! to, so a session file written by one front end reads in another.

/// Storage key for the bearer access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key for the cached user profile (JSON object)
pub const USER_KEY: &str = "user";

/// Token refresh endpoint, relative to the backend origin
pub const REFRESH_PATH: &str = "/api/auth/token/refresh/";

/// Access tokens expiring within this many seconds are refreshed before use.
pub const REFRESH_THRESHOLD_SECS: u64 = 60;
