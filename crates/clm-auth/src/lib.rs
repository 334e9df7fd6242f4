//! Session and credential lifecycle for the CLM backend
//!
//! Owns everything about "who is signed in": the token store holding the
//! access/refresh pair and cached profile, the session context that
//! publishes sign-in/sign-out/expiry events, and the refresh call that
//! exchanges a refresh token for a new access token.
//!
//! Credential flow:
//! 1. Client signs in; the backend answers with `AuthTokens`
//! 2. `Session::sign_in()` stores the pair and profile, publishes `SignedIn`
//! 3. Requests read the access token through `TokenStore`
//! 4. On 401 or near expiry, `token::refresh_access_token()` is called and
//!    `Session::refreshed()` stores the new pair
//! 5. If refresh is impossible, `Session::expire()` clears everything and
//!    publishes `Expired`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod session;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, FileTokenStore, MemoryTokenStore, TokenStore, UserProfile};
pub use error::{Error, Result};
pub use session::{Session, SessionEvent};
pub use token::{AuthTokens, access_token_expiry, expires_within, refresh_access_token, unix_now_secs};
