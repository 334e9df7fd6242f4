//! Sign-in, sign-out and account recovery calls
//!
//! Every flow that answers with a token pair (login, registration, email
//! OTP verification, Google sign-in) stores the pair and profile through the
//! session and publishes `SignedIn`. These calls are anonymous: a 401 here
//! means bad credentials, not an expired session.

use clm_auth::{AuthTokens, UserProfile};
use common::Secret;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{ApiClient, RequestDescriptor};
use crate::envelope::ApiResponse;

pub(crate) const AUTH_PREFIX: &str = "/api/auth";

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    email: &'a str,
    password: &'a str,
    full_name: &'a str,
}

#[derive(Serialize)]
struct OtpBody<'a> {
    email: &'a str,
    otp: &'a str,
}

#[derive(Serialize)]
struct ResetBody<'a> {
    email: &'a str,
    otp: &'a str,
    password: &'a str,
}

impl ApiClient {
    pub async fn register(
        &self,
        email: &str,
        password: &Secret<String>,
        full_name: &str,
    ) -> ApiResponse<Value> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/register/"))
            .anonymous()
            .json(&RegisterBody {
                email,
                password: password.expose(),
                full_name,
            });
        let resp: ApiResponse<Value> = self.send(req).await;
        // Backends that verify email first answer without a token pair.
        let issued = resp
            .data
            .as_ref()
            .filter(|_| resp.success)
            .and_then(|data| serde_json::from_value::<AuthTokens>(data.clone()).ok());
        match issued {
            Some(tokens) => {
                self.establish(&tokens);
                info!("registered and signed in");
            }
            None => debug!(status = resp.status, "registration returned no token pair"),
        }
        resp
    }

    pub async fn login(&self, email: &str, password: &Secret<String>) -> ApiResponse<AuthTokens> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/login/"))
            .anonymous()
            .json(&LoginBody {
                email,
                password: password.expose(),
            });
        self.sign_in_with(req).await
    }

    /// Exchange a Google Identity credential (opaque ID token) for a session.
    pub async fn login_with_google(&self, credential: &str) -> ApiResponse<AuthTokens> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/google/"))
            .anonymous()
            .json(&serde_json::json!({ "credential": credential }));
        self.sign_in_with(req).await
    }

    /// Confirm the emailed one-time code. Completes registration and
    /// OTP-based login.
    pub async fn verify_email_otp(&self, email: &str, otp: &str) -> ApiResponse<AuthTokens> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/verify-email-otp/"))
            .anonymous()
            .json(&OtpBody { email, otp });
        self.sign_in_with(req).await
    }

    pub async fn resend_email_otp(&self, email: &str) -> ApiResponse<Value> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/resend-verification-otp/"))
            .anonymous()
            .json(&serde_json::json!({ "email": email }));
        self.send(req).await
    }

    /// Start password recovery; the backend emails a one-time code.
    pub async fn request_password_reset(&self, email: &str) -> ApiResponse<Value> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/forgot-password/"))
            .anonymous()
            .json(&serde_json::json!({ "email": email }));
        self.send(req).await
    }

    pub async fn verify_password_reset_otp(&self, email: &str, otp: &str) -> ApiResponse<Value> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/verify-password-reset-otp/"))
            .anonymous()
            .json(&OtpBody { email, otp });
        self.send(req).await
    }

    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &Secret<String>,
    ) -> ApiResponse<Value> {
        let req = RequestDescriptor::post(format!("{AUTH_PREFIX}/reset-password/"))
            .anonymous()
            .json(&ResetBody {
                email,
                otp,
                password: new_password.expose(),
            });
        self.send(req).await
    }

    /// Tell the backend, then drop local credentials whatever it answered.
    pub async fn logout(&self) -> ApiResponse<Value> {
        let resp = self
            .send(RequestDescriptor::post(format!("{AUTH_PREFIX}/logout/")).json(&serde_json::json!({})))
            .await;
        if !resp.success {
            debug!(status = resp.status, "logout call failed, clearing local session anyway");
        }
        self.end_session();
        resp
    }

    /// Fetch the signed-in profile and refresh the cached copy.
    pub async fn current_user(&self) -> ApiResponse<UserProfile> {
        let resp: ApiResponse<UserProfile> =
            self.send(RequestDescriptor::get(format!("{AUTH_PREFIX}/me/"))).await;
        if let Some(user) = &resp.data {
            self.session().store().set_user(user);
        }
        resp
    }

    async fn sign_in_with(&self, req: RequestDescriptor) -> ApiResponse<AuthTokens> {
        let resp: ApiResponse<AuthTokens> = self.send(req).await;
        if let (true, Some(tokens)) = (resp.success, &resp.data) {
            self.establish(tokens);
        }
        resp
    }
}
