use crate::api::{ApiClient, LoginResponse};
use crate::error::ApiError;
use crate::session::{TokenStore, TOKEN_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginField {
    #[default]
    Email,
    Password,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(String),
    /// The server answered but refused; carries its message or "Unauthorized"
    Rejected(String),
    /// No usable answer at all
    Failed(String),
}

/// Map a `/login` result onto what the screen should do next.
pub fn interpret(result: Result<LoginResponse, ApiError>) -> LoginOutcome {
    match result {
        Ok(body) => match (body.status.as_deref(), body.token) {
            (Some("success"), Some(token)) if !token.is_empty() => LoginOutcome::Authenticated(token),
            _ => LoginOutcome::Rejected(
                body.message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Unauthorized".to_string()),
            ),
        },
        Err(e) if e.is_connection() => LoginOutcome::Failed(format!("Connection error: {}", e)),
        Err(e) => LoginOutcome::Failed(format!("Login failed: {}", e)),
    }
}

pub async fn attempt(api: &ApiClient, credentials: &Credentials) -> LoginOutcome {
    interpret(api.login(&credentials.email, &credentials.password).await)
}

#[derive(Debug, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub focus: LoginField,
    pub message: Option<String>,
    pub loading: bool,
}

impl LoginForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            LoginField::Email => &mut self.email,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            LoginField::Email => LoginField::Password,
            LoginField::Password => LoginField::Email,
        };
    }

    /// Start an attempt. Returns `None` while one is already outstanding.
    pub fn begin(&mut self) -> Option<Credentials> {
        if self.loading {
            return None;
        }
        self.loading = true;
        self.message = None;
        Some(Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }

    /// Apply the outcome of an attempt. Returns true when the session is now
    /// authenticated and the chat screen should be shown.
    pub fn finish(&mut self, outcome: LoginOutcome, tokens: &dyn TokenStore) -> bool {
        self.loading = false;
        match outcome {
            LoginOutcome::Authenticated(token) => match tokens.set(TOKEN_KEY, &token) {
                Ok(()) => {
                    tracing::info!("login succeeded, token stored");
                    self.password.clear();
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not persist token");
                    self.message = Some(format!("Could not save session: {}", e));
                    false
                }
            },
            LoginOutcome::Rejected(message) | LoginOutcome::Failed(message) => {
                tracing::info!(%message, "login refused");
                self.message = Some(message);
                false
            }
        }
    }
}
