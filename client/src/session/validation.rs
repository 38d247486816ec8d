//! Entry checks run before any network call

use super::manager::SessionError;

pub const MIN_PASSWORD_LEN: usize = 6;

const MSG_MISSING_FIELDS: &str = "Please fill in all fields";
const MSG_PASSWORD_MISMATCH: &str = "Passwords do not match";
const MSG_PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters";
const MSG_TERMS: &str = "Please agree to the Terms of Service";

/// Trimmed sign-in credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Trimmed registration fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Registration form as captured by the sign-up screen
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Repeated password, when the screen asks for one
    pub confirm_password: Option<String>,
    pub accepted_terms: bool,
}

impl RegisterForm {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            confirm_password: None,
            accepted_terms: false,
        }
    }

    pub fn confirm_password(mut self, confirm: impl Into<String>) -> Self {
        self.confirm_password = Some(confirm.into());
        self
    }

    pub fn accept_terms(mut self) -> Self {
        self.accepted_terms = true;
        self
    }

    /// Full sign-up screen checks, in the order the user sees them
    pub fn validate(&self) -> Result<Registration, SessionError> {
        if is_blank(&self.name) || is_blank(&self.email) || is_blank(&self.password) {
            return Err(invalid(MSG_MISSING_FIELDS));
        }
        if let Some(confirm) = &self.confirm_password
            && confirm != &self.password
        {
            return Err(invalid(MSG_PASSWORD_MISMATCH));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(invalid(MSG_PASSWORD_TOO_SHORT));
        }
        if !self.accepted_terms {
            return Err(invalid(MSG_TERMS));
        }
        Ok(Registration {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<Credentials, SessionError> {
    if is_blank(email) || is_blank(password) {
        return Err(invalid(MSG_MISSING_FIELDS));
    }
    Ok(Credentials {
        email: email.trim().to_string(),
        password: password.to_string(),
    })
}

/// Field checks shared by every registration path (no terms or confirmation)
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
) -> Result<Registration, SessionError> {
    RegisterForm {
        name: name.to_string(),
        email: email.to_string(),
        password: password.to_string(),
        confirm_password: None,
        accepted_terms: true,
    }
    .validate()
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn invalid(message: &str) -> SessionError {
    SessionError::Validation(message.to_string())
}
