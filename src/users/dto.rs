use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, FieldErrors},
    validation::{is_valid_email, max_length_ok, optional_text, required_text, BLANK, REQUIRED},
};

use super::repo::{normalize_email, User, UserChanges};

pub const MIN_PASSWORD_LEN: usize = 5;
const MAX_LEN: usize = 255;

/// Body of `POST /user/create/` and `PUT`/`PATCH /user/me/`.
#[derive(Debug, Default, Deserialize)]
pub struct UserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Validated registration data.
#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl UserRequest {
    pub fn into_registration(self) -> Result<Registration, ApiError> {
        self.registration(true)
    }

    /// Same checks as [`Self::into_registration`] with the name optional, for
    /// accounts created from the command line.
    pub fn into_admin_registration(self) -> Result<Registration, ApiError> {
        self.registration(false)
    }

    fn registration(self, name_required: bool) -> Result<Registration, ApiError> {
        let mut errors = FieldErrors::new();
        let email = email_field(&mut errors, self.email.as_deref(), true);
        let password = password_field(&mut errors, self.password.as_deref(), true);
        let name = if name_required {
            required_text(&mut errors, "name", self.name.as_deref(), MAX_LEN)
        } else {
            optional_text(&mut errors, "name", self.name.as_deref(), MAX_LEN).or(Some(String::new()))
        };
        errors.into_result()?;
        match (email, password, name) {
            (Some(email), Some(password), Some(name)) => Ok(Registration {
                email,
                password,
                name,
            }),
            _ => Err(ApiError::BadRequest("invalid user payload".into())),
        }
    }

    /// `partial` is true for PATCH: absent fields stay untouched.
    pub fn into_changes(self, partial: bool) -> Result<UserChanges, ApiError> {
        let required = !partial;
        let mut errors = FieldErrors::new();
        let email = email_field(&mut errors, self.email.as_deref(), required);
        let password = password_field(&mut errors, self.password.as_deref(), required);
        let name = if required {
            required_text(&mut errors, "name", self.name.as_deref(), MAX_LEN)
        } else {
            optional_text(&mut errors, "name", self.name.as_deref(), MAX_LEN)
        };
        errors.into_result()?;
        Ok(UserChanges {
            email,
            name,
            password,
        })
    }
}

fn email_field(errors: &mut FieldErrors, value: Option<&str>, required: bool) -> Option<String> {
    let value = match value {
        None if required => {
            errors.add("email", REQUIRED);
            return None;
        }
        None => return None,
        Some(v) => v.trim(),
    };
    if value.is_empty() {
        errors.add("email", BLANK);
        return None;
    }
    if !is_valid_email(value) {
        errors.add("email", "Enter a valid email address.");
        return None;
    }
    if !max_length_ok(errors, "email", value, MAX_LEN) {
        return None;
    }
    Some(normalize_email(value))
}

fn password_field(errors: &mut FieldErrors, value: Option<&str>, required: bool) -> Option<String> {
    let value = match value {
        None if required => {
            errors.add("password", REQUIRED);
            return None;
        }
        None => return None,
        Some(v) => v,
    };
    if value.trim().is_empty() {
        errors.add("password", BLANK);
        return None;
    }
    if value.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
        );
        return None;
    }
    Some(value.to_string())
}

/// Body of `POST /user/token/`.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl TokenRequest {
    /// Shape checks only; credentials are checked against the database later.
    /// The password is taken verbatim, whitespace included.
    pub fn into_credentials(self) -> Result<(String, String), ApiError> {
        let mut errors = FieldErrors::new();
        let email = email_field(&mut errors, self.email.as_deref(), true);
        let password = match self.password {
            None => {
                errors.add("password", REQUIRED);
                None
            }
            Some(p) if p.is_empty() => {
                errors.add("password", BLANK);
                None
            }
            Some(p) => Some(p),
        };
        errors.into_result()?;
        match (email, password) {
            (Some(email), Some(password)) => Ok((email, password)),
            _ => Err(ApiError::BadRequest("invalid credentials payload".into())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UserResponse {
    pub email: String,
    pub name: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            name: user.name,
        }
    }
}
