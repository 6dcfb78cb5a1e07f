//! Request payload validation
//!
//! Mirrors what the mobile and web clients enforce, so a well-behaved client
//! never sees these errors. Rules are checked in declaration order and the
//! first failure wins.

use crate::api::error::ApiError;
use crate::api::{LoginRequest, RegisterRequest};

const USERNAME_MAX: usize = 30;
const FULL_NAME_MIN: usize = 2;
const FULL_NAME_MAX: usize = 100;
const DEPARTMENT_MAX: usize = 50;

pub fn validate_register(req: &RegisterRequest) -> Result<(), ApiError> {
    if req.username.is_empty() || req.username.len() > USERNAME_MAX {
        return Err(ApiError::Validation(format!(
            "username must be between 1 and {USERNAME_MAX} characters"
        )));
    }
    if !req.username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ApiError::Validation(
            "username may only contain letters, digits, underscores, and hyphens".to_string(),
        ));
    }
    if !is_valid_email(&req.email) {
        return Err(ApiError::Validation("email is not valid".to_string()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("password must not be empty".to_string()));
    }
    let name_len = req.full_name.chars().count();
    if name_len < FULL_NAME_MIN || name_len > FULL_NAME_MAX {
        return Err(ApiError::Validation(format!(
            "full name must be between {FULL_NAME_MIN} and {FULL_NAME_MAX} characters"
        )));
    }
    if let Some(dept) = &req.department {
        if dept.chars().count() > DEPARTMENT_MAX {
            return Err(ApiError::Validation(format!(
                "department must be at most {DEPARTMENT_MAX} characters"
            )));
        }
    }
    if let Some(phone) = &req.phone {
        if !is_valid_phone(phone) {
            return Err(ApiError::Validation("phone number is not valid".to_string()));
        }
    }
    Ok(())
}

pub fn validate_login(req: &LoginRequest) -> Result<(), ApiError> {
    if req.username.is_empty() {
        return Err(ApiError::Validation("username must not be empty".to_string()));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("password must not be empty".to_string()));
    }
    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    // Domain needs at least one dot with non-empty parts around it
    domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

fn is_valid_phone(phone: &str) -> bool {
    let digits = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect::<String>();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) && digits.len() >= 6
}
