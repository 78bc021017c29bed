//! Input validation performed before any network call.

use crate::entities::profile::Avatar;
use crate::error::AppError;
use crate::utils::room_code::{is_valid_room_code, normalize_room_code};

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;
pub const NAME_MAX: usize = 50;
pub const AGE_MIN: i32 = 13;
pub const AGE_MAX: i32 = 100;
pub const PASSWORD_MIN: usize = 6;
pub const ROOM_NAME_MAX: usize = 50;
pub const MIN_PLAYERS: i32 = 3;
pub const MAX_PLAYERS: i32 = 20;
pub const DEFAULT_MAX_PLAYERS: i32 = 8;
pub const MESSAGE_MAX: usize = 500;
pub const OTP_LENGTH: usize = 6;

fn invalid<T>(message: &str) -> Result<T, AppError> {
    Err(AppError::Validation(message.to_string()))
}

/// Validate email format (one `@`, non-empty local part, dotted domain).
///
/// # Errors
///
/// Returns a validation error if the email is malformed.
pub fn validate_email(email: &str) -> Result<String, AppError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return invalid("Email is required");
    }
    let parts: Vec<&str> = trimmed.split('@').collect();
    if parts.len() != 2
        || parts[0].is_empty()
        || parts[1].is_empty()
        || !parts[1].contains('.')
        || trimmed.chars().any(char::is_whitespace)
    {
        return invalid("Invalid email format");
    }
    Ok(trimmed.to_string())
}

/// Validate a password and, on sign-up, its confirmation.
///
/// # Errors
///
/// Returns a validation error if the password is too short or the confirmation differs.
pub fn validate_password(password: &str, confirmation: Option<&str>) -> Result<(), AppError> {
    if password.is_empty() {
        return invalid("Password is required");
    }
    if confirmation.is_some_and(|c| c != password) {
        return invalid("Passwords do not match");
    }
    if password.chars().count() < PASSWORD_MIN {
        return invalid("Password must be at least 6 characters");
    }
    Ok(())
}

/// Validate and trim a username (3-20 characters).
///
/// # Errors
///
/// Returns a validation error if the username is empty or out of range.
pub fn validate_username(username: &str) -> Result<String, AppError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return invalid("Please enter a username");
    }
    let len = trimmed.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return invalid("Username must be between 3 and 20 characters");
    }
    Ok(trimmed.to_string())
}

/// Validate and trim a display name.
///
/// # Errors
///
/// Returns a validation error if the name is empty or too long.
pub fn validate_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return invalid("Please enter your name");
    }
    if trimmed.chars().count() > NAME_MAX {
        return invalid("Name must be at most 50 characters");
    }
    Ok(trimmed.to_string())
}

/// Parse and range-check an age (13-100).
///
/// # Errors
///
/// Returns a validation error if the age does not parse or is out of range.
pub fn validate_age(age: &str) -> Result<i32, AppError> {
    match age.trim().parse::<i32>() {
        Ok(n) if (AGE_MIN..=AGE_MAX).contains(&n) => Ok(n),
        _ => invalid("Please enter a valid age (13-100)"),
    }
}

/// Check that an avatar id is one of the known characters.
///
/// # Errors
///
/// Returns a validation error for unknown avatar ids.
pub fn validate_avatar(avatar: &str) -> Result<String, AppError> {
    Avatar::find(avatar.trim()).map_or_else(
        || invalid("Unknown avatar"),
        |a| Ok(a.id.to_string()),
    )
}

/// Normalize a phone number to E.164-ish form.
///
/// Non-digits are stripped. Numbers starting with `91` get a `+`; bare 10-digit numbers get `+91`.
#[must_use]
pub fn format_phone_number(phone: &str) -> String {
    let cleaned: String = phone.chars().filter(char::is_ascii_digit).collect();
    if cleaned.starts_with("91") {
        format!("+{cleaned}")
    } else if cleaned.len() == 10 {
        format!("+91{cleaned}")
    } else {
        format!("+{cleaned}")
    }
}

/// Validate and normalize a phone number.
///
/// # Errors
///
/// Returns a validation error if the phone number is empty or too short once formatted.
pub fn validate_phone(phone: &str) -> Result<String, AppError> {
    if phone.trim().is_empty() {
        return invalid("Please enter your phone number");
    }
    let formatted = format_phone_number(phone);
    if formatted.len() < 12 {
        return invalid("Please enter a valid phone number");
    }
    Ok(formatted)
}

/// Validate a one-time password (exactly 6 digits).
///
/// # Errors
///
/// Returns a validation error if the code is not 6 digits.
pub fn validate_otp(token: &str) -> Result<String, AppError> {
    let trimmed = token.trim();
    if trimmed.len() != OTP_LENGTH || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return invalid("Please enter the 6-digit OTP");
    }
    Ok(trimmed.to_string())
}

/// Validate and trim a room name.
///
/// # Errors
///
/// Returns a validation error if the name is empty or too long.
pub fn validate_room_name(name: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return invalid("Please enter a room name");
    }
    if trimmed.chars().count() > ROOM_NAME_MAX {
        return invalid("Room name must be at most 50 characters");
    }
    Ok(trimmed.to_string())
}

/// Range-check the seat count (3-20).
///
/// # Errors
///
/// Returns a validation error if the count is out of range.
pub fn validate_max_players(max_players: i32) -> Result<i32, AppError> {
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
        return invalid("Max players must be between 3 and 20");
    }
    Ok(max_players)
}

/// Normalize and check a join code.
///
/// # Errors
///
/// Returns a validation error if the code is empty or malformed.
pub fn validate_join_code(code: &str) -> Result<String, AppError> {
    let normalized = normalize_room_code(code);
    if normalized.is_empty() {
        return invalid("Please enter a room code");
    }
    if !is_valid_room_code(&normalized) {
        return invalid("Room codes are 6 letters or digits");
    }
    Ok(normalized)
}

/// Validate a chat line; returns it trimmed.
///
/// # Errors
///
/// Returns a validation error for blank or oversized messages.
pub fn validate_chat_message(text: &str) -> Result<String, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return invalid("Message cannot be empty");
    }
    if trimmed.chars().count() > MESSAGE_MAX {
        return invalid("Message must be at most 500 characters");
    }
    Ok(trimmed.to_string())
}
