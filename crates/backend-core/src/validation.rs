use crate::error::ClientError;

/// Minimum accepted password length, matching the platform's own policy so
/// rejections happen before a round trip.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Inclusive review rating bounds.
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

/// Reject empty or whitespace-only chat input before it reaches the store.
pub fn validate_message_body(body: &str) -> Result<(), ClientError> {
    if body.trim().is_empty() {
        return Err(ClientError::validation(
            "empty_message",
            "message body must not be empty",
        ));
    }
    Ok(())
}

/// Check a new password and its confirmation repeat.
pub fn validate_new_password(new_password: &str, confirm: &str) -> Result<(), ClientError> {
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::validation(
            "password_too_short",
            format!("password must have at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if new_password != confirm {
        return Err(ClientError::validation(
            "password_mismatch",
            "password confirmation does not match",
        ));
    }
    Ok(())
}

/// Check the address a password-reset email is requested for.
pub fn validate_email(email: &str) -> Result<(), ClientError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ClientError::validation(
            "empty_email",
            "email must not be empty",
        ));
    }
    if !email.contains('@') {
        return Err(ClientError::validation(
            "invalid_email",
            "email is not a valid address",
        ));
    }
    Ok(())
}

/// Check the required fields of a new service request.
pub fn validate_request_fields(title: &str, description: &str) -> Result<(), ClientError> {
    if title.trim().is_empty() {
        return Err(ClientError::validation(
            "empty_request_title",
            "request title must not be empty",
        ));
    }
    if description.trim().is_empty() {
        return Err(ClientError::validation(
            "empty_request_description",
            "request description must not be empty",
        ));
    }
    Ok(())
}

/// Check an offer's quoted price.
pub fn validate_offer_price(price_czk: i64) -> Result<(), ClientError> {
    if price_czk <= 0 {
        return Err(ClientError::validation(
            "invalid_offer_price",
            "offer price must be a positive amount",
        ));
    }
    Ok(())
}

/// Check a review's star rating.
pub fn validate_rating(rating: u8) -> Result<(), ClientError> {
    if !RATING_RANGE.contains(&rating) {
        return Err(ClientError::validation(
            "invalid_rating",
            "rating must be between 1 and 5",
        ));
    }
    Ok(())
}
