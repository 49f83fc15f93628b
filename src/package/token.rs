// aegis-push/src/package/token.rs

//! Length-prefixed user tokens.
//!
//! Safari rejects `authenticationToken` values shorter than 16 characters, so
//! user ids are written as a 4-digit byte length, the id itself, then `0`
//! padding up to that minimum. Safari echoes the token back in the
//! `Authorization: ApplePushNotifications <token>` header.

pub const AUTHORIZATION_SCHEME: &str = "ApplePushNotifications";
pub const MIN_TOKEN_LENGTH: usize = 16;

/// Longest user id, in bytes, the 4-digit length prefix can describe.
pub const MAX_USER_ID_BYTES: usize = 9999;

const LENGTH_DIGITS: usize = 4;
const PADDING: char = '0';

/// `None` when `user_id` is longer than [`MAX_USER_ID_BYTES`].
pub fn encode_user_id(user_id: &str) -> Option<String> {
    if user_id.len() > MAX_USER_ID_BYTES {
        return None;
    }
    let mut token = format!("{:0width$}{user_id}", user_id.len(), width = LENGTH_DIGITS);
    while token.len() < MIN_TOKEN_LENGTH {
        token.push(PADDING);
    }
    Some(token)
}

/// Recovers the user id from a raw `Authorization` value or bare token.
///
/// Returns an empty string for anything that is not a well-formed token.
pub fn parse_user_id(authorization: &str) -> String {
    decode(authorization).unwrap_or_default()
}

fn decode(authorization: &str) -> Option<String> {
    let value = authorization.trim();
    let token = value
        .strip_prefix(AUTHORIZATION_SCHEME)
        .map(str::trim_start)
        .unwrap_or(value);

    let digits = token.get(..LENGTH_DIGITS)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let length: usize = digits.parse().ok()?;
    let rest = &token[LENGTH_DIGITS..];
    let user_id = rest.get(..length)?;
    let padding = &rest[length..];
    if padding.chars().any(|c| c != PADDING) {
        return None;
    }
    if LENGTH_DIGITS + length < MIN_TOKEN_LENGTH && token.len() != MIN_TOKEN_LENGTH {
        return None;
    }
    Some(user_id.to_string())
}
