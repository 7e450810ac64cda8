//! Profile slug parsing.
//!
//! Profile routes are addressed as `/@username`. The leading `@` is part of the
//! route contract: a slug without it, or with a username outside the allowed
//! alphabet, is rejected before any lookup runs.

use thiserror::Error;

const PROFILE_PREFIX: char = '@';
const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileSlugError {
    #[error("profile slug is missing")]
    Missing,
    #[error("profile slug `{slug}` must start with `@`")]
    MissingPrefix { slug: String },
    #[error("`{username}` is not a valid username")]
    InvalidUsername { username: String },
}

/// Extract the username from a `@username` route parameter.
pub fn parse_profile_slug(param: Option<&str>) -> Result<String, ProfileSlugError> {
    let slug = param.ok_or(ProfileSlugError::Missing)?;
    if slug.is_empty() {
        return Err(ProfileSlugError::Missing);
    }

    let username = slug
        .strip_prefix(PROFILE_PREFIX)
        .ok_or_else(|| ProfileSlugError::MissingPrefix {
            slug: slug.to_string(),
        })?;

    if !is_valid_username(username) {
        return Err(ProfileSlugError::InvalidUsername {
            username: username.to_string(),
        });
    }

    Ok(username.to_string())
}

/// Build the route slug for a username.
pub fn profile_slug(username: &str) -> String {
    format!("{PROFILE_PREFIX}{username}")
}

/// Usernames are ASCII letters, digits, `_` and `-`.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}
