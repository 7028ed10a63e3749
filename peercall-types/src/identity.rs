/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Email address <-> peer identifier codec.
//!
//! Signaling services only accept identifiers made of letters, digits and
//! hyphens. `@` and `.` are escaped with multi-character markers so the
//! address can be recovered; anything else outside the alphabet is dropped.
//!
//! Dropping characters means `a+b@x.com` and `ab@x.com` share an identifier.
//! [`encode_peer_id`] keeps that behavior for compatibility with identifiers
//! already registered; [`encode_peer_id_strict`] refuses such addresses.

use crate::error::CallError;
use serde::{Deserialize, Serialize};

const AT_TOKEN: &str = "-at-";
const DOT_TOKEN: &str = "-dot-";

/// A signaling-safe identifier derived from an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps an identifier received from the signaling service.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The email address this identifier was derived from.
    pub fn to_email(&self) -> String {
        decode_peer_id(&self.0)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

pub fn encode_peer_id(email: &str) -> PeerId {
    let escaped = email
        .to_lowercase()
        .replace('@', AT_TOKEN)
        .replace('.', DOT_TOKEN);
    PeerId(escaped.chars().filter(|c| is_id_char(*c)).collect())
}

/// Like [`encode_peer_id`], but rejects addresses that would not survive a
/// round trip: any character the encoder would drop (including `_`), or
/// hyphen placements that decode into a different address.
pub fn encode_peer_id_strict(email: &str) -> Result<PeerId, CallError> {
    let lowered = email.to_lowercase();
    if let Some(bad) = lowered
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || "@.-".contains(*c)))
    {
        return Err(CallError::InvalidAddress(format!(
            "'{bad}' cannot be used in an address"
        )));
    }
    let id = encode_peer_id(&lowered);
    if id.to_email() != lowered {
        return Err(CallError::InvalidAddress(format!(
            "'{lowered}' is ambiguous next to the '{AT_TOKEN}' / '{DOT_TOKEN}' markers"
        )));
    }
    Ok(id)
}

pub fn decode_peer_id(id: &str) -> String {
    // "-at-" and "-dot-" cannot overlap, so this order is safe.
    id.replace(AT_TOKEN, "@").replace(DOT_TOKEN, ".")
}

/// Checks the `local@domain.tld` shape used by the sign-in form and returns
/// the trimmed, lower-cased address.
pub fn validate_email(input: &str) -> Result<String, CallError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CallError::InvalidAddress("Please enter your email".to_string()));
    }

    let invalid = || CallError::InvalidAddress("Please enter a valid email".to_string());
    if trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = trimmed.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    // There must be a dot with something on both sides of it.
    let has_tld = domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len());
    if !has_tld {
        return Err(invalid());
    }

    Ok(trimmed.to_lowercase())
}
