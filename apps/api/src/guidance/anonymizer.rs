//! Anonymizer: pattern-based scrubbing of personal identifiers from free text.
//!
//! Best-effort only: each pass replaces matches with a fixed token and keeps
//! no mapping back to the original value.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

pub const EMAIL_TOKEN: &str = "[EMAIL_REDACTED]";
pub const PHONE_TOKEN: &str = "[PHONE_REDACTED]";
pub const ADDRESS_TOKEN: &str = "[ADDRESS_REDACTED]";
pub const NAME_TOKEN: &str = "[NAME_REDACTED]";
pub const URL_TOKEN: &str = "[URL_REDACTED]";
pub const SOCIAL_TOKEN: &str = "[SOCIAL_REDACTED]";

/// Key stripped from structured data wherever it appears.
pub const PERSONAL_INFO_KEY: &str = "personalInfo";

macro_rules! redaction_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

redaction_pattern!(
    RE_EMAIL,
    r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b"
);

// NNN-NNN-NNNN, NNN.NNN.NNNN, NNNNNNNNNN, (NNN) NNN-NNNN, optional +CC prefix
redaction_pattern!(
    RE_PHONE,
    r"(?:\+\d{1,3}[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s]?)\d{3}[-.\s]?\d{4}\b"
);

// number + street + street type ... , city 12345
redaction_pattern!(
    RE_ADDRESS,
    r"\d+\s+[^,\n]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd)[^,\n]*,\s*[^,\n]*\d{5}"
);

redaction_pattern!(
    RE_HONORIFIC_NAME,
    r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+[A-Z][a-z]+\s+[A-Z][a-z]+\b"
);

redaction_pattern!(RE_URL, r"https?://\S+");

redaction_pattern!(
    RE_SOCIAL,
    r"(?i)\b(?:www\.)?(?:linkedin\.com/in|github\.com)/[^\s/]+\S*"
);

struct Pass {
    regex: &'static LazyLock<Option<Regex>>,
    token: &'static str,
}

/// Applied in order. URLs and social paths go before addresses because the
/// address pattern stops at commas a URL may contain.
static PASSES: [Pass; 6] = [
    Pass { regex: &RE_EMAIL, token: EMAIL_TOKEN },
    Pass { regex: &RE_URL, token: URL_TOKEN },
    Pass { regex: &RE_SOCIAL, token: SOCIAL_TOKEN },
    Pass { regex: &RE_PHONE, token: PHONE_TOKEN },
    Pass { regex: &RE_ADDRESS, token: ADDRESS_TOKEN },
    Pass { regex: &RE_HONORIFIC_NAME, token: NAME_TOKEN },
];

/// Upper bound on full rounds of `PASSES`. Tokens never match a pattern, so
/// the output settles long before this.
const MAX_ROUNDS: usize = 4;

/// Scrubs emails, phone numbers, street addresses, honorific-prefixed names,
/// URLs and social-profile paths from `text`.
///
/// Rounds repeat until nothing changes, so `anonymize(anonymize(x))` equals
/// `anonymize(x)`.
pub fn anonymize(text: &str) -> String {
    let mut scrubbed = text.to_string();
    for _ in 0..MAX_ROUNDS {
        let mut changed = false;
        for pass in &PASSES {
            // A pattern that failed to compile produces no matches.
            if let Some(regex) = &**pass.regex {
                if let Cow::Owned(replaced) = regex.replace_all(&scrubbed, pass.token) {
                    scrubbed = replaced;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    scrubbed
}

/// Shallow-copies caller-supplied structured data, dropping every
/// `personalInfo` key at any depth and anonymizing every string leaf.
pub fn redact_structured_data(data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .filter(|(key, _)| key.as_str() != PERSONAL_INFO_KEY)
        .map(|(key, value)| (key.clone(), redact_value(value)))
        .collect()
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(anonymize(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(redact_structured_data(map)),
        other => other.clone(),
    }
}
