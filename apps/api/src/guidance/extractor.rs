//! Response Extractor: best-effort parsing of free-text model output into the
//! fixed four-key guidance shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// A role suggested by the model, normalised from loosely-typed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedRole {
    pub title: String,
    /// 0 – 100
    pub match_score: u8,
    pub description: String,
    pub skills: Vec<String>,
}

/// Structured guidance. Always fully populated; empty collections stand in
/// for anything the model did not provide.
///
/// Roles are lossy: only the four [`RecommendedRole`] fields survive, and
/// `matchScore` is rounded and clamped. The other three keys keep the parsed
/// values as they were.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    pub career_map: Map<String, Value>,
    pub recommended_roles: Vec<RecommendedRole>,
    pub skill_gaps: Vec<String>,
    pub next_steps: Vec<String>,
}

/// Outcome of parsing a reply. Keeps "parsed but empty" apart from "could not
/// parse" until the caller collapses it with [`Extraction::into_data`].
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Parsed(ExtractedData),
    ParseFailed(String),
}

impl Extraction {
    pub fn into_data(self) -> ExtractedData {
        match self {
            Extraction::Parsed(data) => data,
            Extraction::ParseFailed(reason) => {
                warn!("Failed to parse guidance response: {reason}");
                ExtractedData::default()
            }
        }
    }
}

/// Parses `raw` into the guidance shape. Never fails; see [`try_extract`] for
/// the tagged result.
pub fn extract(raw: &str) -> ExtractedData {
    try_extract(raw).into_data()
}

pub fn try_extract(raw: &str) -> Extraction {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let Some(object_text) = first_json_object(cleaned) else {
        return Extraction::ParseFailed("no JSON object found".to_string());
    };

    let parsed: Value = match serde_json::from_str(object_text) {
        Ok(value) => value,
        Err(e) => return Extraction::ParseFailed(format!("malformed JSON: {e}")),
    };

    let Value::Object(root) = parsed else {
        return Extraction::ParseFailed("top-level JSON is not an object".to_string());
    };

    Extraction::Parsed(ExtractedData {
        career_map: root
            .get("careerMap")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        recommended_roles: root
            .get("recommendedRoles")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(role_from_value).collect())
            .unwrap_or_default(),
        skill_gaps: string_list(root.get("skillGaps")),
        next_steps: string_list(root.get("nextSteps")),
    })
}

/// Returns the first balanced `{...}` in `text`, skipping braces that sit
/// inside JSON string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn role_from_value(value: &Value) -> Option<RecommendedRole> {
    let role = value.as_object()?;
    let title = role.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }

    Some(RecommendedRole {
        title: title.to_string(),
        match_score: role.get("matchScore").map(score_from_value).unwrap_or(0),
        description: role
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        skills: string_list(role.get("skills")),
    })
}

/// Accepts `85`, `85.4` or `"85"`; anything else scores 0.
fn score_from_value(value: &Value) -> u8 {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, 100.0).round() as u8)
        .unwrap_or(0)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
