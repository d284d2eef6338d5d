//! Prompt Builder: renders the fixed career-guidance instruction around
//! anonymized resume text and whitelisted assessment fields.

use serde_json::{Map, Value};

use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, PRIVACY_INSTRUCTION};

/// Resume text beyond this many characters is dropped before prompting.
pub const MAX_RESUME_CHARS: usize = 3000;

/// Neutral value used when a preference score is missing.
const DEFAULT_PREFERENCE: f64 = 50.0;

/// The only structured fields that may reach the prompt.
pub const ASSESSMENT_WHITELIST: [&str; 4] = [
    "coreSkills",
    "softSkills",
    "remotePreference",
    "startupPreference",
];

/// Guidance prompt template.
/// Replace: {privacy_instruction}, {resume_text}, {assessment_context},
///          {json_only_instruction}
pub const GUIDANCE_PROMPT_TEMPLATE: &str = r#"You are an expert career advisor providing guidance based on anonymized resume data.

ANONYMIZED RESUME:
{resume_text}
{assessment_context}

{privacy_instruction}

Return a JSON object with this exact structure (no markdown, no code blocks):
{
  "careerMap": {
    "shortTerm": [<3-4 actionable steps for next 0-6 months>],
    "midTerm": [<3-4 goals for 6-18 months>],
    "longTerm": [<2-3 career aspirations for 2+ years>]
  },
  "recommendedRoles": [
    {
      "title": "<job title>",
      "matchScore": <0-100>,
      "description": "<brief why this fits>",
      "skills": [<key skills for this role>]
    }
  ],
  "skillGaps": [<missing skills to develop>],
  "nextSteps": [<3-5 immediate actionable next steps>]
}

{json_only_instruction}"#;

/// Renders the guidance prompt. `anonymized_text` must already be scrubbed;
/// only whitelisted fields of `structured_data` are read.
pub fn build_prompt(anonymized_text: &str, structured_data: Option<&Map<String, Value>>) -> String {
    let assessment_context = structured_data
        .map(render_assessment_context)
        .unwrap_or_default();

    GUIDANCE_PROMPT_TEMPLATE
        .replace("{privacy_instruction}", PRIVACY_INSTRUCTION)
        .replace("{json_only_instruction}", JSON_ONLY_INSTRUCTION)
        .replace("{assessment_context}", &assessment_context)
        .replace("{resume_text}", truncate_chars(anonymized_text, MAX_RESUME_CHARS))
}

/// One-line summary of the whitelisted assessment fields.
fn render_assessment_context(data: &Map<String, Value>) -> String {
    format!(
        "Assessment: Core skills: {}, Soft skills: {}, Remote preference: {}%, Startup preference: {}%",
        join_skills(data.get(ASSESSMENT_WHITELIST[0])),
        join_skills(data.get(ASSESSMENT_WHITELIST[1])),
        preference(data.get(ASSESSMENT_WHITELIST[2])),
        preference(data.get(ASSESSMENT_WHITELIST[3])),
    )
}

fn join_skills(value: Option<&Value>) -> String {
    let skills: Vec<&str> = value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if skills.is_empty() {
        "N/A".to_string()
    } else {
        skills.join(", ")
    }
}

fn preference(value: Option<&Value>) -> u8 {
    let score = value.and_then(Value::as_f64).unwrap_or(DEFAULT_PREFERENCE);
    score.clamp(0.0, 100.0).round() as u8
}

/// Cuts `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_embeds_resume_and_schema() {
        let prompt = build_prompt("Rust engineer with 5 years of experience", None);
        assert!(prompt.contains("ANONYMIZED RESUME:\nRust engineer with 5 years of experience"));
        assert!(prompt.contains("\"recommendedRoles\""));
        assert!(prompt.contains("\"careerMap\""));
        assert!(prompt.contains("\"skillGaps\""));
        assert!(prompt.contains("\"nextSteps\""));
        assert!(prompt.ends_with(JSON_ONLY_INSTRUCTION));
        assert!(!prompt.contains("Assessment:"));
    }

    #[test]
    fn test_no_placeholders_survive() {
        let data = json!({"coreSkills": ["Rust"]});
        let prompt = build_prompt("text", data.as_object());
        for placeholder in [
            "{privacy_instruction}",
            "{resume_text}",
            "{assessment_context}",
            "{json_only_instruction}",
        ] {
            assert!(!prompt.contains(placeholder), "{placeholder} left in prompt");
        }
    }

    #[test]
    fn test_resume_truncated_to_limit() {
        let long = "a".repeat(MAX_RESUME_CHARS + 500);
        let prompt = build_prompt(&long, None);
        assert!(prompt.contains(&"a".repeat(MAX_RESUME_CHARS)));
        assert!(!prompt.contains(&"a".repeat(MAX_RESUME_CHARS + 1)));
    }

    #[test]
    fn test_truncate_chars_respects_multibyte_boundaries() {
        let text = "é".repeat(10);
        assert_eq!(truncate_chars(&text, 3), "ééé");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_assessment_summary_renders_whitelisted_fields() {
        let data = json!({
            "coreSkills": ["Rust", "SQL"],
            "softSkills": ["Mentoring"],
            "remotePreference": 80,
            "startupPreference": 35.4
        });
        let prompt = build_prompt("resume", data.as_object());
        assert!(prompt.contains(
            "Assessment: Core skills: Rust, SQL, Soft skills: Mentoring, Remote preference: 80%, Startup preference: 35%"
        ));
    }

    #[test]
    fn test_assessment_defaults_for_missing_fields() {
        let data = json!({});
        let prompt = build_prompt("resume", data.as_object());
        assert!(prompt.contains(
            "Assessment: Core skills: N/A, Soft skills: N/A, Remote preference: 50%, Startup preference: 50%"
        ));
    }

    #[test]
    fn test_preference_clamped() {
        assert_eq!(preference(Some(&json!(140))), 100);
        assert_eq!(preference(Some(&json!(-3))), 0);
        assert_eq!(preference(Some(&json!(0))), 0);
        assert_eq!(preference(Some(&json!("high"))), 50);
    }

    #[test]
    fn test_non_whitelisted_fields_never_reach_prompt() {
        let data = json!({
            "coreSkills": ["Rust"],
            "salaryExpectation": "SECRET-SALARY-190K",
            "employer": "SECRET-EMPLOYER",
            "personalInfo": {"name": "SECRET-NAME"}
        });
        let prompt = build_prompt("resume", data.as_object());
        assert!(!prompt.contains("SECRET"));
        assert!(prompt.contains("Core skills: Rust"));
    }
}
