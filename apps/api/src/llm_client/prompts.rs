// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting fragments.

/// Closing instruction that enforces JSON-only output.
pub const JSON_ONLY_INSTRUCTION: &str = "Return ONLY valid JSON. \
    No markdown, no code blocks, no additional text or explanations.";

/// Privacy rules appended to every prompt built from anonymized input.
pub const PRIVACY_INSTRUCTION: &str = "IMPORTANT:
- Do not request or store any personal information
- Focus only on career guidance and skill analysis
- Provide actionable, professional advice
- Return structured JSON response";
