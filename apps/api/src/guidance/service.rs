//! Guidance Service: anonymize, bundle, one upstream call, extract, destroy.
//!
//! The bundle is destroyed on every exit path, including cancellation of the
//! returned future (a client hanging up mid-call).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::guidance::anonymizer::{anonymize, redact_structured_data};
use crate::guidance::bundle::{Bundle, BundlePayload};
use crate::guidance::extractor::{extract, ExtractedData};
use crate::guidance::prompts::build_prompt;
use crate::guidance::store::BundleStore;
use crate::llm_client::{CompletionProvider, LlmError};

#[derive(Debug, Error)]
pub enum GuidanceError {
    #[error("{0}")]
    Configuration(String),

    #[error("upstream call failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("bundle {0} was destroyed before it could be sent")]
    BundleUnavailable(Uuid),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceResult {
    /// Id of the bundle that carried the request. Already destroyed.
    pub id: Uuid,
    /// Raw model reply.
    pub response: String,
    pub extracted_data: ExtractedData,
    pub processed_at: DateTime<Utc>,
}

pub struct GuidanceService {
    store: Arc<BundleStore>,
    provider: Arc<dyn CompletionProvider>,
    api_key: Option<String>,
}

/// Destroys its bundle when dropped.
struct DestroyGuard<'a> {
    store: &'a BundleStore,
    id: Uuid,
}

impl Drop for DestroyGuard<'_> {
    fn drop(&mut self) {
        self.store.destroy(self.id);
    }
}

impl GuidanceService {
    pub fn new(
        store: Arc<BundleStore>,
        provider: Arc<dyn CompletionProvider>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            store,
            provider,
            api_key,
        }
    }

    /// Anonymizes the inputs, renders the prompt and registers the bundle.
    pub fn create_bundle(
        &self,
        resume_text: &str,
        assessment_data: Option<&Map<String, Value>>,
    ) -> Bundle {
        let anonymized_text = anonymize(resume_text);
        let structured_data = assessment_data.map(redact_structured_data);
        let prompt = build_prompt(&anonymized_text, structured_data.as_ref());

        self.store.create(BundlePayload::new(
            prompt,
            anonymized_text,
            structured_data,
            Utc::now(),
        ))
    }

    /// Runs one guidance request end to end.
    ///
    /// Only configuration and upstream failures are returned as errors; an
    /// unparseable reply still yields a result with empty collections.
    pub async fn run(
        &self,
        resume_text: &str,
        assessment_data: Option<&Map<String, Value>>,
    ) -> Result<GuidanceResult, GuidanceError> {
        let bundle = self.create_bundle(resume_text, assessment_data);
        let _guard = DestroyGuard {
            store: &self.store,
            id: bundle.id,
        };

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            GuidanceError::Configuration("DEEPSEEK_API_KEY is not configured".to_string())
        })?;

        let prompt = self.store.begin_use(bundle.id).map_err(|e| {
            warn!("Guidance bundle unusable: {e}");
            GuidanceError::BundleUnavailable(bundle.id)
        })?;

        let response = self
            .provider
            .complete(api_key, &prompt)
            .await
            .map_err(|e| {
                warn!("Guidance request {} failed upstream: {e}", bundle.id);
                GuidanceError::Upstream(e)
            })?;

        let extracted_data = extract(&response);
        info!(
            "Guidance bundle {} (request {}) completed: {} role(s), {} skill gap(s)",
            bundle.id,
            bundle.request_id(),
            extracted_data.recommended_roles.len(),
            extracted_data.skill_gaps.len()
        );

        Ok(GuidanceResult {
            id: bundle.id,
            response,
            extracted_data,
            processed_at: Utc::now(),
        })
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::testing::{StubProvider, StubReply};
    use super::*;
    use crate::guidance::clock::SystemClock;
    use crate::guidance::store::BundleStoreConfig;

    const RESUME: &str = "Contact Jane Doe at jane@example.com or 555-123-4567";

    const UPSTREAM_BODY: &str = r#"{"choices":[{"message":{"content":"{\"careerMap\":{},\"recommendedRoles\":[{\"title\":\"Engineer\",\"matchScore\":80,\"description\":\"fit\",\"skills\":[\"JS\"]}],\"skillGaps\":[],\"nextSteps\":[\"Update resume\"]}"}}]}"#;

    fn store() -> Arc<BundleStore> {
        Arc::new(
            BundleStore::new(
                BundleStoreConfig {
                    ttl: Duration::from_secs(300),
                    max_bundles: 100,
                },
                Arc::new(SystemClock),
            )
            .unwrap(),
        )
    }

    fn service(
        provider: Arc<StubProvider>,
        api_key: Option<&str>,
    ) -> (GuidanceService, Arc<BundleStore>) {
        let store = store();
        let service = GuidanceService::new(store.clone(), provider, api_key.map(str::to_string));
        (service, store)
    }

    #[tokio::test]
    async fn test_run_returns_extracted_roles_and_leaves_no_bundle() {
        let provider = Arc::new(StubProvider::new(StubReply::Body(UPSTREAM_BODY.to_string())));
        let (service, store) = service(provider.clone(), Some("sk-test"));

        let result = service.run(RESUME, None).await.unwrap();

        assert_eq!(result.extracted_data.recommended_roles[0].title, "Engineer");
        assert_eq!(result.extracted_data.recommended_roles[0].match_score, 80);
        assert_eq!(result.extracted_data.next_steps, vec!["Update resume".to_string()]);
        assert!(store.is_empty());
        assert!(!store.contains(result.id));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_upstream_sees_only_anonymized_text() {
        let provider = Arc::new(StubProvider::new(StubReply::Body(UPSTREAM_BODY.to_string())));
        let (service, _store) = service(provider.clone(), Some("sk-test"));

        service.run(RESUME, None).await.unwrap();

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[EMAIL_REDACTED]"));
        assert!(prompts[0].contains("[PHONE_REDACTED]"));
        assert!(!prompts[0].contains("jane@example.com"));
        assert!(!prompts[0].contains("555-123-4567"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_call() {
        let provider = Arc::new(StubProvider::replying("{}"));
        let (service, store) = service(provider.clone(), None);

        let err = service.run(RESUME, None).await.unwrap_err();

        assert!(matches!(err, GuidanceError::Configuration(_)));
        assert_eq!(provider.calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates_and_destroys_bundle() {
        let provider = Arc::new(StubProvider::new(StubReply::Status(503)));
        let (service, store) = service(provider.clone(), Some("sk-test"));

        let err = service.run(RESUME, None).await.unwrap_err();

        assert!(matches!(
            err,
            GuidanceError::Upstream(LlmError::Api { status: 503, .. })
        ));
        assert_eq!(provider.calls(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_reply_degrades_to_empty_result() {
        let provider = Arc::new(StubProvider::replying("Sorry, I can't help with that."));
        let (service, store) = service(provider, Some("sk-test"));

        let result = service.run(RESUME, None).await.unwrap();

        assert_eq!(result.response, "Sorry, I can't help with that.");
        assert_eq!(result.extracted_data, ExtractedData::default());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_still_destroys_bundle() {
        let provider = Arc::new(StubProvider::new(StubReply::Hang));
        let (service, store) = service(provider.clone(), Some("sk-test"));

        let outcome = tokio::time::timeout(Duration::from_secs(10), service.run(RESUME, None)).await;

        assert!(outcome.is_err());
        assert_eq!(provider.calls(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_use_independent_bundles() {
        let provider = Arc::new(StubProvider::new(StubReply::Body(UPSTREAM_BODY.to_string())));
        let (service, store) = service(provider.clone(), Some("sk-test"));

        let (a, b, c) = tokio::join!(
            service.run(RESUME, None),
            service.run("Second resume text", None),
            service.run("Third resume text", None),
        );
        let ids = [a.unwrap().id, b.unwrap().id, c.unwrap().id];

        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
        assert_eq!(provider.calls(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_bundle_redacts_assessment_and_resume() {
        let provider = Arc::new(StubProvider::replying("{}"));
        let (service, store) = service(provider, Some("sk-test"));
        let assessment = json!({
            "personalInfo": {"name": "Jane Doe", "email": "jane@example.com"},
            "coreSkills": ["JavaScript", "SQL"],
            "remotePreference": 90
        });

        let bundle = service.create_bundle(RESUME, assessment.as_object());
        let payload = bundle.payload();

        assert!(store.contains(bundle.id));
        assert!(!payload.context.anonymized_text.contains("jane@example.com"));
        let structured = payload.context.structured_data.unwrap();
        assert!(!structured.contains_key("personalInfo"));
        assert_eq!(structured["coreSkills"], json!(["JavaScript", "SQL"]));
        assert!(payload.prompt.contains("Core skills: JavaScript, SQL"));
        assert!(payload.prompt.contains("Remote preference: 90%"));
        assert!(!payload.prompt.contains("jane@example.com"));
        assert_eq!(payload.context.metadata.version, "1.0");
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = GuidanceResult {
            id: Uuid::new_v4(),
            response: "{}".into(),
            extracted_data: ExtractedData::default(),
            processed_at: Utc::now(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["extractedData"]["recommendedRoles"].is_array());
        assert!(json["processedAt"].is_string());
    }
}
