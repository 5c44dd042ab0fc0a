//! Spec-extraction pipeline: create a scope from a specification upload.

use tracing::{info, instrument, warn};

use super::ai_client::AiClient;
use super::documents::{self, UploadedFile};
use super::store::ProjectStore;
use crate::domain::ai::AiExtractionResult;
use crate::domain::Scope;
use crate::error::ApiResult;

pub const NO_SPEC_PROVIDED: &str = "No specification file was provided for analysis.";
pub const NO_TEXT_EXTRACTED: &str = "Could not extract text from the provided specification.";

/// Add a scope to a project, extracting spec data from the upload when present.
///
/// The store lock is not held while the document is parsed or the AI service
/// is called.
#[instrument(skip(store, ai, spec), fields(spec_filename = spec.as_ref().map(|s| s.filename.as_str())))]
pub async fn add_scope(
    store: &ProjectStore,
    ai: &AiClient,
    project_id: &str,
    scope_of_work: &str,
    spec: Option<UploadedFile>,
) -> ApiResult<Scope> {
    // Fail fast before doing any expensive work
    store.get_project(project_id)?;

    let spec_filename = spec.as_ref().map(|s| s.filename.clone());
    let ai_summary = match &spec {
        None => AiExtractionResult::failure(NO_SPEC_PROVIDED),
        Some(upload) => summarize_spec(ai, upload).await,
    };

    let scope = Scope::new(scope_of_work.trim(), spec_filename, ai_summary);
    let created = scope.clone();
    store.update_project(project_id, move |project| {
        project.scopes.push(scope);
        Ok(())
    })?;

    info!(
        project_id = %project_id,
        scope_id = %created.scope_id,
        extracted = created.ai_summary.as_ref().is_some_and(AiExtractionResult::is_success),
        "Scope added"
    );
    Ok(created)
}

async fn summarize_spec(ai: &AiClient, upload: &UploadedFile) -> AiExtractionResult {
    let text = match documents::extract_text(upload).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, filename = %upload.filename, "Failed to read specification");
            return AiExtractionResult::failure(format!(
                "Failed to read the specification file: {}",
                e
            ));
        }
    };

    if text.trim().is_empty() {
        return AiExtractionResult::failure(NO_TEXT_EXTRACTED);
    }

    ai.extract_spec_data(&text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::services::ai_client::testing::{
        client, GatedTransport, Scripted, ScriptedTransport,
    };
    use crate::services::store::MemorySnapshot;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> ProjectStore {
        ProjectStore::open(Arc::new(MemorySnapshot::default()))
    }

    #[tokio::test]
    async fn extraction_result_is_stored_verbatim() {
        let store = store();
        let project = store.create_project("Acme Tower").unwrap();
        let payload = json!({
            "material_systems": [{
                "system_name": "Metal Roof Panels",
                "attributes": { "Material": "24 gauge steel" }
            }]
        });
        let transport = ScriptedTransport::new([Scripted::model_json(payload.clone())]);
        let (ai, _) = client(transport.clone());

        let scope = add_scope(
            &store,
            &ai,
            &project.id,
            "roofing",
            Some(UploadedFile::new("roof.txt", "SECTION 07 41 13 METAL ROOF PANELS")),
        )
        .await
        .unwrap();

        assert_eq!(serde_json::to_value(&scope.ai_summary).unwrap(), payload);
        assert!(scope.estimate_data.is_empty());
        assert!(scope.estimate_analysis.is_none());
        assert_eq!(scope.spec_filename.as_deref(), Some("roof.txt"));

        let stored = store.find_scope(&project.id, &scope.scope_id).unwrap();
        assert_eq!(stored, scope);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn whitespace_only_text_skips_the_ai_call() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let transport = ScriptedTransport::new([Scripted::model_json(json!({}))]);
        let (ai, _) = client(transport.clone());

        let scope = add_scope(
            &store,
            &ai,
            &project.id,
            "roofing",
            Some(UploadedFile::new("blank.txt", " \n\t ")),
        )
        .await
        .unwrap();

        assert_eq!(
            scope.ai_summary,
            Some(AiExtractionResult::failure(NO_TEXT_EXTRACTED))
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn unreadable_document_becomes_failure_marker() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let transport = ScriptedTransport::new(Vec::<Scripted>::new());
        let (ai, _) = client(transport.clone());

        let scope = add_scope(
            &store,
            &ai,
            &project.id,
            "roofing",
            Some(UploadedFile::new("spec.pdf", b"%PDF-broken".to_vec())),
        )
        .await
        .unwrap();

        match scope.ai_summary {
            Some(AiExtractionResult::Failure { error }) => {
                assert!(error.starts_with("Failed to read the specification file"))
            }
            other => panic!("expected failure marker, got {other:?}"),
        }
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn missing_spec_is_recorded() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let (ai, _) = client(ScriptedTransport::new(Vec::<Scripted>::new()));

        let scope = add_scope(&store, &ai, &project.id, "  sitework ", None)
            .await
            .unwrap();

        assert_eq!(scope.scope_of_work, "sitework");
        assert_eq!(scope.spec_filename, None);
        assert_eq!(
            scope.ai_summary,
            Some(AiExtractionResult::failure(NO_SPEC_PROVIDED))
        );
    }

    #[tokio::test]
    async fn ai_outage_still_creates_the_scope() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let transport = ScriptedTransport::new([Scripted::status(503)]);
        let (ai, _) = client(transport.clone());

        let scope = add_scope(
            &store,
            &ai,
            &project.id,
            "roofing",
            Some(UploadedFile::new("spec.txt", "text")),
        )
        .await
        .unwrap();

        assert!(matches!(
            scope.ai_summary,
            Some(AiExtractionResult::Failure { .. })
        ));
        assert_eq!(transport.calls(), 3);
        assert_eq!(store.get_project(&project.id).unwrap().scopes.len(), 1);
    }

    #[tokio::test]
    async fn project_deleted_during_extraction_is_not_found() {
        let store = store();
        let project = store.create_project("P").unwrap();
        let keeper = store.create_project("Other").unwrap();
        let transport = GatedTransport::new(Scripted::model_json(json!({
            "material_systems": []
        })));
        let (ai, _) = client(transport.clone());

        let spec = UploadedFile::new("spec.txt", "SECTION 07 62 00 SHEET METAL");
        let (result, ()) = tokio::join!(
            add_scope(&store, &ai, &project.id, "flashing", Some(spec)),
            async {
                transport.entered.notified().await;
                assert_eq!(store.list_projects().len(), 2);
                store.delete_project(&project.id).unwrap();
                transport.release.notify_one();
            }
        );

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(store.list_projects(), vec![keeper.summary()]);
    }

    #[tokio::test]
    async fn unknown_project_fails_before_any_work() {
        let store = store();
        let transport = ScriptedTransport::new(Vec::<Scripted>::new());
        let (ai, _) = client(transport.clone());

        let result = add_scope(
            &store,
            &ai,
            "missing",
            "roofing",
            Some(UploadedFile::new("spec.txt", "text")),
        )
        .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(transport.calls(), 0);
    }
}
