use serde::de::DeserializeOwned;
use serde_json::Value;
use zendo_core::model::Task;
use zendo_core::services::ServiceError;
use zendo_core::store::StoreError;

pub fn parse_args<T: DeserializeOwned>(args: Value) -> pmcp::Result<T> {
    serde_json::from_value(args).map_err(validation_error)
}

pub fn validation_error(err: impl std::fmt::Display) -> pmcp::Error {
    pmcp::Error::validation(err.to_string())
}

pub fn internal_error(err: impl Into<anyhow::Error>) -> pmcp::Error {
    pmcp::Error::internal(format!("{:#}", err.into()))
}

/// Caller mistakes become validation errors; everything else is internal.
pub fn service_error(err: ServiceError) -> pmcp::Error {
    let caller_fault = match &err {
        ServiceError::NotSignedIn | ServiceError::Invalid(_) => true,
        ServiceError::Repository(repo) => {
            matches!(repo.store_error(), Some(StoreError::NotFound(_)))
                || repo.store_error().is_none()
        }
        ServiceError::Queue(_) => false,
    };
    if caller_fault {
        pmcp::Error::validation(format!("{:#}", anyhow::Error::from(err)))
    } else {
        internal_error(err)
    }
}

/// Unwraps a query result that is `None` when no user is configured.
pub fn signed_in(tasks: Option<Vec<Task>>) -> pmcp::Result<Vec<Task>> {
    tasks.ok_or_else(|| service_error(ServiceError::NotSignedIn))
}

#[cfg(test)]
pub(crate) async fn test_app_with(
    llm: zendo_core::config::LlmSettings,
) -> (std::sync::Arc<zendo_core::App>, tempfile::TempDir) {
    use std::sync::Arc;
    use zendo_core::config::AppConfig;
    use zendo_core::notify::RecordingNotifier;

    let dir = tempfile::TempDir::new().expect("temp dir");
    let config = AppConfig::from_data_dir(dir.path().to_path_buf())
        .expect("config")
        .with_user(Some("tester".into()))
        .with_llm(llm);
    let app = zendo_core::App::open(config, Arc::new(RecordingNotifier::new()))
        .await
        .expect("app");
    (Arc::new(app), dir)
}

#[cfg(test)]
pub(crate) async fn test_app() -> (std::sync::Arc<zendo_core::App>, tempfile::TempDir) {
    test_app_with(zendo_core::config::LlmSettings {
        base_url: "http://127.0.0.1:9".into(),
        timeout: std::time::Duration::from_millis(200),
        ..Default::default()
    })
    .await
}

#[cfg(test)]
pub(crate) fn test_extra() -> pmcp::RequestHandlerExtra {
    pmcp::RequestHandlerExtra::new(
        "test-request".to_string(),
        tokio_util::sync::CancellationToken::new(),
    )
}
