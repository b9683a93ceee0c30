use std::future::Future;

use axum::{
    extract::{Json, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    error::{AssistantError, SpeechRecognitionError},
    ingest::UploadedFile,
    models::SourceRef,
    session::{self, AnswerOutcome, PendingAction, SessionContext},
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

#[derive(Serialize)]
pub struct SessionView {
    session_id: String,
    started_at: DateTime<Utc>,
    manuals: Vec<String>,
    chunks: usize,
    question: Option<String>,
    pending: PendingAction,
    ready: bool,
    message: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    summary: String,
    session: SessionView,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>,
    sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<String>,
}

impl From<AnswerOutcome> for AnswerResponse {
    fn from(outcome: AnswerOutcome) -> Self {
        match outcome {
            AnswerOutcome::Answered(answer) => Self {
                outcome: "answered",
                answer: Some(answer.answer),
                sources: answer.sources,
                message: None,
                transcript: None,
            },
            AnswerOutcome::NeedsManuals => Self {
                outcome: "needs_manuals",
                answer: None,
                sources: Vec::new(),
                message: Some(
                    "Carga primero los manuales: sube un PDF desde la barra lateral.".to_string(),
                ),
                transcript: None,
            },
            AnswerOutcome::EmptyQuestion => Self {
                outcome: "empty_question",
                answer: None,
                sources: Vec::new(),
                message: Some("Escribe una pregunta antes de pulsar «Ask».".to_string()),
                transcript: None,
            },
            AnswerOutcome::NoOp => Self {
                outcome: "no_op",
                answer: None,
                sources: Vec::new(),
                message: Some("Primero formula una pregunta con «Ask».".to_string()),
                transcript: None,
            },
        }
    }
}

// --- Errores ---

#[derive(Debug)]
pub enum ApiError {
    UnknownSession(String),
    BadRequest(String),
    Assistant(AssistantError),
    Internal(String),
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        Self::Assistant(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, recoverable, message) = match self {
            Self::UnknownSession(id) => (
                StatusCode::NOT_FOUND,
                "unknown_session",
                false,
                format!("La sesión {id} no existe o ha caducado."),
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", false, msg),
            Self::Internal(msg) => {
                error!("Error interno: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", false, msg)
            }
            Self::Assistant(err) => (
                assistant_status(&err),
                err.kind(),
                err.is_recoverable(),
                err.to_string(),
            ),
        };

        (
            status,
            Json(json!({ "error": message, "kind": kind, "recoverable": recoverable })),
        )
            .into_response()
    }
}

fn assistant_status(err: &AssistantError) -> StatusCode {
    match err {
        AssistantError::DocumentLoad(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AssistantError::EmbeddingProvider(_) | AssistantError::ChatProvider(_) => {
            StatusCode::BAD_GATEWAY
        }
        AssistantError::SpeechRecognition(SpeechRecognitionError::Unintelligible(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AssistantError::SpeechRecognition(SpeechRecognitionError::ServiceUnavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AssistantError::InvalidIndex(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/:id/manuals", post(upload_handler))
        .route("/api/sessions/:id/ask", post(ask_handler))
        .route("/api/sessions/:id/step-by-step", post(step_handler))
        .route("/api/sessions/:id/diagram", post(diagram_handler))
        .route("/api/sessions/:id/voice", post(voice_handler))
        .route("/api/health", get(health_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Carga de página: crea la sesión con los manuales de muestra ya indexados.
#[axum::debug_handler]
async fn create_session_handler(
    State(state): State<AppState>,
) -> Result<Json<SessionView>, ApiError> {
    let samples = state.sample_corpus().await?;
    let id = state.sessions.insert(SessionContext::start(samples));
    info!("Nueva sesión {} ({}).", id, samples.summary);
    Ok(Json(session_view(&state, &id).await?))
}

#[axum::debug_handler]
async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(session_view(&state, &id).await?))
}

#[axum::debug_handler]
async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::UnknownSession(id))
    }
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let files = read_files(&mut multipart, "files").await?;
    info!("Sesión {}: {} manuales recibidos.", id, files.len());

    let llm = state.llm_manager.clone();
    let settings = state.settings;
    let summary = with_session(&state, &id, move |ctx| async move {
        session::upload_manuals(ctx, &llm, files, &settings).await
    })
    .await?;

    Ok(Json(UploadResponse {
        summary: summary.to_string(),
        session: session_view(&state, &id).await?,
    }))
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let llm = state.llm_manager.clone();
    let settings = state.settings;
    let outcome = with_session(&state, &id, move |ctx| async move {
        session::ask(ctx, &llm, &payload.question, &settings).await
    })
    .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler]
async fn step_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let llm = state.llm_manager.clone();
    let settings = state.settings;
    let outcome = with_session(&state, &id, move |ctx| async move {
        session::step_by_step(ctx, &llm, &settings).await
    })
    .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler]
async fn diagram_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let llm = state.llm_manager.clone();
    let settings = state.settings;
    let outcome = with_session(&state, &id, move |ctx| async move {
        session::view_diagram(ctx, &llm, &settings).await
    })
    .await?;
    Ok(Json(outcome.into()))
}

#[axum::debug_handler]
async fn voice_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<AnswerResponse>, ApiError> {
    let mut files = read_files(&mut multipart, "audio").await?;
    if files.len() != 1 {
        return Err(ApiError::BadRequest(
            "Envía exactamente un fichero WAV en el campo 'audio'.".to_string(),
        ));
    }
    let UploadedFile { name, bytes } = files.remove(0);

    let llm = state.llm_manager.clone();
    let settings = state.settings;
    let voice = with_session(&state, &id, move |ctx| async move {
        session::voice_question(ctx, &llm, &name, bytes, &settings).await
    })
    .await?;

    let mut response = AnswerResponse::from(voice.outcome);
    response.transcript = Some(voice.transcript);
    Ok(Json(response))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len(),
        "chat_model": state.llm_manager.chat_model,
        "embedding_model": state.llm_manager.embedding_model,
        "transcription_model": state.llm_manager.transcription_model,
    }))
}

// --- Handler de Apagado y Utilidades ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}

/// Ejecuta una acción sobre la sesión `id` con el contexto en propiedad.
///
/// La acción corre en su propia tarea: si el cliente se desconecta, termina
/// igualmente y el contexto actualizado se guarda. Trabaja sobre una copia,
/// así que si la tarea entra en pánico la sesión conserva su estado anterior.
async fn with_session<T, F, Fut>(state: &AppState, id: &str, action: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(SessionContext) -> Fut + Send + 'static,
    Fut: Future<Output = (SessionContext, crate::error::Result<T>)> + Send + 'static,
{
    let handle = state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::UnknownSession(id.to_string()))?;
    let mut guard = handle.lock_owned().await;

    let task = tokio::spawn(async move {
        let (ctx, result) = action((*guard).clone()).await;
        *guard = ctx;
        result
    });

    match task.await {
        Ok(result) => result.map_err(|err| {
            warn!("Acción fallida en la sesión {}: {}", id, err);
            ApiError::from(err)
        }),
        Err(join_err) => Err(ApiError::Internal(format!(
            "La acción de la sesión terminó de forma anómala: {join_err}"
        ))),
    }
}

async fn session_view(state: &AppState, id: &str) -> Result<SessionView, ApiError> {
    let handle = state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::UnknownSession(id.to_string()))?;
    let ctx = handle.lock().await;

    let manuals = ctx.manuals();
    let ready = ctx.has_manuals();
    let message = if ready {
        format!("✅ Manuales listos: {}", manuals.join(", "))
    } else {
        "👈 Sube manuales PDF desde la barra lateral para empezar.".to_string()
    };

    Ok(SessionView {
        session_id: id.to_string(),
        started_at: ctx.started_at,
        chunks: ctx.index.as_ref().map_or(0, |index| index.len()),
        question: ctx.query.question.clone(),
        pending: ctx.query.pending,
        manuals,
        ready,
        message,
    })
}

/// Lee los ficheros del campo `field_name`. Los campos vacíos (input sin
/// fichero seleccionado) se ignoran.
async fn read_files(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Formulario inválido: {e}")))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "sin_nombre".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("No se pudo leer '{name}': {e}")))?;
        if bytes.is_empty() {
            continue;
        }
        files.push(UploadedFile {
            name,
            bytes: bytes.to_vec(),
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::AppConfig;
    use crate::error::DocumentLoadError;
    use crate::rag::Answer;

    fn test_state() -> AppState {
        let (tx, _rx) = oneshot::channel();
        AppState::new(AppConfig::default(), tx)
    }

    #[tokio::test]
    async fn a_crashed_action_keeps_the_previous_session_state() {
        let state = test_state();
        let mut ctx = SessionContext::default();
        ctx.query.question = Some("error 102".to_string());
        let id = state.sessions.insert(ctx);

        let result = with_session(&state, &id, |ctx: SessionContext| async move {
            let outcome: crate::error::Result<()> = if ctx.query.question.is_some() {
                panic!("fallo dentro de la acción");
            } else {
                Ok(())
            };
            (SessionContext::default(), outcome)
        })
        .await;

        assert!(matches!(result, Err(ApiError::Internal(_))));
        let handle = state.sessions.get(&id).unwrap();
        assert_eq!(handle.lock().await.query.question.as_deref(), Some("error 102"));
    }

    #[tokio::test]
    async fn successful_actions_store_the_returned_context() {
        let state = test_state();
        let id = state.sessions.insert(SessionContext::default());

        let result = with_session(&state, &id, |mut ctx: SessionContext| async move {
            ctx.query.question = Some("motor".to_string());
            (ctx, Ok(7))
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        let handle = state.sessions.get(&id).unwrap();
        assert_eq!(handle.lock().await.query.question.as_deref(), Some("motor"));
    }

    #[test]
    fn error_statuses_follow_the_taxonomy() {
        let status = |err: AssistantError| ApiError::from(err).into_response().status();

        assert_eq!(
            status(DocumentLoadError::NotPdf("a.txt".into()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(AssistantError::ChatProvider("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(AssistantError::EmbeddingProvider("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(SpeechRecognitionError::ServiceUnavailable("x".into()).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::UnknownSession("nope".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn answer_outcomes_serialize_for_the_frontend() {
        let answered = AnswerResponse::from(AnswerOutcome::Answered(Answer {
            answer: "Revisar la presión de tinta.".to_string(),
            sources: vec![SourceRef {
                source: "aztech_flexo_manual.pdf".to_string(),
                page_number: 3,
                chunk_index: 1,
                start: 800,
                score: 0.9,
            }],
        }));
        let value = serde_json::to_value(&answered).unwrap();
        assert_eq!(value["outcome"], "answered");
        assert_eq!(value["sources"][0]["source"], "aztech_flexo_manual.pdf");
        assert!(value.get("message").is_none());

        let value = serde_json::to_value(AnswerResponse::from(AnswerOutcome::NeedsManuals)).unwrap();
        assert_eq!(value["outcome"], "needs_manuals");
        assert!(value.get("answer").is_none());
        assert!(value["message"].as_str().unwrap().contains("manuales"));

        let empty =
            serde_json::to_value(AnswerResponse::from(AnswerOutcome::EmptyQuestion)).unwrap();
        let no_op = serde_json::to_value(AnswerResponse::from(AnswerOutcome::NoOp)).unwrap();
        assert_eq!(empty["outcome"], "empty_question");
        assert_eq!(no_op["outcome"], "no_op");
        assert_ne!(empty["message"], no_op["message"]);
    }
}
