//! Estado de una sesión de interfaz y los manejadores de cada acción del
//! usuario.
//!
//! Cada manejador recibe el `SessionContext` por valor y lo devuelve
//! actualizado junto con el resultado de la acción. Un error sólo afecta a la
//! acción en curso: el contexto devuelto sigue siendo válido.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::{AppConfig, IngestPolicy},
    error::{Result, SpeechRecognitionError},
    index::VectorIndex,
    ingest::{self, IngestionSummary, SampleCorpus, UploadedFile},
    llm::{ChatCompleter, Embedder, SpeechTranscriber},
    models::Document,
    rag::{self, Answer, QueryKind},
    splitter::SplitterConfig,
};

/// Acción pendiente mientras se atiende un botón.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingAction {
    #[default]
    None,
    Ask,
    Step,
}

#[derive(Debug, Clone, Default)]
pub struct QuerySession {
    /// Última pregunta formulada con "Ask" (o por voz).
    pub question: Option<String>,
    pub pending: PendingAction,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub started_at: DateTime<Utc>,
    /// Índice activo; `None` mientras no haya manuales cargados.
    pub index: Option<VectorIndex>,
    /// Todos los documentos cargados en la sesión (muestras + subidas).
    pub documents: Vec<Document>,
    pub query: QuerySession,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            index: None,
            documents: Vec::new(),
            query: QuerySession::default(),
        }
    }
}

impl SessionContext {
    /// Contexto inicial de una sesión con los manuales de muestra ya indexados.
    pub fn start(samples: &SampleCorpus) -> Self {
        Self {
            index: samples.index.clone(),
            documents: samples.documents.clone(),
            ..Self::default()
        }
    }

    pub fn has_manuals(&self) -> bool {
        self.index.as_ref().is_some_and(|index| !index.is_empty())
    }

    pub fn manuals(&self) -> Vec<String> {
        self.index.as_ref().map(VectorIndex::sources).unwrap_or_default()
    }
}

/// Parámetros del pipeline que usan los manejadores.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub splitter: SplitterConfig,
    pub top_k: usize,
    pub policy: IngestPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            splitter: cfg.splitter(),
            top_k: cfg.retrieval_top_k,
            policy: cfg.ingest_policy,
        }
    }
}

/// Resultado visible de un botón de consulta.
#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    Answered(Answer),
    /// No hay manuales cargados; no se llamó a ningún servicio.
    NeedsManuals,
    /// "Ask" con la caja de texto vacía.
    EmptyQuestion,
    /// Step-by-step o diagrama sin una pregunta previa.
    NoOp,
}

#[derive(Debug, Clone)]
pub struct VoiceOutcome {
    pub transcript: String,
    pub outcome: AnswerOutcome,
}

// ---------------------------------------------------------------------
// INGESTA
// ---------------------------------------------------------------------

/// Añade manuales subidos al índice activo. Sin ficheros no hace nada. Si el
/// lote falla, el contexto vuelve intacto.
pub async fn upload_manuals<E: Embedder>(
    ctx: SessionContext,
    embedder: &E,
    files: Vec<UploadedFile>,
    settings: &PipelineSettings,
) -> (SessionContext, Result<IngestionSummary>) {
    if files.is_empty() {
        return (ctx, Ok(IngestionSummary::default()));
    }

    match ingest::load_uploads(files).await {
        Ok(documents) => add_documents(ctx, embedder, documents, settings).await,
        Err(err) => (ctx, Err(err)),
    }
}

/// Indexa documentos ya cargados según la política de ingesta: `Merge`
/// embebe sólo los nuevos, `Rebuild` vuelve a embeber todo lo de la sesión.
pub async fn add_documents<E: Embedder>(
    mut ctx: SessionContext,
    embedder: &E,
    new_documents: Vec<Document>,
    settings: &PipelineSettings,
) -> (SessionContext, Result<IngestionSummary>) {
    let result = match settings.policy {
        IngestPolicy::Merge => {
            ingest::index_documents(embedder, &new_documents, &settings.splitter).await
        }
        IngestPolicy::Rebuild => {
            let all: Vec<Document> = ctx
                .documents
                .iter()
                .chain(new_documents.iter())
                .cloned()
                .collect();
            ingest::index_documents(embedder, &all, &settings.splitter).await
        }
    };

    match result {
        Ok((new_index, summary)) => {
            ctx.index = match (settings.policy, ctx.index.take(), new_index) {
                (IngestPolicy::Rebuild, _, rebuilt) => rebuilt,
                (IngestPolicy::Merge, Some(current), Some(added)) => Some(current.merge(added)),
                (IngestPolicy::Merge, current, added) => added.or(current),
            };
            ctx.documents.extend(new_documents);
            info!("Manuales subidos indexados: {}", summary);
            (ctx, Ok(summary))
        }
        Err(err) => (ctx, Err(err)),
    }
}

// ---------------------------------------------------------------------
// CONSULTAS
// ---------------------------------------------------------------------

/// Botón "Ask": guarda la pregunta y la responde.
pub async fn ask<P>(
    mut ctx: SessionContext,
    llm: &P,
    question: &str,
    settings: &PipelineSettings,
) -> (SessionContext, Result<AnswerOutcome>)
where
    P: Embedder + ChatCompleter,
{
    let question = question.trim();
    if question.is_empty() {
        return (ctx, Ok(AnswerOutcome::EmptyQuestion));
    }
    ctx.query.question = Some(question.to_string());
    run_pending(ctx, llm, QueryKind::Ask, settings).await
}

/// Botón "Step-by-Step Fix": repite la pregunta guardada pidiendo pasos.
pub async fn step_by_step<P>(
    ctx: SessionContext,
    llm: &P,
    settings: &PipelineSettings,
) -> (SessionContext, Result<AnswerOutcome>)
where
    P: Embedder + ChatCompleter,
{
    run_pending(ctx, llm, QueryKind::StepByStep, settings).await
}

/// Botón "View Diagram": repite la pregunta guardada preguntando por diagramas.
pub async fn view_diagram<P>(
    ctx: SessionContext,
    llm: &P,
    settings: &PipelineSettings,
) -> (SessionContext, Result<AnswerOutcome>)
where
    P: Embedder + ChatCompleter,
{
    run_pending(ctx, llm, QueryKind::Diagram, settings).await
}

/// Pregunta por voz: transcribe el WAV y, si se entiende, actúa como "Ask".
/// Si falla, la pregunta guardada no cambia y el error es recuperable.
pub async fn voice_question<P>(
    ctx: SessionContext,
    llm: &P,
    filename: &str,
    audio: Vec<u8>,
    settings: &PipelineSettings,
) -> (SessionContext, Result<VoiceOutcome>)
where
    P: Embedder + ChatCompleter + SpeechTranscriber,
{
    if !is_wav(&audio) {
        let err = SpeechRecognitionError::Unintelligible(format!(
            "'{filename}' no es un fichero WAV"
        ));
        return (ctx, Err(err.into()));
    }

    let transcript = match llm.transcribe(filename, audio).await {
        Ok(text) => text,
        Err(err) => {
            warn!("No se pudo transcribir la pregunta por voz: {}", err);
            return (ctx, Err(err));
        }
    };

    let (ctx, result) = ask(ctx, llm, &transcript, settings).await;
    let result = result.map(|outcome| VoiceOutcome {
        transcript,
        outcome,
    });
    (ctx, result)
}

/// Máquina de estados común: `None → Ask|Step → None`, pase lo que pase.
async fn run_pending<P>(
    mut ctx: SessionContext,
    llm: &P,
    kind: QueryKind,
    settings: &PipelineSettings,
) -> (SessionContext, Result<AnswerOutcome>)
where
    P: Embedder + ChatCompleter,
{
    let Some(question) = ctx.query.question.clone() else {
        return (ctx, Ok(AnswerOutcome::NoOp));
    };

    ctx.query.pending = match kind {
        QueryKind::Ask => PendingAction::Ask,
        QueryKind::StepByStep | QueryKind::Diagram => PendingAction::Step,
    };

    let result = match &ctx.index {
        Some(index) if !index.is_empty() => {
            rag::rag_query(llm, index, &kind.rephrase(&question), settings.top_k)
                .await
                .map(AnswerOutcome::Answered)
        }
        _ => Ok(AnswerOutcome::NeedsManuals),
    };

    ctx.query.pending = PendingAction::None;
    (ctx, result)
}

fn is_wav(audio: &[u8]) -> bool {
    audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE"
}
