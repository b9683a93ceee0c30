//! Abstracción sobre Rig para los servicios externos de IA: embeddings, chat
//! y transcripción de voz.
//!
//! Cada servicio queda detrás de un trait estrecho para que el pipeline pueda
//! probarse sin red. `LlmManager` es la implementación real (OpenAI).

use std::future::Future;

use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use rig::transcription::TranscriptionModel; // <- para .transcription_request
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{AssistantError, Result, SpeechRecognitionError};
use crate::models::EmbeddingVector;

/// Plantilla de RetrievalQA: el modelo sólo puede usar el contexto recuperado.
const SYSTEM_PROMPT: &str = r#"
You are MAINA, a maintenance assistant for industrial machinery.
Use only the pieces of context taken from the maintenance manuals to answer the question.
If the context does not contain the answer, just say that you don't know; don't try to make up an answer.
"#;

pub trait Embedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<EmbeddingVector>> + Send;

    /// Un vector por cada texto, en el mismo orden.
    fn embed_many(
        &self,
        texts: Vec<String>,
    ) -> impl Future<Output = Result<Vec<EmbeddingVector>>> + Send;
}

pub trait ChatCompleter {
    /// Responde a `question` usando sólo `context` (chunks concatenados).
    fn complete(&self, question: &str, context: &str)
        -> impl Future<Output = Result<String>> + Send;
}

pub trait SpeechTranscriber {
    fn transcribe(
        &self,
        filename: &str,
        audio: Vec<u8>,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Gestor de LLMs, embeddings y transcripción.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub embedding_model: String,
    pub chat_model: String,
    pub transcription_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            transcription_model: cfg.llm_transcription_model.clone(),
        }
    }
}

// ---------------------------------------------------------------------
// EMBEDDINGS
// ---------------------------------------------------------------------

impl Embedder for LlmManager {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed_many(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| {
                AssistantError::EmbeddingProvider("no se pudo generar embedding de la query".into())
            })
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<EmbeddingVector>> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::openai;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();
        let embedding_model = client.embedding_model(&self.embedding_model);

        let expected = texts.len();
        let embeddings = embedding_model
            .embed_texts(texts)
            .await
            .map_err(|e| AssistantError::EmbeddingProvider(e.to_string()))?;

        if embeddings.len() != expected {
            return Err(AssistantError::EmbeddingProvider(format!(
                "número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            )));
        }

        debug!("{} embeddings generados con {}", expected, self.embedding_model);
        Ok(embeddings.into_iter().map(|emb| emb.vec).collect())
    }
}

// ---------------------------------------------------------------------
// CHAT / COMPLETION
// ---------------------------------------------------------------------

impl ChatCompleter for LlmManager {
    async fn complete(&self, question: &str, context: &str) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::providers::openai;

        let client = openai::Client::from_env();

        let full_context = format!("Context:\n{}\n\nQuestion:\n{}", context, question);

        let agent = client
            .agent(&self.chat_model)
            .preamble(SYSTEM_PROMPT)
            .context(&full_context)
            .temperature(0.0)
            .build();

        agent
            .prompt(question)
            .await
            .map_err(|e| AssistantError::ChatProvider(e.to_string()))
    }
}

// ---------------------------------------------------------------------
// VOZ
// ---------------------------------------------------------------------

impl SpeechTranscriber for LlmManager {
    async fn transcribe(&self, filename: &str, audio: Vec<u8>) -> Result<String> {
        use rig::client::TranscriptionClient as _;
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let model = client.transcription_model(&self.transcription_model);

        let response = model
            .transcription_request()
            .filename(Some(filename.to_string()))
            .data(audio)
            .send()
            .await
            .map_err(|e| {
                warn!("Fallo del servicio de transcripción: {}", e);
                SpeechRecognitionError::ServiceUnavailable(e.to_string())
            })?;

        let text = response.text.trim().to_string();
        if text.is_empty() {
            return Err(SpeechRecognitionError::Unintelligible(
                "la transcripción está vacía".to_string(),
            )
            .into());
        }
        Ok(text)
    }
}
