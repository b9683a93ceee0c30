//! Taxonomía de errores del asistente.
//!
//! Todos los errores son terminales sólo para la acción en curso: la sesión
//! sigue siendo utilizable para la siguiente petición.

use thiserror::Error;

/// Fallo al leer o interpretar un PDF. Aborta el lote de ingesta completo.
#[derive(Debug, Error)]
pub enum DocumentLoadError {
    #[error("no se pudo leer {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF inválido o corrupto '{source_name}': {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("el fichero '{0}' no es un PDF")]
    NotPdf(String),
}

/// Fallos del servicio de reconocimiento de voz. Ambos son recuperables:
/// el usuario puede volver a grabar o escribir la pregunta.
#[derive(Debug, Error)]
pub enum SpeechRecognitionError {
    #[error("no se entendió el audio: {0}")]
    Unintelligible(String),

    #[error("servicio de reconocimiento de voz no disponible: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    DocumentLoad(#[from] DocumentLoadError),

    #[error("error del proveedor de embeddings: {0}")]
    EmbeddingProvider(String),

    #[error("error del modelo de chat: {0}")]
    ChatProvider(String),

    #[error(transparent)]
    SpeechRecognition(#[from] SpeechRecognitionError),

    #[error("índice inválido: {0}")]
    InvalidIndex(String),
}

impl AssistantError {
    /// Identificador estable del tipo de error, usado por la API.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DocumentLoad(_) => "document_load",
            Self::EmbeddingProvider(_) => "embedding_provider",
            Self::ChatProvider(_) => "chat_provider",
            Self::SpeechRecognition(SpeechRecognitionError::Unintelligible(_)) => {
                "speech_unintelligible"
            }
            Self::SpeechRecognition(SpeechRecognitionError::ServiceUnavailable(_)) => {
                "speech_unavailable"
            }
            Self::InvalidIndex(_) => "invalid_index",
        }
    }

    /// Los errores de voz permiten seguir con texto escrito sin recargar nada.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SpeechRecognition(_))
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
