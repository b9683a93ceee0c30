//! Modelos de dominio (páginas de manuales, chunks y atribución de fuentes).

use serde::Serialize;

/// Metadatos heredados por todos los chunks de una página.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    pub source: String,
    /// Índice de la página dentro del PDF (empezando en 0).
    pub page_number: usize,
}

/// Una página de texto extraída de un PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub text: String,
    pub metadata: PageMetadata,
}

/// Un fichero cargado: su nombre y sus páginas en orden.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub pages: Vec<Page>,
}

/// Trozo de texto de una página, unidad de recuperación.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: PageMetadata,
    /// Posición del chunk dentro de su página (empezando en 0).
    pub index: usize,
    /// Offset en caracteres dentro del texto de la página.
    pub start: usize,
}

pub type EmbeddingVector = Vec<f64>;

/// Fuente citada en una respuesta.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub page_number: usize,
    pub chunk_index: usize,
    pub start: usize,
    pub score: f64,
}
