//! Consulta RAG contra el índice activo de la sesión.
//!
//! Flujo:
//!   1. Embedding de la pregunta (posiblemente reformulada).
//!   2. Búsqueda de los `top_k` chunks más similares.
//!   3. El LLM responde usando sólo esos chunks como contexto.
//!   4. Se devuelven la respuesta y las fuentes usadas.

use serde::Serialize;
use tracing::info;

use crate::{
    error::Result,
    index::VectorIndex,
    llm::{ChatCompleter, Embedder},
    models::SourceRef,
};

/// Variante de consulta asociada a cada botón de la interfaz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Ask,
    StepByStep,
    Diagram,
}

impl QueryKind {
    /// Texto que se envía realmente al pipeline para esta variante.
    pub fn rephrase(&self, question: &str) -> String {
        match self {
            Self::Ask => question.to_string(),
            Self::StepByStep => {
                format!("Give step-by-step instructions to resolve: {question}")
            }
            Self::Diagram => {
                format!("Is there a diagram related to: {question}? If yes, describe or name it.")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Lanza una consulta RAG y devuelve la respuesta con sus fuentes, en el
/// orden de similitud de los chunks recuperados.
pub async fn rag_query<P>(
    llm: &P,
    index: &VectorIndex,
    question: &str,
    top_k: usize,
) -> Result<Answer>
where
    P: Embedder + ChatCompleter,
{
    // 1) Embedding de la query
    let query_vec = llm.embed(question).await?;

    // 2) Top-k chunks
    let results = index.search(&query_vec, top_k);

    let context = results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let sources = results
        .iter()
        .map(|r| SourceRef {
            source: r.chunk.metadata.source.clone(),
            page_number: r.chunk.metadata.page_number,
            chunk_index: r.chunk.index,
            start: r.chunk.start,
            score: r.score,
        })
        .collect::<Vec<_>>();

    // 3) Preguntar al LLM con el contexto recuperado
    let answer = llm.complete(question, &context).await?;
    info!("Consulta respondida con {} fuentes.", sources.len());

    Ok(Answer { answer, sources })
}
