//! Índice vectorial en memoria sobre los chunks de los manuales.
//!
//! Búsqueda exacta por similitud coseno. Vive sólo en la memoria de la
//! sesión: no hay borrado ni persistencia.

use crate::error::{AssistantError, Result};
use crate::models::{Chunk, EmbeddingVector};

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk: Chunk,
    vector: EmbeddingVector,
}

/// Resultado de búsqueda: chunk y su similitud con la consulta.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Construye un índice nuevo emparejando cada chunk con su vector.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<EmbeddingVector>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(AssistantError::InvalidIndex(format!(
                "{} chunks pero {} vectores",
                chunks.len(),
                vectors.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        Ok(Self { entries })
    }

    /// Unión de dos índices: las entradas de `self` seguidas de las de `other`.
    /// No se vuelve a embeber nada.
    pub fn merge(mut self, other: VectorIndex) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Los `k` chunks más similares, de mayor a menor similitud. A igualdad
    /// de puntuación gana el que se insertó antes.
    pub fn search(&self, query: &[f64], k: usize) -> Vec<ScoredChunk> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.vector.len() == query.len())
            .map(|(pos, entry)| (pos, cosine_similarity(query, &entry.vector)))
            .filter(|(_, score)| score.is_finite())
            .collect();

        // sort_by es estable: el orden de inserción resuelve los empates.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect()
    }

    /// Nombres de los manuales indexados, sin duplicados y en orden de llegada.
    pub fn sources(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.chunk.metadata.source) {
                seen.push(entry.chunk.metadata.source.clone());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
