//! Ingesta de manuales: carga, troceado, embeddings y construcción del índice.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    error::Result,
    index::VectorIndex,
    llm::Embedder,
    loader,
    models::Document,
    splitter::{self, SplitterConfig},
};

/// Fichero recibido desde el formulario de subida.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_loaded: usize,
    pub pages_loaded: usize,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ficheros, {} páginas, {} chunks ({} embebidos en esta operación).",
            self.files_loaded, self.pages_loaded, self.chunks_created, self.chunks_embedded
        )
    }
}

/// Manuales de muestra ya indexados, compartidos en sólo lectura por todas
/// las sesiones.
#[derive(Debug, Clone, Default)]
pub struct SampleCorpus {
    pub documents: Vec<Document>,
    pub index: Option<VectorIndex>,
    pub summary: IngestionSummary,
}

/// Trocea y embebe los documentos y construye un índice nuevo con ellos.
/// Si no hay texto que indexar no se llama al proveedor y el índice es `None`.
pub async fn index_documents<E: Embedder>(
    embedder: &E,
    documents: &[Document],
    splitter_cfg: &SplitterConfig,
) -> Result<(Option<VectorIndex>, IngestionSummary)> {
    debug!(
        "Indexando: {}",
        documents.iter().map(|d| d.source.as_str()).collect::<Vec<_>>().join(", ")
    );
    let pages: Vec<_> = documents.iter().flat_map(|d| d.pages.iter().cloned()).collect();
    let chunks = splitter::split_pages(&pages, splitter_cfg);

    let mut summary = IngestionSummary {
        files_loaded: documents.len(),
        pages_loaded: pages.len(),
        chunks_created: chunks.len(),
        chunks_embedded: 0,
    };

    if chunks.is_empty() {
        if !documents.is_empty() {
            warn!("Los documentos no contienen texto extraíble; no se crea índice.");
        }
        return Ok((None, summary));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_many(texts).await?;
    summary.chunks_embedded = vectors.len();

    let index = VectorIndex::build(chunks, vectors)?;
    info!("Índice construido: {}", summary);
    Ok((Some(index), summary))
}

/// Carga e indexa la carpeta de manuales de muestra.
pub async fn load_sample_corpus<E: Embedder>(
    embedder: &E,
    dir: &Path,
    splitter_cfg: &SplitterConfig,
) -> Result<SampleCorpus> {
    let documents = loader::load_sample_dir(dir).await?;
    let (index, summary) = index_documents(embedder, &documents, splitter_cfg).await?;
    info!(
        "Manuales de muestra listos ({} ficheros en {}).",
        documents.len(),
        dir.display()
    );
    Ok(SampleCorpus {
        documents,
        index,
        summary,
    })
}

/// Carga todos los ficheros subidos. Un solo fichero inválido aborta el lote.
pub async fn load_uploads(files: Vec<UploadedFile>) -> Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let document = loader::load_upload(&file.name, file.bytes).await.map_err(|e| {
            warn!("Lote de subida abortado en '{}': {}", file.name, e);
            e
        })?;
        documents.push(document);
    }
    Ok(documents)
}
