//! Troceado de páginas en ventanas de caracteres con solapamiento.
//!
//! No es consciente de frases ni de tokens: recorre el texto en ventanas de
//! `chunk_size` caracteres avanzando `chunk_size - chunk_overlap` cada vez.

use anyhow::{anyhow, Result};

use crate::models::{Chunk, Page};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl SplitterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(anyhow!("CHUNK_SIZE debe ser mayor que 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({}) debe ser menor que CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            ));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Trocea todas las páginas conservando su orden.
pub fn split_pages(pages: &[Page], cfg: &SplitterConfig) -> Vec<Chunk> {
    pages.iter().flat_map(|page| split_page(page, cfg)).collect()
}

/// Trocea una página. Una página vacía no produce chunks; una más corta que
/// la ventana produce exactamente uno.
pub fn split_page(page: &Page, cfg: &SplitterConfig) -> Vec<Chunk> {
    if page.text.trim().is_empty() {
        return Vec::new();
    }

    // Offsets en bytes de cada carácter, más el final del texto.
    let mut bounds: Vec<usize> = page.text.char_indices().map(|(i, _)| i).collect();
    let char_count = bounds.len();
    bounds.push(page.text.len());

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + cfg.chunk_size).min(char_count);
        chunks.push(Chunk {
            text: page.text[bounds[start]..bounds[end]].to_string(),
            metadata: page.metadata.clone(),
            index: chunks.len(),
            start,
        });
        if end == char_count {
            break;
        }
        start += cfg.step();
    }
    chunks
}
