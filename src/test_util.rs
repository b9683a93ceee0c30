//! Dobles de prueba para los servicios externos.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{AssistantError, Result, SpeechRecognitionError};
use crate::llm::{ChatCompleter, Embedder, SpeechTranscriber};
use crate::models::{Document, EmbeddingVector, Page, PageMetadata};

/// Vocabulario del embedding falso: cada palabra es una dimensión.
const VOCABULARY: [&str; 8] = [
    "error", "102", "rodillo", "tinta", "motor", "diagrama", "presión", "limpieza",
];

/// Embedding por bolsa de palabras sobre `VOCABULARY`, más una dimensión
/// constante para que ningún vector sea nulo.
pub fn keyword_vector(text: &str) -> EmbeddingVector {
    let lower = text.to_lowercase();
    let mut vector: Vec<f64> = VOCABULARY
        .iter()
        .map(|word| lower.matches(word).count() as f64)
        .collect();
    vector.push(0.1);
    vector
}

#[derive(Default)]
pub struct FakeProvider {
    pub embed_calls: AtomicUsize,
    pub embedded_texts: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    /// (pregunta, contexto) de cada llamada al chat.
    pub prompts: Mutex<Vec<(String, String)>>,
    pub fail_embeddings: bool,
    pub fail_chat: bool,
    /// `None` simula el servicio de voz caído.
    pub transcript: Option<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(transcript: &str) -> Self {
        Self {
            transcript: Some(transcript.to_string()),
            ..Self::default()
        }
    }

    pub fn external_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
            + self.chat_calls.load(Ordering::SeqCst)
            + self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

impl Embedder for FakeProvider {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        Ok(self.embed_many(vec![text.to_string()]).await?.remove(0))
    }

    async fn embed_many(&self, texts: Vec<String>) -> Result<Vec<EmbeddingVector>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(AssistantError::EmbeddingProvider("401 Unauthorized".to_string()));
        }
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

impl ChatCompleter for FakeProvider {
    async fn complete(&self, question: &str, context: &str) -> Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((question.to_string(), context.to_string()));
        if self.fail_chat {
            return Err(AssistantError::ChatProvider("429 Too Many Requests".to_string()));
        }
        Ok(format!("Respuesta a: {question}"))
    }
}

impl SpeechTranscriber for FakeProvider {
    async fn transcribe(&self, _filename: &str, _audio: Vec<u8>) -> Result<String> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        match &self.transcript {
            None => Err(SpeechRecognitionError::ServiceUnavailable("503".to_string()).into()),
            Some(text) if text.trim().is_empty() => {
                Err(SpeechRecognitionError::Unintelligible("vacío".to_string()).into())
            }
            Some(text) => Ok(text.clone()),
        }
    }
}

/// Documento en memoria con una página por texto.
pub fn document(source: &str, pages: &[&str]) -> Document {
    Document {
        source: source.to_string(),
        pages: pages
            .iter()
            .enumerate()
            .map(|(page_number, text)| Page {
                text: text.to_string(),
                metadata: PageMetadata {
                    source: source.to_string(),
                    page_number,
                },
            })
            .collect(),
    }
}

/// Cabecera RIFF/WAVE mínima seguida de silencio.
pub fn wav_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&[0u8; 24]);
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

/// PDF mínimo con una página por texto, en Helvetica, con la tabla xref
/// calculada sobre los offsets reales.
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let font_id = 3 + 2 * pages.len();
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content = format!("BT /F1 18 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {} 0 R >>",
            4 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}
