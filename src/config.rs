//! Carga y gestión de configuración de la aplicación (modelos, manuales y servidor).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::splitter::SplitterConfig;

/// Qué hacer con el índice activo cuando el usuario sube manuales nuevos.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestPolicy {
    /// Embebe sólo los ficheros nuevos y los fusiona con el índice existente.
    Merge,
    /// Reconstruye el índice desde cero (muestras + todas las subidas).
    Rebuild,
}

impl IngestPolicy {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(anyhow!("Política de ingesta no soportada: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,
    pub max_upload_bytes: usize,

    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_transcription_model: String,

    pub sample_manuals_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,
    pub ingest_policy: IngestPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            open_browser: true,
            max_upload_bytes: 50 * MIB,
            llm_embedding_model: "text-embedding-3-small".to_string(),
            llm_chat_model: "gpt-4o-mini".to_string(),
            llm_transcription_model: "whisper-1".to_string(),
            sample_manuals_dir: PathBuf::from("sample_manuals"),
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_top_k: 4,
            ingest_policy: IngestPolicy::Merge,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        // El cliente OpenAI de Rig lee la clave por su cuenta; aquí sólo
        // comprobamos que existe para fallar al arrancar y no en la primera consulta.
        env::var("OPENAI_API_KEY").map_err(|_| anyhow!("Falta OPENAI_API_KEY en el entorno"))?;

        let defaults = Self::default();

        let cfg = Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or(defaults.server_addr),
            open_browser: parse_var("OPEN_BROWSER", defaults.open_browser)?,
            max_upload_bytes: upload_limit_bytes(parse_var(
                "MAX_UPLOAD_MB",
                defaults.max_upload_bytes / MIB,
            )?)?,
            llm_embedding_model: env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or(defaults.llm_embedding_model),
            llm_chat_model: env::var("LLM_CHAT_MODEL").unwrap_or(defaults.llm_chat_model),
            llm_transcription_model: env::var("LLM_TRANSCRIPTION_MODEL")
                .unwrap_or(defaults.llm_transcription_model),
            sample_manuals_dir: env::var("SAMPLE_MANUALS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.sample_manuals_dir),
            chunk_size: parse_var("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_var("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            retrieval_top_k: parse_var("RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            ingest_policy: match env::var("INGEST_POLICY") {
                Ok(value) => IngestPolicy::from_str(&value)?,
                Err(_) => defaults.ingest_policy,
            },
        };

        cfg.splitter().validate()?;
        Ok(cfg)
    }

    pub fn splitter(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

const MIB: usize = 1024 * 1024;

fn upload_limit_bytes(megabytes: usize) -> Result<usize> {
    megabytes
        .checked_mul(MIB)
        .ok_or_else(|| anyhow!("MAX_UPLOAD_MB demasiado grande: {megabytes}"))
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Valor inválido para {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_policy_is_case_insensitive() {
        assert_eq!(IngestPolicy::from_str("MERGE").unwrap(), IngestPolicy::Merge);
        assert_eq!(IngestPolicy::from_str("rebuild").unwrap(), IngestPolicy::Rebuild);
        assert!(IngestPolicy::from_str("append").is_err());
    }

    #[test]
    fn upload_limit_is_converted_without_overflow() {
        assert_eq!(upload_limit_bytes(50).unwrap(), AppConfig::default().max_upload_bytes);
        assert_eq!(upload_limit_bytes(0).unwrap(), 0);
        assert!(upload_limit_bytes(usize::MAX / 1024).is_err());
    }

    #[test]
    fn defaults_match_the_legacy_pipeline() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chunk_size, 1000);
        assert_eq!(cfg.chunk_overlap, 200);
        assert_eq!(cfg.retrieval_top_k, 4);
        assert_eq!(cfg.ingest_policy, IngestPolicy::Merge);
        assert!(cfg.splitter().validate().is_ok());
    }
}
