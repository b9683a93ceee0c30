//! Carga de manuales PDF: carpeta de muestras y ficheros subidos por el usuario.
//!
//! La extracción de texto (`pdf-extract`) es costosa en CPU, así que se hace
//! en el pool bloqueante de tokio, aunque la petición la espera igualmente.

use std::io::Write;
use std::path::{Path, PathBuf};

use mime_guess::MimeGuess;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::DocumentLoadError;
use crate::models::{Document, Page, PageMetadata};

type LoadResult<T> = std::result::Result<T, DocumentLoadError>;

/// Extrae una página de texto por cada página del PDF.
pub fn load_pdf(path: &Path, source: &str) -> LoadResult<Document> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| {
        DocumentLoadError::Malformed {
            source_name: source.to_string(),
            reason: e.to_string(),
        }
    })?;

    let pages = pages
        .into_iter()
        .enumerate()
        .map(|(page_number, text)| Page {
            text,
            metadata: PageMetadata {
                source: source.to_string(),
                page_number,
            },
        })
        .collect::<Vec<_>>();

    info!("Cargado {} ({} páginas).", source, pages.len());
    Ok(Document {
        source: source.to_string(),
        pages,
    })
}

/// Carga todos los `*.pdf` de la carpeta (sin recursión), ordenados por nombre.
/// Si la carpeta no existe no hay muestras: devuelve una lista vacía.
pub async fn load_sample_dir(dir: &Path) -> LoadResult<Vec<Document>> {
    if !dir.is_dir() {
        info!("No hay carpeta de manuales de muestra en {}.", dir.display());
        return Ok(Vec::new());
    }

    let dir = dir.to_path_buf();
    run_blocking("muestras", move || {
        let mut documents = Vec::new();
        for path in list_pdfs(&dir)? {
            let source = file_name(&path);
            documents.push(load_pdf(&path, &source)?);
        }
        Ok(documents)
    })
    .await
}

/// Carga un PDF subido usando un fichero temporal en el directorio del sistema.
pub async fn load_upload(name: &str, bytes: Vec<u8>) -> LoadResult<Document> {
    load_upload_in(&std::env::temp_dir(), name, bytes).await
}

/// Escribe los bytes en un `.pdf` temporal dentro de `temp_dir`, lo carga y lo
/// borra. El borrado lo hace el `Drop` de `NamedTempFile`, así que ocurre
/// también cuando la extracción falla o entra en pánico.
pub async fn load_upload_in(temp_dir: &Path, name: &str, bytes: Vec<u8>) -> LoadResult<Document> {
    if MimeGuess::from_path(name).first_raw() != Some("application/pdf") {
        return Err(DocumentLoadError::NotPdf(name.to_string()));
    }

    let temp_dir = temp_dir.to_path_buf();
    let source = name.to_string();
    run_blocking(name, move || {
        let mut tmp = tempfile::Builder::new()
            .prefix("maina-upload-")
            .suffix(".pdf")
            .tempfile_in(&temp_dir)
            .map_err(|e| io_error(&temp_dir, e))?;
        tmp.write_all(&bytes).map_err(|e| io_error(tmp.path(), e))?;

        load_pdf(tmp.path(), &source)
    })
    .await
}

fn list_pdfs(dir: &Path) -> LoadResult<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| DocumentLoadError::Io {
            path: dir.display().to_string(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && has_pdf_extension(entry.path()) {
            pdfs.push(entry.into_path());
        }
    }
    Ok(pdfs)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> DocumentLoadError {
    DocumentLoadError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn run_blocking<T, F>(label: &str, job: F) -> LoadResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LoadResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(result) => result,
        Err(join_err) => {
            // pdf-extract puede entrar en pánico con PDFs muy dañados.
            warn!("La extracción de '{}' terminó de forma anómala: {}", label, join_err);
            Err(DocumentLoadError::Malformed {
                source_name: label.to_string(),
                reason: "la extracción de texto falló de forma inesperada".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::pdf_bytes;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn missing_sample_dir_means_no_samples() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = load_sample_dir(&tmp.path().join("sample_manuals")).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn sample_dir_ignores_non_pdf_files_and_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("LEEME.txt"), "no es un manual").unwrap();
        std::fs::create_dir(tmp.path().join("viejos")).unwrap();
        std::fs::write(tmp.path().join("viejos").join("roto.pdf"), b"basura").unwrap();

        let docs = load_sample_dir(tmp.path()).await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn one_bad_sample_aborts_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("roto.PDF"), b"esto no es un pdf").unwrap();

        let err = load_sample_dir(tmp.path()).await.unwrap_err();
        assert!(matches!(err, DocumentLoadError::Malformed { .. }));
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_names_without_touching_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_upload_in(tmp.path(), "fotos.zip", vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentLoadError::NotPdf(name) if name == "fotos.zip"));
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn failed_upload_still_removes_the_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_upload_in(tmp.path(), "manual.pdf", b"%PDF-1.4 truncado".to_vec())
            .await
            .unwrap_err();

        match err {
            DocumentLoadError::Malformed { source_name, .. } => {
                assert_eq!(source_name, "manual.pdf")
            }
            other => panic!("error inesperado: {other}"),
        }
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn upload_yields_one_page_per_pdf_page_named_after_the_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let bytes = pdf_bytes(&["Error 102 anilox", "Motor principal"]);

        let doc = load_upload_in(tmp.path(), "manual.pdf", bytes).await.unwrap();

        assert_eq!(doc.source, "manual.pdf");
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.pages[0].text.contains("Error 102 anilox"));
        assert!(doc.pages[1].text.contains("Motor principal"));
        for (n, page) in doc.pages.iter().enumerate() {
            assert_eq!(
                page.metadata,
                PageMetadata {
                    source: "manual.pdf".to_string(),
                    page_number: n,
                }
            );
        }
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn sample_dir_loads_pdfs_in_file_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b_prensa.pdf"), pdf_bytes(&["Motor principal"])).unwrap();
        std::fs::write(
            tmp.path().join("a_flexo.pdf"),
            pdf_bytes(&["Error 102 anilox", "Limpieza", "Tinta"]),
        )
        .unwrap();

        let docs = load_sample_dir(tmp.path()).await.unwrap();

        let summary: Vec<(&str, usize)> =
            docs.iter().map(|d| (d.source.as_str(), d.pages.len())).collect();
        assert_eq!(summary, vec![("a_flexo.pdf", 3), ("b_prensa.pdf", 1)]);
        assert_eq!(docs[0].pages[2].metadata.page_number, 2);
    }

    #[test]
    fn pdf_extension_check_is_case_insensitive() {
        assert!(has_pdf_extension(Path::new("a/manual.PDF")));
        assert!(has_pdf_extension(Path::new("manual.pdf")));
        assert!(!has_pdf_extension(Path::new("manual.pdf.txt")));
        assert!(!has_pdf_extension(Path::new("manual")));
    }
}
