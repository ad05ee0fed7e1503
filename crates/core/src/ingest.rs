use crate::chunking::{build_sections, ChunkingConfig};
use crate::extractor::extract_pdf_text;
use crate::{IngestError, IngestionOptions, Section};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_documents(folder: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let accepted = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)));

        if accepted {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// PDFs go through the page extractor; everything else is read as lossy UTF-8.
pub fn read_document(path: &Path) -> Result<String, IngestError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        extract_pdf_text(path)
    } else {
        Ok(String::from_utf8_lossy(&fs::read(path)?).into_owned())
    }
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub sections: Vec<Section>,
    pub skipped_files: Vec<SkippedDocument>,
}

pub fn ingest_folder(
    folder: &Path,
    options: &IngestionOptions,
) -> Result<IngestionReport, IngestError> {
    ChunkingConfig::from(options).validate()?;
    let files = discover_documents(folder, &options.extensions);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no documents found in {}",
            folder.display()
        )));
    }

    let mut sections = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        let build_result = (|| -> Result<Vec<Section>, IngestError> {
            let doc_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;
            let text = read_document(&path)?;
            build_sections(doc_name, &text, options)
        })();

        match build_result {
            Ok(document_sections) => {
                info!(path = %path.display(), sections = document_sections.len(), "document chunked");
                sections.extend(document_sections);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping document");
                skipped_files.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(IngestionReport {
        sections,
        skipped_files,
    })
}
