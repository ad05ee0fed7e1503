use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

/// Whole-document text, one entry per page joined with `\n`.
///
/// A page whose text cannot be decoded contributes an empty entry so page
/// boundaries stay in place; only an unloadable document is an error.
pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let pages: Vec<String> = document
        .get_pages()
        .into_keys()
        .map(|page_no| {
            document.extract_text(&[page_no]).unwrap_or_else(|error| {
                debug!(path = %path.display(), page_no, %error, "page has no decodable text");
                String::new()
            })
        })
        .collect();

    Ok(pages.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(
            extract_pdf_text(&path),
            Err(IngestError::PdfParse(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let result = extract_pdf_text(&dir.path().join("absent.pdf"));
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }
}
