use crate::error::IngestError;
use crate::models::Section;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const CORPUS_FILE_NAME: &str = "sections.json";

/// The section table shared by the vector index build and the graph build.
#[derive(Debug, Clone, Default)]
pub struct SectionCorpus {
    sections: Vec<Section>,
    by_id: HashMap<String, usize>,
}

impl SectionCorpus {
    pub fn new(sections: Vec<Section>) -> Result<Self, IngestError> {
        let mut by_id = HashMap::with_capacity(sections.len());
        for (position, section) in sections.iter().enumerate() {
            if by_id.insert(section.id.clone(), position).is_some() {
                return Err(IngestError::InvalidArgument(format!(
                    "duplicate section id {}",
                    section.id
                )));
            }
        }
        Ok(Self { sections, by_id })
    }

    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let raw = fs::read(path)?;
        let sections: Vec<Section> = serde_json::from_slice(&raw)?;
        Self::new(sections)
    }

    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(&self.sections)?)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Section> {
        self.by_id.get(id).map(|position| &self.sections[*position])
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}
