use crate::error::IngestError;
use crate::models::{Concept, Mention, Section};
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MAX_PHRASE_LEN: usize = 3;
pub const DEFAULT_MAX_PHRASES: usize = 12;

const STOP_WORDS: &str = "
a about above after again against all am an and any are as at be because been before being below
between both but by could did do does doing down during each few for from further had has have
having he her here hers herself him himself his how i if in into is it its itself just me more
most my myself no nor not of off on once only or other our ours ourselves out over own same she
should so some such than that the their theirs them themselves then there these they this those
through to too under until up very was we were what when where which while who whom why with you
your yours yourself yourselves
";

/// Extracts representative phrases from free text.
#[derive(Debug, Clone)]
pub struct ConceptExtractor {
    word: Regex,
    stop_words: HashSet<&'static str>,
    max_phrase_len: usize,
    max_phrases: usize,
}

impl ConceptExtractor {
    pub fn new(max_phrase_len: usize, max_phrases: usize) -> Result<Self, IngestError> {
        Ok(Self {
            word: Regex::new(r"[a-z]{2,}")?,
            stop_words: STOP_WORDS.split_whitespace().collect(),
            max_phrase_len: max_phrase_len.max(1),
            max_phrases,
        })
    }

    /// Ranks n-grams longest first, then by frequency, then lexicographically,
    /// and skips any phrase contained in one already accepted.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = self
            .word
            .find_iter(&lowered)
            .map(|found| found.as_str())
            .filter(|token| !self.stop_words.contains(token))
            .collect();

        if tokens.is_empty() || self.max_phrases == 0 {
            return Vec::new();
        }

        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for size in 1..=self.max_phrase_len.min(tokens.len()) {
            for window in tokens.windows(size) {
                counts.entry(window.join(" ")).or_insert((size, 0)).1 += 1;
            }
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(phrase, (size, count))| (phrase, size, count))
            .collect();
        ranked.sort_by(|left, right| {
            right
                .1
                .cmp(&left.1)
                .then_with(|| right.2.cmp(&left.2))
                .then_with(|| left.0.cmp(&right.0))
        });

        let mut picked: Vec<String> = Vec::new();
        for (phrase, _, _) in ranked {
            if picked.len() >= self.max_phrases {
                break;
            }
            if picked.iter().any(|accepted| accepted.contains(phrase.as_str())) {
                continue;
            }
            picked.push(phrase);
        }

        picked
    }

    pub fn mentions(&self, section: &Section) -> Vec<Mention> {
        self.extract(&section.text)
            .into_iter()
            .map(|name| Mention {
                section_id: section.id.clone(),
                concept: Concept::new(name),
            })
            .collect()
    }
}

pub fn extract_concepts(
    text: &str,
    max_phrase_len: usize,
    max_phrases: usize,
) -> Result<Vec<String>, IngestError> {
    Ok(ConceptExtractor::new(max_phrase_len, max_phrases)?.extract(text))
}

pub fn extract_default_concepts(text: &str) -> Result<Vec<String>, IngestError> {
    extract_concepts(text, DEFAULT_MAX_PHRASE_LEN, DEFAULT_MAX_PHRASES)
}
