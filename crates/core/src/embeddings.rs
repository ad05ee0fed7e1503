pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Text to unit-length vector. Every vector produced by one embedder has the same length.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;

    fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn inner_product(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Hashed character-trigram embedder. Deterministic and model-free.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for byte in window.iter().collect::<String>().bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }
}
