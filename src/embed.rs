use crate::config::Config;
use crate::model::Entity;
use anyhow::Result;

/// Source of embedding vectors. The default provider is a local
/// deterministic feature-hash projection; swapping in a real sentence
/// model only requires implementing this trait.
pub trait EmbeddingProvider {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic hashed bag-of-tokens embedding. Each lowercased
/// alphanumeric token is hashed into a bucket with a hash-derived sign;
/// the vector is L2-normalized. Produces the zero vector for text with
/// no tokens.
pub struct HashEmbedding {
    dim: usize,
}

impl HashEmbedding {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl EmbeddingProvider for HashEmbedding {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        if self.dim == 0 {
            return Ok(vector);
        }

        for token in tokenize(text) {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let h = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            let bucket = (h % self.dim as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = l2_norm(&vector);
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Embeds entities and queries, degrading provider failures to the
/// zero vector so indexing never halts on a bad embedding.
pub struct Embedder {
    provider: Box<dyn EmbeddingProvider + Send + Sync>,
}

impl Embedder {
    pub fn new(provider: Box<dyn EmbeddingProvider + Send + Sync>) -> Self {
        Self { provider }
    }

    pub fn with_defaults() -> Self {
        Self::new(Box::new(HashEmbedding::new(Config::get().embedding_dim)))
    }

    pub fn dim(&self) -> usize {
        self.provider.dim()
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        match self.provider.embed(text) {
            Ok(vector) => vector,
            Err(err) => {
                eprintln!("cnav: Warning: embedding failed: {err}");
                vec![0.0; self.provider.dim()]
            }
        }
    }

    /// Entity text is the signature and docstring joined by a space;
    /// entities with neither fall back to their name.
    pub fn embed_entity(&self, entity: &Entity) -> Vec<f32> {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(sig) = entity.signature.as_deref() {
            if !sig.is_empty() {
                parts.push(sig);
            }
        }
        if let Some(doc) = entity.docstring.as_deref() {
            if !doc.is_empty() {
                parts.push(doc);
            }
        }
        if parts.is_empty() {
            parts.push(&entity.name);
        }
        self.embed_text(&parts.join(" "))
    }

    pub fn embed_query(&self, query: &str) -> Vec<f32> {
        self.embed_text(query)
    }
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Cosine similarity, or None when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Some(dot / (norm_a * norm_b))
}

/// Pack sign bits MSB-first: one bit per dimension, set where the value
/// is strictly positive. 256 dims collapse to 32 bytes.
pub fn quantize_binary(embedding: &[f32]) -> Vec<u8> {
    let mut packed = vec![0u8; embedding.len().div_ceil(8)];
    for (i, value) in embedding.iter().enumerate() {
        if *value > 0.0 {
            packed[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    packed
}

/// Bit distance between two packed vectors, used as the coarse
/// pre-filter before float re-ranking.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}
