//! Embedding provider boundary.  A remote HTTP provider when a key is
//! configured, otherwise a deterministic hash-derived vector so the memory
//! substrate keeps working offline.  Every vector leaving this module has
//! exactly the declared dimension.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::warn;

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_EMBED_CHARS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct EmbedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dim: usize,
}

impl EmbedClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, dim: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: "text-embedding-3-small".to_string(),
            dim,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_remote(&self) -> bool {
        self.api_key.is_some()
    }

    /// Embed text.  Provider failures fall back to the hash embedding; the
    /// result always has the declared dimension.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let text = clip(text);
        if text.trim().is_empty() {
            return vec![0.0; self.dim];
        }

        if let Some(api_key) = self.api_key.as_deref() {
            match self.embed_remote(&text, api_key).await {
                Ok(vector) => return fit_dimension(vector, self.dim),
                Err(err) => {
                    warn!(%err, "embedding provider failed; using hash fallback");
                }
            }
        }

        hash_embedding(&text, self.dim)
    }

    async fn embed_remote(&self, text: &str, api_key: &str) -> anyhow::Result<Vec<f32>> {
        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .timeout(EMBED_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let vector = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|e| e.get("embedding"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("response missing embedding"))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Vec<f32>>();

        if vector.is_empty() {
            anyhow::bail!("empty embedding in response");
        }
        Ok(vector)
    }
}

fn clip(text: &str) -> String {
    if text.chars().count() > MAX_EMBED_CHARS {
        text.chars().take(MAX_EMBED_CHARS).collect()
    } else {
        text.to_string()
    }
}

/// Deterministic offline embedding: SHA-256 bytes of the normalised text
/// plus per-word hashes, normalised into [-1, 1].  The same text always
/// maps to the same vector.
pub fn hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    let normalized = text.to_lowercase();
    let normalized = normalized.trim();

    let digest = Sha256::digest(normalized.as_bytes());
    let mut vector: Vec<f32> = digest
        .iter()
        .map(|b| (*b as f32 - 128.0) / 128.0)
        .collect();

    for word in normalized.split_whitespace().take(50) {
        if vector.len() >= dim {
            break;
        }
        let word_digest = Sha256::digest(word.as_bytes());
        vector.extend(
            word_digest
                .iter()
                .take(4)
                .map(|b| (*b as f32 - 128.0) / 128.0),
        );
    }

    fit_dimension(vector, dim)
}

/// Pad (cyclic, decayed) or truncate a vector to exactly `dim` entries.
pub fn fit_dimension(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    if vector.len() > dim {
        vector.truncate(dim);
        return vector;
    }
    if vector.is_empty() {
        return vec![0.0; dim];
    }
    while vector.len() < dim {
        let idx = vector.len() % vector.len().min(32).max(1);
        let value = vector[idx] * 0.9;
        vector.push(value);
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic() {
        let a = hash_embedding("the same text", 384);
        let b = hash_embedding("the same text", 384);
        let c = hash_embedding("different text", 384);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn every_vector_has_declared_dimension() {
        for dim in [8, 384, 768] {
            assert_eq!(hash_embedding("x", dim).len(), dim);
            assert_eq!(hash_embedding("a much longer piece of text with words", dim).len(), dim);
        }
    }

    #[test]
    fn fit_dimension_pads_and_truncates() {
        assert_eq!(fit_dimension(vec![1.0; 100], 10).len(), 10);
        assert_eq!(fit_dimension(vec![1.0; 10], 100).len(), 100);
        assert_eq!(fit_dimension(Vec::new(), 16), vec![0.0; 16]);
    }

    #[test]
    fn values_stay_in_unit_range() {
        let vector = hash_embedding("range check", 768);
        assert!(vector.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn offline_client_embeds_via_hash() {
        let client = EmbedClient::new("https://example.invalid", None, 64);
        let vector = client.embed("hello world").await;
        assert_eq!(vector.len(), 64);
        assert_eq!(vector, hash_embedding("hello world", 64));
    }

    #[tokio::test]
    async fn empty_text_maps_to_zero_vector() {
        let client = EmbedClient::new("https://example.invalid", None, 32);
        assert_eq!(client.embed("   ").await, vec![0.0; 32]);
    }
}
