use crate::blocking::run_blocking;
use crate::config::EmbeddingEndpointConfig;
use crate::error::EmbedError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT: usize = 384;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const LOCAL_MODEL_PREFIX: &str = "char-ngram";

/// Maps texts to fixed-length vectors, one per input and in input order.
///
/// The vector store re-normalizes whatever it receives, so implementations
/// are not required to return unit-length vectors.
pub trait EmbeddingProvider {
    fn model_name(&self) -> String;
    fn dimensions(&self) -> usize;
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<P> {
    fn model_name(&self) -> String {
        (**self).model_name()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).embed(texts)
    }
}

/// Scales `vector` to unit length in place. Zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Hashed character trigrams. Deterministic and offline, which makes it the
/// default for tests and small corpora.
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

impl CharacterNgramEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        let buckets = vector.len() as u64;
        if chars.len() < 3 {
            vector[(fnv1a(&lowered) % buckets) as usize] += 1.0;
        } else {
            for window in chars.windows(3) {
                let token = window.iter().collect::<String>();
                vector[(fnv1a(&token) % buckets) as usize] += 1.0;
            }
        }

        normalize(&mut vector);
        vector
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

impl EmbeddingProvider for CharacterNgramEmbedder {
    fn model_name(&self) -> String {
        format!("{LOCAL_MODEL_PREFIX}-{}", self.dimensions)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, llama.cpp,
/// text-embeddings-inference). Safe to use from inside a tokio runtime.
pub struct HttpEmbedder {
    config: EmbeddingEndpointConfig,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    /// Embeds a sample string to learn the model's output dimension.
    pub fn connect(
        config: EmbeddingEndpointConfig,
        model: impl Into<String>,
    ) -> Result<Self, EmbedError> {
        let mut embedder = Self {
            config,
            model: model.into(),
            dimensions: 0,
        };

        let sample = embedder.request(&["dimension check"])?;
        embedder.dimensions = sample.first().map(Vec::len).unwrap_or_default();
        if embedder.dimensions == 0 {
            return Err(EmbedError::BackendResponse {
                backend: embedder.config.embeddings_url(),
                details: "sample request returned an empty embedding".to_string(),
            });
        }

        info!(
            model = %embedder.model,
            dimensions = embedder.dimensions,
            endpoint = %embedder.config.endpoint,
            "connected to embedding endpoint"
        );
        Ok(embedder)
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = self.config.embeddings_url();
        let payload = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        // The blocking client owns a runtime; it must be built and dropped
        // off the async workers.
        let response = run_blocking(|| {
            let client = Client::new();
            let mut request = client.post(&url).json(&payload);
            if let Some(api_key) = &self.config.api_key {
                request = request.bearer_auth(api_key);
            }
            let response = request.send()?;

            if !response.status().is_success() {
                return Err(EmbedError::BackendResponse {
                    backend: url.clone(),
                    details: response.status().to_string(),
                });
            }

            Ok(response.json::<EmbeddingsResponse>()?)
        })?;

        order_embeddings(response, texts.len())
    }
}

fn order_embeddings(
    response: EmbeddingsResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if response.data.len() != expected {
        return Err(EmbedError::CountMismatch {
            expected,
            actual: response.data.len(),
        });
    }

    let mut data = response.data;
    if data.iter().all(|datum| datum.index.is_some()) {
        data.sort_by_key(|datum| datum.index);
    }

    Ok(data.into_iter().map(|datum| datum.embedding).collect())
}

impl EmbeddingProvider for HttpEmbedder {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch = texts.len(), "requesting embeddings");
        let vectors = self.request(texts)?;

        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimensions) {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

/// Resolves a CLI model name to a provider.
///
/// `char-ngram` and `char-ngram-<dims>` stay local; anything else is sent to
/// the configured embedding endpoint.
pub fn provider_from_model_name(
    name: &str,
    endpoint: Option<EmbeddingEndpointConfig>,
) -> Result<Box<dyn EmbeddingProvider>, EmbedError> {
    let name = name.trim();

    if name == LOCAL_MODEL_PREFIX {
        return Ok(Box::new(CharacterNgramEmbedder::default()));
    }

    if let Some(suffix) = name.strip_prefix(LOCAL_MODEL_PREFIX) {
        let dimensions = suffix
            .strip_prefix('-')
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|dimensions| *dimensions > 0)
            .ok_or_else(|| EmbedError::InvalidModel(name.to_string()))?;
        return Ok(Box::new(CharacterNgramEmbedder { dimensions }));
    }

    if name.is_empty() {
        return Err(EmbedError::InvalidModel(name.to_string()));
    }

    let endpoint = endpoint.ok_or_else(|| EmbedError::MissingEndpoint(name.to_string()))?;
    Ok(Box::new(HttpEmbedder::connect(endpoint, name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|value| value * value).sum::<f32>().sqrt()
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed(&["Hydraulic pressure and flow"]).unwrap();
        let second = embedder.embed(&["Hydraulic pressure and flow"]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_unit_vectors_of_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vectors = embedder.embed(&["abc", "ok", ""]).unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|vector| vector.len() == 32));
        assert!((norm(&vectors[0]) - 1.0).abs() < 1e-5);
        assert!((norm(&vectors[1]) - 1.0).abs() < 1e-5);
        assert_eq!(norm(&vectors[2]), 0.0);
    }

    #[test]
    fn normalize_scales_and_skips_zero() {
        let mut vector = vec![3.0, 4.0];
        normalize(&mut vector);
        assert!((vector[0] - 0.6).abs() < 1e-6);
        assert!((vector[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn local_model_names_resolve_without_network() {
        let provider = provider_from_model_name("char-ngram", None).unwrap();
        assert_eq!(provider.dimensions(), DEFAULT_EMBEDDING_DIMENSIONS);

        let provider = provider_from_model_name("char-ngram-64", None).unwrap();
        assert_eq!(provider.dimensions(), 64);
        assert_eq!(provider.model_name(), "char-ngram-64");
        assert_eq!(provider.embed(&["boxed"]).unwrap()[0].len(), 64);

        assert!(matches!(
            provider_from_model_name("char-ngram-zero", None),
            Err(EmbedError::InvalidModel(_))
        ));
    }

    #[test]
    fn remote_model_requires_endpoint() {
        let result = provider_from_model_name("sentence-transformers/all-MiniLM-L6-v2", None);
        assert!(matches!(result, Err(EmbedError::MissingEndpoint(_))));
    }

    fn unreachable_endpoint() -> EmbeddingEndpointConfig {
        EmbeddingEndpointConfig::new("http://127.0.0.1:9/v1", None).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_endpoint_is_an_error_on_multi_thread_runtime() {
        let result = provider_from_model_name("some-remote-model", Some(unreachable_endpoint()));
        assert!(matches!(result, Err(EmbedError::Http(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error_on_current_thread_runtime() {
        let result = provider_from_model_name("some-remote-model", Some(unreachable_endpoint()));
        assert!(matches!(result, Err(EmbedError::Http(_))));
    }

    #[test]
    fn unreachable_endpoint_is_an_error_outside_runtime() {
        let result = HttpEmbedder::connect(unreachable_endpoint(), "some-remote-model");
        assert!(matches!(result, Err(EmbedError::Http(_))));
    }

    #[test]
    fn response_is_reordered_by_index_and_counted() {
        let response = EmbeddingsResponse {
            data: vec![
                EmbeddingDatum {
                    embedding: vec![2.0],
                    index: Some(1),
                },
                EmbeddingDatum {
                    embedding: vec![1.0],
                    index: Some(0),
                },
            ],
        };
        assert_eq!(order_embeddings(response, 2).unwrap(), vec![vec![1.0], vec![2.0]]);

        let short = EmbeddingsResponse { data: Vec::new() };
        assert!(matches!(
            order_embeddings(short, 1),
            Err(EmbedError::CountMismatch { expected: 1, actual: 0 })
        ));
    }
}
