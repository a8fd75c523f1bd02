use crate::config::OpenAiConfig;
use crate::error::SynthesisError;
use crate::models::Passage;
use crate::traits::AnswerSynthesizer;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_MESSAGE: &str =
    "You are a careful assistant that grounds every answer ONLY in the given context.";
const TEMPERATURE: f32 = 0.2;
const MAX_EXTRACTED_SENTENCES: usize = 5;
const NO_ANSWER: &str = "I don't know based on the provided context.";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "which", "who", "whom", "when", "where",
    "why", "how", "does", "did", "this", "that", "these", "those", "with", "from", "into", "about",
    "can", "could", "should", "would", "will", "there", "their", "they", "them", "its", "has",
    "have", "had", "not", "but", "any", "all", "you", "your",
];

/// Renders the grounded prompt: question, numbered context blocks, then
/// answer instructions.
pub fn build_prompt(question: &str, passages: &[Passage]) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(index, passage)| {
            format!(
                "[{}] (source: {} p.{})\n{}",
                index + 1,
                passage.file_name,
                passage.page,
                passage.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful assistant answering questions using ONLY the provided context.\n\
         If the context is insufficient, say you don't know.\n\n\
         Question:\n{question}\n\n\
         Context:\n{context}\n\n\
         Answer in 5-10 concise sentences, cite sources like [1], [2] where relevant."
    )
}

/// Citation numbers in `answer`, sorted and de-duplicated, limited to
/// `1..=passage_count`.
pub fn cited_sources(answer: &str, passage_count: usize) -> Result<Vec<usize>, SynthesisError> {
    let marker = Regex::new(r"\[(\d+)\]")?;
    let cited: BTreeSet<usize> = marker
        .captures_iter(answer)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<usize>().ok())
        .filter(|number| (1..=passage_count).contains(number))
        .collect();
    Ok(cited.into_iter().collect())
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Hosted chat-completions backend (OpenAI or any compatible server).
pub struct OpenAiSynthesizer {
    client: Arc<Client>,
    config: OpenAiConfig,
}

impl OpenAiSynthesizer {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            config,
        }
    }

    /// `None` when `OPENAI_API_KEY` is unset.
    pub fn from_env() -> Result<Option<Self>, SynthesisError> {
        Ok(OpenAiConfig::from_env()?.map(Self::new))
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(
        &self,
        question: &str,
        passages: &[Passage],
    ) -> Result<String, SynthesisError> {
        let url = self.config.chat_completions_url();
        let prompt = build_prompt(question, passages);
        debug!(model = %self.config.model, passages = passages.len(), "requesting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_MESSAGE},
                    {"role": "user", "content": prompt},
                ],
                "temperature": TEMPERATURE,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::BackendResponse {
                backend: url,
                details: format!("{status}: {body}"),
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| SynthesisError::BackendResponse {
                backend: url,
                details: "completion had no message content".to_string(),
            })
    }
}

/// Offline answerer that quotes the retrieved sentences sharing the most
/// terms with the question.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveSynthesizer;

struct Candidate<'a> {
    sentence: &'a str,
    citation: usize,
    overlap: usize,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

fn split_sentences<'a>(text: &'a str, boundary: &Regex) -> Vec<&'a str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for found in boundary.find_iter(text) {
        sentences.push(text[start..found.end()].trim());
        start = found.end();
    }
    sentences.push(text[start..].trim());

    sentences.retain(|sentence| !sentence.is_empty());
    sentences
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn synthesize(
        &self,
        question: &str,
        passages: &[Passage],
    ) -> Result<String, SynthesisError> {
        let boundary = Regex::new(r"[.!?]+\s+")?;
        let wanted = terms(question);

        let mut candidates = Vec::new();
        for (index, passage) in passages.iter().enumerate() {
            for sentence in split_sentences(&passage.text, &boundary) {
                let overlap = terms(sentence).intersection(&wanted).count();
                if overlap > 0 {
                    candidates.push(Candidate {
                        sentence,
                        citation: index + 1,
                        overlap,
                    });
                }
            }
        }

        // Stable sort keeps passage order among equal overlaps.
        candidates.sort_by(|left, right| right.overlap.cmp(&left.overlap));

        let mut seen = HashSet::new();
        let picked: Vec<String> = candidates
            .into_iter()
            .filter(|candidate| seen.insert(candidate.sentence))
            .take(MAX_EXTRACTED_SENTENCES)
            .map(|candidate| format!("{} [{}]", candidate.sentence, candidate.citation))
            .collect();

        if !picked.is_empty() {
            return Ok(picked.join(" "));
        }

        let lead = passages
            .first()
            .and_then(|passage| split_sentences(&passage.text, &boundary).into_iter().next());
        Ok(match lead {
            Some(sentence) => format!("{sentence} [1]"),
            None => NO_ANSWER.to_string(),
        })
    }
}

/// Tries `primary` and answers with `fallback` when it fails. Named
/// `<primary>+<fallback>`.
pub struct FallbackSynthesizer<P, F> {
    name: String,
    primary: P,
    fallback: F,
}

impl<P, F> FallbackSynthesizer<P, F>
where
    P: AnswerSynthesizer,
    F: AnswerSynthesizer,
{
    pub fn new(primary: P, fallback: F) -> Self {
        Self {
            name: format!("{}+{}", primary.name(), fallback.name()),
            primary,
            fallback,
        }
    }
}

#[async_trait]
impl<P, F> AnswerSynthesizer for FallbackSynthesizer<P, F>
where
    P: AnswerSynthesizer + Send + Sync,
    F: AnswerSynthesizer + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(
        &self,
        question: &str,
        passages: &[Passage],
    ) -> Result<String, SynthesisError> {
        match self.primary.synthesize(question, passages).await {
            Ok(answer) => {
                debug!(answered_by = self.primary.name(), "synthesized answer");
                Ok(answer)
            }
            Err(error) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %error,
                    "answer synthesis failed, using fallback"
                );
                let answer = self.fallback.synthesize(question, passages).await?;
                debug!(answered_by = self.fallback.name(), "synthesized answer");
                Ok(answer)
            }
        }
    }
}
