use crate::embeddings::EmbeddingProvider;
use crate::error::AskError;
use crate::models::Passage;
use crate::store::VectorStore;
use crate::synthesis::cited_sources;
use crate::traits::AnswerSynthesizer;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Retrieved passages, best first; citation `[n]` refers to `passages[n - 1]`.
    pub passages: Vec<Passage>,
    pub cited: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// Retrieval found nothing to ground an answer on.
    NoContext,
    Answered(Answer),
}

/// Retrieval followed by grounded answer synthesis.
pub struct AnswerCoordinator<E, S> {
    store: VectorStore<E>,
    synthesizer: S,
}

impl<E, S> AnswerCoordinator<E, S>
where
    E: EmbeddingProvider,
    S: AnswerSynthesizer + Send + Sync,
{
    pub fn new(store: VectorStore<E>, synthesizer: S) -> Self {
        Self { store, synthesizer }
    }

    pub fn into_store(self) -> VectorStore<E> {
        self.store
    }

    pub async fn ask(&self, question: &str, top_k: usize) -> Result<AskOutcome, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        let passages = self.store.query(question, top_k)?;
        if passages.is_empty() {
            info!(top_k, "no passages retrieved");
            return Ok(AskOutcome::NoContext);
        }

        let text = self.synthesizer.synthesize(question, &passages).await?;
        let cited = cited_sources(&text, passages.len())?;

        info!(
            synthesizer = self.synthesizer.name(),
            passages = passages.len(),
            cited = cited.len(),
            "answered question"
        );

        Ok(AskOutcome::Answered(Answer {
            text,
            passages,
            cited,
        }))
    }
}
