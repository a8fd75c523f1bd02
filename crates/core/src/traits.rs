use crate::error::SynthesisError;
use crate::models::Passage;
use async_trait::async_trait;

/// Turns a question plus retrieved passages into a grounded answer.
///
/// Passages arrive best first and are cited as `[1]`, `[2]`, ... in that
/// order.
#[async_trait]
pub trait AnswerSynthesizer {
    fn name(&self) -> &str;

    async fn synthesize(
        &self,
        question: &str,
        passages: &[Passage],
    ) -> Result<String, SynthesisError>;
}

#[async_trait]
impl<S: AnswerSynthesizer + Send + Sync + ?Sized> AnswerSynthesizer for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn synthesize(
        &self,
        question: &str,
        passages: &[Passage],
    ) -> Result<String, SynthesisError> {
        (**self).synthesize(question, passages).await
    }
}
