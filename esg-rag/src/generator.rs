//! Grounded answer generation.
//!
//! The [`AnswerGenerator`] turns retrieved passages into a grounding context,
//! wraps it with the question in a single prompt, and makes exactly one call
//! to the configured [`GenerationProvider`]. There is no caching and no retry.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::document::ScoredResult;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

const NO_CONTEXT: &str = "(no relevant passages were found)";

const DEFAULT_TEMPLATE: &str = "You are an assistant answering questions about ESG (environmental, social and governance) reports.
Use only the context below to answer the question. If the context does not contain the answer, say that you don't know instead of guessing.
Cite figures exactly as they appear in the context.

Context:
{context}

Question: {question}

Answer:";

/// The text produced by a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
}

/// Builds grounded prompts and calls the generation provider.
#[derive(Clone)]
pub struct AnswerGenerator {
    provider: Arc<dyn GenerationProvider>,
    template: String,
}

impl AnswerGenerator {
    /// Create a generator using the default ESG prompt template.
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider, template: DEFAULT_TEMPLATE.to_string() }
    }

    /// Replace the prompt template. `{context}` and `{question}` are substituted.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if either placeholder is missing.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in ["{context}", "{question}"] {
            if !template.contains(placeholder) {
                return Err(RagError::Config(format!("prompt template is missing {placeholder}")));
            }
        }
        self.template = template;
        Ok(self)
    }

    /// The underlying provider.
    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// Concatenate `retrieved` in the given order into a grounding context.
    ///
    /// Each passage is numbered and followed by its metadata; passages are
    /// separated by blank lines.
    pub fn build_context(retrieved: &[ScoredResult]) -> String {
        if retrieved.is_empty() {
            return NO_CONTEXT.to_string();
        }

        let mut context = String::new();
        for (i, result) in retrieved.iter().enumerate() {
            if i > 0 {
                context.push_str("\n\n");
            }
            let _ = write!(context, "[{}] {}", i + 1, result.content.trim());
            if !result.metadata.is_empty() {
                let source = result
                    .metadata
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(context, "\n(source: {source})");
            }
        }
        context
    }

    /// Render the full prompt for `question` over `retrieved`.
    ///
    /// Placeholders are filled in one pass over the template, so text coming
    /// from passages or the question is never substituted again.
    pub fn build_prompt(&self, question: &str, retrieved: &[ScoredResult]) -> String {
        let context = Self::build_context(retrieved);
        let mut prompt = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            prompt.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix("{context}") {
                prompt.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{question}") {
                prompt.push_str(question);
                rest = after;
            } else {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
        prompt.push_str(rest);
        prompt
    }

    /// Generate an answer to `question` grounded in `retrieved`.
    ///
    /// `question` may already carry a language instruction; it is placed in
    /// the prompt verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the provider fails or returns an
    /// empty completion.
    pub async fn generate(&self, question: &str, retrieved: &[ScoredResult], model: &str) -> Result<GeneratedAnswer> {
        let prompt = self.build_prompt(question, retrieved);
        let provider = self.provider.provider_name();

        let text = self.provider.complete(&prompt, model).await.map_err(|e| {
            error!(provider, model, error = %e, "generation failed");
            match e {
                RagError::Generation { .. } => e,
                other => RagError::generation(provider, other.to_string()),
            }
        })?;

        if text.trim().is_empty() {
            error!(provider, model, "generation returned an empty answer");
            return Err(RagError::generation(provider, format!("model '{model}' returned an empty answer")));
        }

        info!(provider, model, context_passages = retrieved.len(), answer_len = text.len(), "generated answer");
        Ok(GeneratedAnswer { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;
    use crate::language::ResponseLanguage;
    use crate::mock::{EchoGenerationProvider, FailingGenerationProvider};

    fn result(content: &str, doc: &str, score: f32) -> ScoredResult {
        let mut metadata = Metadata::new();
        metadata.insert("doc".to_string(), doc.into());
        ScoredResult { content: content.to_string(), metadata, score }
    }

    #[test]
    fn context_keeps_relevance_order() {
        let context = AnswerGenerator::build_context(&[
            result("Scope 1 emissions fell 10%", "A", 0.9),
            result("Scope 2 emissions were flat", "B", 0.4),
        ]);

        assert_eq!(
            context,
            "[1] Scope 1 emissions fell 10%\n(source: doc=A)\n\n[2] Scope 2 emissions were flat\n(source: doc=B)"
        );
    }

    #[test]
    fn placeholders_inside_passages_are_left_alone() {
        let generator = AnswerGenerator::new(Arc::new(EchoGenerationProvider::new()));
        let retrieved = [result("Target set in {question} section", "A", 0.7)];

        let prompt = generator.build_prompt("SECRET_Q", &retrieved);

        assert!(prompt.contains(&AnswerGenerator::build_context(&retrieved)));
        assert!(prompt.contains("[1] Target set in {question} section"));
        assert_eq!(prompt.matches("SECRET_Q").count(), 1);
    }

    #[test]
    fn question_containing_context_placeholder_is_verbatim() {
        let generator = AnswerGenerator::new(Arc::new(EchoGenerationProvider::new()))
            .with_template("{question} | {context} {other}")
            .unwrap();

        let prompt = generator.build_prompt("what is {context}?", &[]);
        assert_eq!(prompt, format!("what is {{context}}? | {NO_CONTEXT} {{other}}"));
    }

    #[test]
    fn empty_retrieval_says_so() {
        assert_eq!(AnswerGenerator::build_context(&[]), NO_CONTEXT);
    }

    #[tokio::test]
    async fn one_call_with_question_and_context() {
        let provider = Arc::new(EchoGenerationProvider::new());
        let generator = AnswerGenerator::new(provider.clone());
        let question = ResponseLanguage::French.apply("What happened to Scope 1 emissions?");

        let answer = generator
            .generate(&question, &[result("Scope 1 emissions fell 10%", "A", 0.8)], "gemini-2.5-flash")
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gemini-2.5-flash");
        assert!(calls[0].prompt.contains("Réponds toujours en français"));
        assert!(calls[0].prompt.contains("Scope 1 emissions fell 10%"));
        assert!(answer.text.contains("Scope 1 emissions fell 10%"));
    }

    #[tokio::test]
    async fn provider_failure_is_a_generation_error() {
        let generator = AnswerGenerator::new(Arc::new(FailingGenerationProvider));
        let err = generator.generate("q", &[], "m").await.unwrap_err();
        assert!(matches!(err, RagError::Generation { .. }));
    }

    #[test]
    fn custom_template_requires_placeholders() {
        let generator = AnswerGenerator::new(Arc::new(EchoGenerationProvider::new()));
        assert!(generator.clone().with_template("no placeholders").is_err());

        let generator = generator.with_template("Q: {question}\nC: {context}").unwrap();
        assert_eq!(generator.build_prompt("why?", &[]), format!("Q: why?\nC: {NO_CONTEXT}"));
    }
}
