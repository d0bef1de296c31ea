// src/sampler/mod.rs — Language-model sampling
//
// `Sampler` is what sampler workers call once per batch. `LlmSampler` turns
// each prompt into a chat request, issues the whole batch concurrently and
// trims every reply down to a function body.

use std::sync::Arc;

use async_trait::async_trait;
use minijinja::Environment;

use crate::infra::config::SamplerConfig;
use crate::program::trim_sample;
use crate::provider::{ChatRequest, Message, ModelProvider, ModelRef};

/// Produces one completion per prompt (fewer if some requests fail).
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn draw_samples(&self, prompts: &[String]) -> anyhow::Result<Vec<String>>;
}

pub const DEFAULT_INSTRUCTION: &str = "\
Complete the last function in the following Python program. \
Write an improved version of the previous versions shown. \
Only return the body of the new function, without the `def` line, explanations or tests.

{{ code }}";

pub struct LlmSampler {
    provider: Arc<dyn ModelProvider>,
    model: String,
    instruction: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    env: Environment<'static>,
}

impl LlmSampler {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            temperature: None,
            max_tokens: None,
            env: Environment::new(),
        }
    }

    pub fn from_config(
        provider: Arc<dyn ModelProvider>,
        model: &ModelRef,
        config: &SamplerConfig,
    ) -> anyhow::Result<Self> {
        let mut sampler = Self::new(provider, model.model.clone());
        sampler.temperature = config.temperature;
        sampler.max_tokens = (config.max_tokens > 0).then_some(config.max_tokens);
        if let Some(instruction) = &config.instruction {
            sampler = sampler.with_instruction(instruction)?;
        }
        Ok(sampler)
    }

    /// Replace the instruction template. `{{ code }}` is the prompt program.
    pub fn with_instruction(mut self, instruction: &str) -> anyhow::Result<Self> {
        self.instruction = instruction.to_string();
        self.render("")?;
        Ok(self)
    }

    pub fn render(&self, code: &str) -> anyhow::Result<String> {
        Ok(self
            .env
            .render_str(&self.instruction, minijinja::context! { code => code })?)
    }

    async fn draw_one(&self, prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(self.render(prompt)?)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: None,
        };
        let response = self.provider.chat(request).await?;
        tracing::trace!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            total_tokens = response.usage.total(),
            "Sample received"
        );
        // Untrimmable replies are passed through; conversion drops them later
        Ok(trim_sample(&response.content).unwrap_or(response.content))
    }
}

#[async_trait]
impl Sampler for LlmSampler {
    async fn draw_samples(&self, prompts: &[String]) -> anyhow::Result<Vec<String>> {
        let results = futures::future::join_all(prompts.iter().map(|p| self.draw_one(p))).await;

        let mut samples = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    tracing::warn!("Sample request failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if samples.is_empty() => Err(e.context("every sample request in the batch failed")),
            _ => Ok(samples),
        }
    }
}
