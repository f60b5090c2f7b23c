/*!
 * Provider implementations for the text-generation backends.
 *
 * This module contains client implementations behind one trait:
 * - Ollama: Local LLM server
 * - Mock: Scripted in-memory provider for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// A single completion request, independent of the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model name
    pub model: String,
    /// User prompt
    pub prompt: String,
    /// Optional system message
    pub system: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Ask the backend to constrain the answer to JSON
    pub json: bool,
}

impl CompletionRequest {
    /// Create a new request for `model`
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            temperature: None,
            json: false,
        }
    }

    /// Set the system message
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Request a JSON answer
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Text returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Generated text
    pub text: String,
    /// Number of prompt tokens, when the backend reports it
    pub prompt_tokens: Option<u64>,
    /// Number of generated tokens, when the backend reports it
    pub completion_tokens: Option<u64>,
}

/// Common trait for all LLM providers
///
/// The agents hold providers as `Arc<dyn Provider>`, so implementations are
/// interchangeable at runtime.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Complete a request using this provider
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

pub mod mock;
pub mod ollama;
