//! Language-model interaction: one request in, one reply string out.
//!
//! The pipeline talks to models only through [`CompletionModel`], so the
//! two stages that need a model ([`super::student`] and
//! [`super::narrative`]) never see a provider type. Production wraps an
//! edgequake-llm provider in [`LlmProviderModel`]; tests script replies with
//! [`ScriptedModel`].
//!
//! There is no retry loop here. A failed call becomes a
//! [`GradeLensError::ModelTimeout`] or [`GradeLensError::ModelUnavailable`]
//! tagged with the stage, and the caller decides whether to resubmit.

use crate::config::{AnalysisConfig, DEFAULT_MODEL};
use crate::error::GradeLensError;
use crate::progress::Stage;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One chat completion: a system message plus one user prompt.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub stage: Stage,
    pub system: String,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// Something that answers a prompt with text.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GradeLensError>;
}

/// [`CompletionModel`] backed by an edgequake-llm provider.
pub struct LlmProviderModel {
    provider: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl LlmProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Resolve the configured provider and wrap it.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, GradeLensError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(
            provider,
            Duration::from_secs(config.api_timeout_secs),
        ))
    }
}

#[async_trait]
impl CompletionModel for LlmProviderModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GradeLensError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.prompt.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        let response = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!("{}: no reply after {:?}", request.stage, self.timeout);
                return Err(GradeLensError::ModelTimeout {
                    stage: request.stage,
                    secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(e)) => {
                warn!("{}: model call failed: {}", request.stage, e);
                return Err(GradeLensError::ModelUnavailable {
                    stage: request.stage,
                    message: e.to_string(),
                });
            }
            Ok(Ok(response)) => response,
        };

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.stage,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Replays canned replies in order. For tests and offline demos.
///
/// Once the script runs out every further call fails with
/// [`GradeLensError::ModelUnavailable`].
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, GradeLensError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failed call.
    pub fn fail(self, err: GradeLensError) -> Self {
        self.push(Err(err))
    }

    fn push(self, item: Result<String, GradeLensError>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(item);
        }
        self
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GradeLensError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(request.clone());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| {
            Err(GradeLensError::ModelUnavailable {
                stage: request.stage,
                message: "no scripted reply left".to_string(),
            })
        })
    }
}

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, GradeLensError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        GradeLensError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, GradeLensError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| GradeLensError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set PERPLEXITY_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{LLMResponse, LlmError, MockProvider};

    fn request(stage: Stage) -> CompletionRequest {
        CompletionRequest {
            stage,
            system: "sys".into(),
            prompt: "hello".into(),
            max_tokens: 10,
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new().reply("first").reply("second");
        assert_eq!(model.complete(&request(Stage::ExtractStudent)).await.unwrap(), "first");
        assert_eq!(model.complete(&request(Stage::AnalyzeNarrative)).await.unwrap(), "second");
        assert_eq!(model.calls(), 2);
        assert_eq!(model.requests()[1].stage, Stage::AnalyzeNarrative);
    }

    #[tokio::test]
    async fn scripted_model_exhaustion_is_unavailable() {
        let model = ScriptedModel::new();
        let err = model.complete(&request(Stage::AnalyzeNarrative)).await.unwrap_err();
        assert!(matches!(
            err,
            GradeLensError::ModelUnavailable { stage: Stage::AnalyzeNarrative, .. }
        ));
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let model = ScriptedModel::new().fail(GradeLensError::ModelTimeout {
            stage: Stage::ExtractStudent,
            secs: 60,
        });
        let err = model.complete(&request(Stage::ExtractStudent)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    /// Provider that either never answers in time or always errors.
    struct StubProvider {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(LlmError::ApiError("upstream 503".into()))
            } else {
                Ok(LLMResponse::new("late", "stub-model"))
            }
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete("").await
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = Arc::new(StubProvider {
            delay: Duration::from_secs(30),
            fail: false,
        });
        let model = LlmProviderModel::new(provider, Duration::from_millis(50));

        let start = Instant::now();
        let err = model.complete(&request(Stage::ExtractStudent)).await.unwrap_err();
        assert!(matches!(
            err,
            GradeLensError::ModelTimeout { stage: Stage::ExtractStudent, .. }
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn provider_error_is_unavailable() {
        let provider = Arc::new(StubProvider {
            delay: Duration::ZERO,
            fail: true,
        });
        let model = LlmProviderModel::new(provider, Duration::from_secs(5));

        let err = model.complete(&request(Stage::AnalyzeNarrative)).await.unwrap_err();
        match err {
            GradeLensError::ModelUnavailable { stage, message } => {
                assert_eq!(stage, Stage::AnalyzeNarrative);
                assert!(message.contains("upstream 503"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_reply_passes_through() {
        let provider = Arc::new(MockProvider::new());
        provider.add_response("{\"a\":1}").await;
        let model = LlmProviderModel::new(provider, Duration::from_secs(5));

        let reply = model.complete(&request(Stage::ExtractStudent)).await.unwrap();
        assert_eq!(reply, "{\"a\":1}");
    }
}
