use crate::error::InferenceError;
use crate::models::{InferenceOutcome, InferenceRequest, TierKind};
use crate::offline::OfflineResponder;
use crate::traits::{GenerationBackend, GenerationCall};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const JSON_INSTRUCTION: &str =
    "Important: Return ONLY valid JSON, no markdown, no code blocks, just the raw JSON.";

pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_millis(2_000);

/// A backend bound to a model, with an optional second model tried once on failure.
struct Tier {
    kind: TierKind,
    backend: Arc<dyn GenerationBackend>,
    model: String,
    retry_model: Option<String>,
}

impl Tier {
    fn can_take(&self, call: &GenerationCall<'_>) -> bool {
        call.attachment.is_none() || self.kind.accepts_attachments()
    }
}

struct PrimaryTier {
    backend: Arc<dyn GenerationBackend>,
    configured_model: Option<String>,
    resolved_model: RwLock<Option<String>>,
}

impl PrimaryTier {
    /// Returns the model and whether it may be cached.
    async fn resolve_model(&self) -> (String, bool) {
        let cached = self
            .resolved_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(model) = cached {
            return (model, true);
        }
        if let Some(model) = &self.configured_model {
            return (model.clone(), true);
        }

        match self.backend.discover_model().await {
            Ok(model) => {
                info!(backend = self.backend.name(), model = %model, "discovered primary model");
                (model, true)
            }
            Err(error) => {
                warn!(
                    backend = self.backend.name(),
                    %error,
                    "model discovery failed, using default"
                );
                (self.backend.default_model().to_string(), false)
            }
        }
    }

    fn remember(&self, model: &str) {
        *self
            .resolved_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(model.to_string());
    }

    fn invalidate(&self) {
        *self
            .resolved_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Single entry point for generation. Tiers are tried in a fixed order
/// (enterprise, fast, primary, secondary) and the offline responder answers
/// when all of them are absent or fail, so `infer` never errors.
pub struct InferenceOrchestrator {
    enterprise: Option<Tier>,
    fast: Option<Tier>,
    primary: Option<PrimaryTier>,
    secondary: Option<Tier>,
    offline: OfflineResponder,
    rate_limit_backoff: Duration,
}

impl Default for InferenceOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceOrchestrator {
    pub fn new() -> Self {
        Self {
            enterprise: None,
            fast: None,
            primary: None,
            secondary: None,
            offline: OfflineResponder::default(),
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub fn with_enterprise(
        mut self,
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
    ) -> Self {
        self.enterprise = Some(Tier {
            kind: TierKind::Enterprise,
            backend,
            model: model.into(),
            retry_model: None,
        });
        self
    }

    pub fn with_fast(
        mut self,
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        retry_model: Option<String>,
    ) -> Self {
        self.fast = Some(Tier {
            kind: TierKind::Fast,
            backend,
            model: model.into(),
            retry_model,
        });
        self
    }

    /// `model` pins the primary model; without it the backend is asked to
    /// discover one on first use.
    pub fn with_primary(
        mut self,
        backend: Arc<dyn GenerationBackend>,
        model: Option<String>,
    ) -> Self {
        self.primary = Some(PrimaryTier {
            backend,
            configured_model: model,
            resolved_model: RwLock::new(None),
        });
        self
    }

    pub fn with_secondary(
        mut self,
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        retry_model: Option<String>,
    ) -> Self {
        self.secondary = Some(Tier {
            kind: TierKind::Secondary,
            backend,
            model: model.into(),
            retry_model,
        });
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Replaces the responder used when every tier is absent or fails.
    pub fn with_offline(mut self, offline: OfflineResponder) -> Self {
        self.offline = offline;
        self
    }

    pub fn has_backends(&self) -> bool {
        self.enterprise.is_some()
            || self.fast.is_some()
            || self.primary.is_some()
            || self.secondary.is_some()
    }

    /// Model the primary tier will use next, if already resolved.
    pub fn cached_primary_model(&self) -> Option<String> {
        self.primary.as_ref().and_then(|primary| {
            primary
                .resolved_model
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    pub async fn infer(&self, request: &InferenceRequest) -> String {
        self.infer_detailed(request).await.text
    }

    pub async fn infer_detailed(&self, request: &InferenceRequest) -> InferenceOutcome {
        if !self.has_backends() {
            debug!("no generation backend configured");
            return self.degrade(request);
        }

        let prompt = if request.wants_json {
            format!("{}\n\n{}", request.prompt, JSON_INSTRUCTION)
        } else {
            request.prompt.clone()
        };
        let call = GenerationCall {
            prompt: &prompt,
            attachment: request.attachment.as_ref(),
        };

        if let Some(tier) = self.enterprise.as_ref().filter(|tier| tier.can_take(&call)) {
            if let Some(outcome) = self.attempt(tier, call, false).await {
                return finish(outcome, request.wants_json);
            }
        }

        let fast = self
            .fast
            .as_ref()
            .filter(|tier| request.prefer_fast && tier.can_take(&call));
        if let Some(tier) = fast {
            if let Some(outcome) = self.attempt(tier, call, true).await {
                return finish(outcome, request.wants_json);
            }
        }

        if let Some(primary) = &self.primary {
            if let Some(outcome) = self.attempt_primary(primary, call).await {
                return finish(outcome, request.wants_json);
            }
        }

        if let Some(tier) = self.secondary.as_ref().filter(|tier| tier.can_take(&call)) {
            if let Some(outcome) = self.attempt(tier, call, true).await {
                return finish(outcome, request.wants_json);
            }
        }

        warn!("every generation tier failed, degrading to offline output");
        self.degrade(request)
    }

    async fn attempt(
        &self,
        tier: &Tier,
        call: GenerationCall<'_>,
        allow_retry: bool,
    ) -> Option<InferenceOutcome> {
        let backend = tier.backend.name();
        match generate_non_empty(tier.backend.as_ref(), &tier.model, call).await {
            Ok(text) => return Some(outcome(tier.kind, backend, &tier.model, text)),
            Err(error) => {
                warn!(tier = %tier.kind, backend, model = %tier.model, %error, "tier failed")
            }
        }

        let retry_model = tier.retry_model.as_ref().filter(|_| allow_retry)?;
        match generate_non_empty(tier.backend.as_ref(), retry_model, call).await {
            Ok(text) => Some(outcome(tier.kind, backend, retry_model, text)),
            Err(error) => {
                warn!(
                    tier = %tier.kind,
                    backend,
                    model = %retry_model,
                    %error,
                    "tier retry failed"
                );
                None
            }
        }
    }

    async fn attempt_primary(
        &self,
        primary: &PrimaryTier,
        call: GenerationCall<'_>,
    ) -> Option<InferenceOutcome> {
        let backend = primary.backend.name();
        let (model, cacheable) = primary.resolve_model().await;

        let mut result = generate_non_empty(primary.backend.as_ref(), &model, call).await;
        if matches!(&result, Err(error) if error.is_rate_limited()) {
            info!(
                backend,
                backoff_ms = self.rate_limit_backoff.as_millis() as u64,
                "rate limited, retrying once"
            );
            tokio::time::sleep(self.rate_limit_backoff).await;
            result = generate_non_empty(primary.backend.as_ref(), &model, call).await;
        }

        match result {
            Ok(text) => {
                if cacheable {
                    primary.remember(&model);
                }
                Some(outcome(TierKind::Primary, backend, &model, text))
            }
            Err(error) => {
                warn!(tier = %TierKind::Primary, backend, model = %model, %error, "tier failed");
                if !error.is_rate_limited() {
                    primary.invalidate();
                }
                None
            }
        }
    }

    fn degrade(&self, request: &InferenceRequest) -> InferenceOutcome {
        InferenceOutcome {
            text: self.offline.respond(request),
            tier: TierKind::Offline,
            backend: "offline".to_string(),
            model: None,
        }
    }
}

async fn generate_non_empty(
    backend: &dyn GenerationBackend,
    model: &str,
    call: GenerationCall<'_>,
) -> Result<String, InferenceError> {
    let text = backend.generate(model, call).await?;
    if text.trim().is_empty() {
        return Err(InferenceError::EmptyResponse {
            backend: backend.name().to_string(),
        });
    }
    Ok(text)
}

fn outcome(tier: TierKind, backend: &str, model: &str, text: String) -> InferenceOutcome {
    InferenceOutcome {
        text,
        tier,
        backend: backend.to_string(),
        model: Some(model.to_string()),
    }
}

fn finish(mut outcome: InferenceOutcome, wants_json: bool) -> InferenceOutcome {
    if wants_json {
        outcome.text = strip_code_fences(&outcome.text);
    }
    outcome
}

/// Removes a surrounding ```json ... ``` (or bare ```) fence.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };

    let body = match rest.find('\n') {
        Some(newline) if rest[..newline].trim().chars().all(|ch| ch.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest,
    };
    body.trim_end().trim_end_matches("```").trim().to_string()
}
