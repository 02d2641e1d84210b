//! Generation port: the abstraction over language-model backends.
//!
//! The control loop sends a prompt and a system prompt (with tool
//! definitions already injected) and receives the model's text together with
//! the invocations it asked for. Provider clients and fallback chains live in
//! `stepwise-providers`; the loop only ever sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GenerationError;
use crate::run::{Invocation, ModelTierSet};

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What one generation call produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// The model's response text.
    pub response: String,

    /// Requested invocations, in the order the model listed them.
    pub invocations: Vec<Invocation>,

    /// Monetary cost of the call, added to the run's running total.
    #[serde(default)]
    pub cost: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl GenerationResult {
    pub fn new(response: impl Into<String>, invocations: Vec<Invocation>) -> Self {
        Self {
            response: response.into(),
            invocations,
            cost: 0.0,
            usage: None,
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// The model-calling capability.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// A human-readable name (e.g. "DeepSeek R1 (Together, Fireworks)").
    fn display_name(&self) -> &str;

    /// Whether credentials/endpoints are present so a call can be attempted.
    fn is_configured(&self) -> bool;

    /// Generate the next response.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, GenerationError>;
}

/// Generation capabilities grouped by difficulty.
#[derive(Clone)]
pub struct ModelTiers {
    pub easy: Arc<dyn GenerationPort>,
    pub medium: Arc<dyn GenerationPort>,
    pub hard: Arc<dyn GenerationPort>,
    pub xhard: Arc<dyn GenerationPort>,
}

impl ModelTiers {
    /// Use one capability for every tier.
    pub fn uniform(port: Arc<dyn GenerationPort>) -> Self {
        Self {
            easy: port.clone(),
            medium: port.clone(),
            hard: port.clone(),
            xhard: port,
        }
    }

    /// The names recorded in a run record.
    pub fn names(&self) -> ModelTierSet {
        ModelTierSet {
            easy: self.easy.display_name().to_string(),
            medium: self.medium.display_name().to_string(),
            hard: self.hard.display_name().to_string(),
            xhard: self.xhard.display_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl GenerationPort for Named {
        fn display_name(&self) -> &str {
            self.0
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: &str,
        ) -> Result<GenerationResult, GenerationError> {
            Ok(GenerationResult::new("ok", vec![]))
        }
    }

    #[test]
    fn tier_names_follow_ports() {
        let mut tiers = ModelTiers::uniform(Arc::new(Named("sonnet")));
        tiers.easy = Arc::new(Named("haiku"));
        let names = tiers.names();
        assert_eq!(names.easy, "haiku");
        assert_eq!(names.hard, "sonnet");
        assert_eq!(names.xhard, "sonnet");
    }

    #[test]
    fn result_defaults_to_zero_cost() {
        let result = GenerationResult::new("text", vec![Invocation::new("Agent.completed")]);
        assert_eq!(result.cost, 0.0);
        assert_eq!(result.with_cost(0.5).cost, 0.5);
    }
}
