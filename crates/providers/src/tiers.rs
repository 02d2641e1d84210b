//! Builds the difficulty tiers from configuration.
//!
//! Every tier is a [`FallbackGenerator`] over the providers the config lists
//! for it, in order.

use std::sync::Arc;
use std::time::Duration;
use stepwise_config::AppConfig;
use stepwise_core::generation::{GenerationPort, ModelTiers};

use crate::fallback::FallbackGenerator;
use crate::openai_compat::OpenAiCompatGenerator;

/// Build one fallback chain for `tier`.
pub fn build_chain(config: &AppConfig, tier: &str) -> FallbackGenerator {
    let providers = config.tier_providers(tier);
    let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
    let mut chain = FallbackGenerator::new(format!("{tier} ({})", names.join(", ")));

    for provider in providers {
        let generator: Arc<dyn GenerationPort> = Arc::new(OpenAiCompatGenerator::from_config(
            provider,
            config.api_key_for(provider),
        ));
        chain = match provider.timeout_secs {
            Some(secs) => chain.add_with_timeout(generator, Duration::from_secs(secs)),
            None => chain.add(generator),
        };
    }
    chain
}

/// Build all four tiers.
pub fn build_tiers(config: &AppConfig) -> ModelTiers {
    ModelTiers {
        easy: Arc::new(build_chain(config, "easy")),
        medium: Arc::new(build_chain(config, "medium")),
        hard: Arc::new(build_chain(config, "hard")),
        xhard: Arc::new(build_chain(config, "xhard")),
    }
}
