//! Generator fallback: ordered chain of generation providers.
//!
//! Providers are tried in priority order. Unconfigured ones are skipped
//! without a call; a failing one is logged and the next is tried. When the
//! chain runs out, the error lists every attempt.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::error::GenerationError;
use stepwise_core::generation::{GenerationPort, GenerationResult};
use tracing::{info, warn};

/// A generator that wraps an ordered list of generators and falls back on failure.
pub struct FallbackGenerator {
    name: String,
    chain: Vec<FallbackEntry>,
}

/// A single entry in the fallback chain.
struct FallbackEntry {
    generator: Arc<dyn GenerationPort>,
    timeout: Option<Duration>,
}

impl FallbackGenerator {
    /// Create a new fallback generator with no entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Add a generator that may take as long as it needs.
    pub fn add(mut self, generator: Arc<dyn GenerationPort>) -> Self {
        self.chain.push(FallbackEntry {
            generator,
            timeout: None,
        });
        self
    }

    /// Add a generator that is abandoned after `timeout`.
    pub fn add_with_timeout(mut self, generator: Arc<dyn GenerationPort>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry {
            generator,
            timeout: Some(timeout),
        });
        self
    }

    /// Number of generators in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    async fn attempt(
        entry: &FallbackEntry,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let call = entry.generator.generate(prompt, system_prompt);
        match entry.timeout {
            None => call.await,
            Some(timeout) => tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
                Err(GenerationError::Timeout(format!(
                    "'{}' timed out after {}s",
                    entry.generator.display_name(),
                    timeout.as_secs_f64()
                )))
            }),
        }
    }
}

#[async_trait]
impl GenerationPort for FallbackGenerator {
    fn display_name(&self) -> &str {
        &self.name
    }

    /// At least one entry can be attempted.
    fn is_configured(&self) -> bool {
        self.chain.iter().any(|e| e.generator.is_configured())
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, GenerationError> {
        if self.chain.is_empty() {
            return Err(GenerationError::NotConfigured(format!(
                "No generators in fallback chain '{}'",
                self.name
            )));
        }

        let mut attempts = Vec::new();

        for (i, entry) in self.chain.iter().enumerate() {
            let generator_name = entry.generator.display_name().to_string();

            if !entry.generator.is_configured() {
                info!(generator = %generator_name, "Fallback: skipping unconfigured generator");
                attempts.push(format!("{generator_name}: not configured"));
                continue;
            }

            info!(
                generator = %generator_name,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying generator"
            );

            match Self::attempt(entry, prompt, system_prompt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        generator = %generator_name,
                        error = %e,
                        "Fallback: generator failed, trying next"
                    );
                    attempts.push(format!("{generator_name}: {e}"));
                }
            }
        }

        Err(GenerationError::Exhausted {
            chain: self.name.clone(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// A mock generator that always fails.
    struct FailingGenerator {
        name: String,
        error: GenerationError,
        call_count: Mutex<usize>,
    }

    impl FailingGenerator {
        fn new(name: &str, error: GenerationError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerationPort for FailingGenerator {
        fn display_name(&self) -> &str {
            &self.name
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: &str,
        ) -> Result<GenerationResult, GenerationError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// A mock generator that always succeeds, optionally pretending to lack credentials.
    struct SuccessGenerator {
        name: String,
        configured: bool,
        call_count: Mutex<usize>,
    }

    impl SuccessGenerator {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                configured: true,
                call_count: Mutex::new(0),
            }
        }

        fn unconfigured(name: &str) -> Self {
            Self {
                configured: false,
                ..Self::new(name)
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerationPort for SuccessGenerator {
        fn display_name(&self) -> &str {
            &self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: &str,
        ) -> Result<GenerationResult, GenerationError> {
            *self.call_count.lock().unwrap() += 1;
            Ok(GenerationResult::new(format!("from {}", self.name), vec![]).with_cost(0.01))
        }
    }

    /// A mock generator that hangs forever (for timeout testing).
    struct HangingGenerator;

    #[async_trait]
    impl GenerationPort for HangingGenerator {
        fn display_name(&self) -> &str {
            "hanging"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn generate(
            &self,
            _prompt: &str,
            _system_prompt: &str,
        ) -> Result<GenerationResult, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn first_generator_succeeds() {
        let g1 = Arc::new(SuccessGenerator::new("primary"));
        let g2 = Arc::new(SuccessGenerator::new("secondary"));

        let fallback = FallbackGenerator::new("test").add(g1.clone()).add(g2.clone());

        let result = fallback.generate("hi", "sys").await.unwrap();
        assert_eq!(result.response, "from primary");

        // Only first generator should be called
        assert_eq!(g1.calls(), 1);
        assert_eq!(g2.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_on_failure() {
        let g1 = Arc::new(FailingGenerator::new(
            "primary",
            GenerationError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let g2 = Arc::new(SuccessGenerator::new("secondary"));

        let fallback = FallbackGenerator::new("test").add(g1.clone()).add(g2.clone());

        let result = fallback.generate("hi", "sys").await.unwrap();
        assert_eq!(result.response, "from secondary");
        assert_eq!(g1.calls(), 1);
        assert_eq!(g2.calls(), 1);
    }

    #[tokio::test]
    async fn skips_unconfigured_without_calling() {
        let g1 = Arc::new(SuccessGenerator::unconfigured("together"));
        let g2 = Arc::new(SuccessGenerator::new("fireworks"));

        let fallback = FallbackGenerator::new("deepseek").add(g1.clone()).add(g2.clone());

        let result = fallback.generate("hi", "sys").await.unwrap();
        assert_eq!(result.response, "from fireworks");
        assert_eq!(g1.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_lists_every_attempt() {
        let g1 = Arc::new(FailingGenerator::new(
            "primary",
            GenerationError::Network("conn refused".into()),
        ));
        let g2 = Arc::new(SuccessGenerator::unconfigured("secondary"));
        let g3 = Arc::new(FailingGenerator::new(
            "tertiary",
            GenerationError::AuthenticationFailed("bad key".into()),
        ));

        let fallback = FallbackGenerator::new("test")
            .add(g1.clone())
            .add(g2)
            .add(g3.clone());

        match fallback.generate("hi", "sys").await.unwrap_err() {
            GenerationError::Exhausted { chain, attempts } => {
                assert_eq!(chain, "test");
                assert_eq!(attempts.len(), 3);
                assert!(attempts[0].starts_with("primary"));
                assert!(attempts[1].contains("not configured"));
                assert!(attempts[2].contains("bad key"));
            }
            other => panic!("Expected Exhausted, got: {other:?}"),
        }
        assert_eq!(g1.calls(), 1);
        assert_eq!(g3.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_triggers_fallback() {
        let g2 = Arc::new(SuccessGenerator::new("secondary"));

        let fallback = FallbackGenerator::new("test")
            .add_with_timeout(Arc::new(HangingGenerator), Duration::from_millis(50))
            .add(g2.clone());

        let result = fallback.generate("hi", "sys").await;
        assert!(result.is_ok());
        assert_eq!(g2.calls(), 1);
    }

    #[tokio::test]
    async fn empty_chain_returns_not_configured() {
        let fallback = FallbackGenerator::new("empty");
        match fallback.generate("hi", "sys").await.unwrap_err() {
            GenerationError::NotConfigured(_) => {}
            other => panic!("Expected NotConfigured, got: {other:?}"),
        }
    }

    #[test]
    fn configured_when_any_entry_is() {
        let fallback = FallbackGenerator::new("test")
            .add(Arc::new(SuccessGenerator::unconfigured("a")))
            .add(Arc::new(SuccessGenerator::new("b")));
        assert!(fallback.is_configured());
        assert_eq!(fallback.len(), 2);

        let none = FallbackGenerator::new("test").add(Arc::new(SuccessGenerator::unconfigured("a")));
        assert!(!none.is_configured());
        assert!(FallbackGenerator::new("empty").is_empty());
    }
}
