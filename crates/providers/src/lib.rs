//! Generation providers for Stepwise.
//!
//! All generators implement the `stepwise_core::GenerationPort` trait.
//! [`tiers::build_tiers`] assembles the configured fallback chains.

pub mod fallback;
pub mod function_calls;
pub mod openai_compat;
pub mod pricing;
pub mod tiers;

pub use fallback::FallbackGenerator;
pub use openai_compat::OpenAiCompatGenerator;
pub use pricing::ModelPricing;
pub use tiers::{build_chain, build_tiers};
