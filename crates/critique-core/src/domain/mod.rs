//! Domain models for the critique pipeline.
//!
//! - `RoleName`: the four pipeline roles
//! - `ExperimentConfig` / `ModuleSpec`: which version and model fills each role
//! - `ConversationHistory`: the caller-owned dialogue
//! - `Summary`, `RebuttalResult`, `JudgeVerdict`, `Gradient`: per-step artifacts

pub mod artifacts;
pub mod conversation;
pub mod experiment;
pub mod role;

pub use artifacts::{Gradient, JudgeVerdict, RebuttalResult, Summary};
pub use conversation::{ConversationHistory, Speaker, Turn};
pub use experiment::{CanonicalKey, ExperimentConfig, ModuleSpec};
pub use role::RoleName;
