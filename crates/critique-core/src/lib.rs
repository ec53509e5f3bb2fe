//! CritiqueBot Core Library
//!
//! Module registry, experiment resolution, the pipeline cache and the
//! critique-refinement loop, plus the CSV batch runner built on top of them.

pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod obs;
pub mod parse;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod roles;
pub mod telemetry;

pub use domain::{
    CanonicalKey, ConversationHistory, ExperimentConfig, Gradient, JudgeVerdict, ModuleSpec,
    RebuttalResult, RoleName, Speaker, Summary, Turn,
};
pub use error::{CritiqueError, RegistryError, Result};

pub use batch::{load_cases, BatchCase, BatchReport, BatchRunner};
pub use config::{AppConfig, BatchConfig, ExpModuleConfig, RowConfig, RunMode};
pub use factory::{PipelineDescription, PipelineFactory, DEFAULT_CACHE_SOFT_LIMIT};
pub use pipeline::{
    CallOptions, LoopOutcome, ModuleRuntime, Pipeline, PipelineRoles, RuntimeMetadata,
    Termination, DEFAULT_MAX_ITERATIONS,
};
pub use registry::{builtin_modules, Builder, ModuleDescriptor, ModuleRegistry};
pub use resolver::{
    default_template, ConfigResolver, ExperimentRequest, Resolution, ResolutionWarning,
    SUPPORTED_MODEL_SHORTCUTS,
};
pub use roles::{
    FeedbackGenerator, Judge, JudgeOutcome, ModuleContext, RebuttalGenerator, RoleInstance,
    RoleModule, Summarizer,
};

pub use critique_clients::{CapabilityClients, CapabilityError};
