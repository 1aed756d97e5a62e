//! Destroyclaim Engine - Extensions, capability table, validation, evaluation and execution

pub mod claim;
pub mod extension;
pub mod schema;
pub mod state;
pub mod support;
pub mod validator;

pub use claim::{
    ClaimPhase, DestroyClaim, EvaluationState, ProcessReport, ProcessedSubject, Resolution,
};
pub use extension::{
    EvaluationDescriptor, EvaluationFn, EvaluationHookFn, Extension, ProcessDescriptor, ProcessFn,
    ProcessMode,
};
pub use schema::{JsonSchemaValidator, SchemaValidator};
pub use state::ScratchState;
pub use support::{
    ClaimHookFn, ExtensionSupport, ExtensionType, LifecycleHooks, ModeSupport, OptInFn, Support,
    SupportBuilder,
};
pub use validator::ClaimValidator;

pub use destroyclaim_core::{Error, Result};
