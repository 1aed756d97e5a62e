//! Claim element extensions
//!
//! Every element of a claim becomes one [`Extension`]. The four variants
//! share an [`ExtensionCore`] (identity, payload, condition expression,
//! evaluation result, scratch state) and differ in their process capability:
//! subjects and actions can destroy data, contacts and conditions only
//! evaluate.
//!
//! Behaviour is injected through descriptors holding async callbacks. A
//! callback receives the extension it belongs to and the claim being run.

use crate::claim::DestroyClaim;
use crate::schema::SchemaValidator;
use crate::state::ScratchState;
use destroyclaim_core::{
    DestroyAction, DestroyCondition, DestroyContact, DestroySubject, ElementBody, ElementKind,
    Error, Expr, Result,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Evaluation callback: `Some(true)` passes, `Some(false)` and `None` do not.
pub type EvaluationFn = Arc<
    dyn for<'a> Fn(&'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<Option<bool>>>
        + Send
        + Sync,
>;

/// Runs around an evaluation callback.
pub type EvaluationHookFn = Arc<
    dyn for<'a> Fn(&'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Process callback: `(extension, subject, claim)`. When a subject runs its own
/// default callback, `extension` and `subject` are the same instance.
pub type ProcessFn = Arc<
    dyn for<'a> Fn(&'a Extension, &'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Real or simulated destruction. One flag per claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    Real,
    Simulation,
}

impl ProcessMode {
    pub fn from_simulation_flag(simulation: bool) -> Self {
        if simulation {
            Self::Simulation
        } else {
            Self::Real
        }
    }
}

impl fmt::Display for ProcessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Simulation => write!(f, "simulation"),
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct EvaluationDescriptor {
    evaluation: EvaluationFn,
    pre_evaluation: Option<EvaluationHookFn>,
    post_evaluation: Option<EvaluationHookFn>,
}

impl EvaluationDescriptor {
    pub fn new<F>(evaluation: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<Option<bool>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            evaluation: Arc::new(evaluation),
            pre_evaluation: None,
            post_evaluation: None,
        }
    }

    /// An evaluation that always returns `value`.
    pub fn constant(value: bool) -> Self {
        Self::new(move |_, _| Box::pin(async move { Ok(Some(value)) }))
    }

    pub fn pre_evaluation<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.pre_evaluation = Some(Arc::new(hook));
        self
    }

    pub fn post_evaluation<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.post_evaluation = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for EvaluationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationDescriptor")
            .field("pre_evaluation", &self.pre_evaluation.is_some())
            .field("post_evaluation", &self.post_evaluation.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct ProcessDescriptor {
    real_mode: Option<ProcessFn>,
    simulation_mode: Option<ProcessFn>,
    pre_process: Option<ProcessFn>,
    post_process: Option<ProcessFn>,
}

impl ProcessDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn real_mode<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.real_mode = Some(Arc::new(callback));
        self
    }

    pub fn simulation_mode<F>(mut self, callback: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.simulation_mode = Some(Arc::new(callback));
        self
    }

    pub fn pre_process<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.pre_process = Some(Arc::new(hook));
        self
    }

    pub fn post_process<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a Extension, &'a Extension, &'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.post_process = Some(Arc::new(hook));
        self
    }

    pub fn has_real_mode(&self) -> bool {
        self.real_mode.is_some()
    }

    pub fn has_simulation_mode(&self) -> bool {
        self.simulation_mode.is_some()
    }

    /// At least one mode callback is required.
    pub fn check(&self) -> Result<()> {
        if self.real_mode.is_none() && self.simulation_mode.is_none() {
            return Err(Error::invalid_argument(
                "at least one of real mode or simulation mode must be set in process",
            ));
        }
        Ok(())
    }

    fn callback(&self, mode: ProcessMode) -> Option<&ProcessFn> {
        match mode {
            ProcessMode::Real => self.real_mode.as_ref(),
            ProcessMode::Simulation => self.simulation_mode.as_ref(),
        }
    }
}

impl fmt::Debug for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDescriptor")
            .field("real_mode", &self.real_mode.is_some())
            .field("simulation_mode", &self.simulation_mode.is_some())
            .field("pre_process", &self.pre_process.is_some())
            .field("post_process", &self.post_process.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

/// State shared by all four variants.
pub struct ExtensionCore {
    id: String,
    name: String,
    schema: Value,
    payload: Value,
    comment: Option<String>,
    conditions: Option<Expr>,
    evaluation: EvaluationDescriptor,
    result: Mutex<Option<bool>>,
    state: ScratchState,
}

impl ExtensionCore {
    fn new(
        element: &ElementBody,
        schema: &Value,
        evaluation: EvaluationDescriptor,
        validator: &dyn SchemaValidator,
    ) -> Result<Self> {
        if !schema.is_object() {
            return Err(Error::invalid_argument(format!(
                "schema of extension '{}' must be a JSON object",
                element.name
            )));
        }
        validator.validate(&element.payload, schema)?;

        Ok(Self {
            id: element.id.clone(),
            name: element.name.clone(),
            schema: schema.clone(),
            payload: element.payload.clone(),
            comment: element.comment.clone(),
            conditions: element.conditions.clone(),
            evaluation,
            result: Mutex::new(Some(false)),
            state: ScratchState::new(),
        })
    }

    fn store_result(&self, result: Option<bool>) {
        *self.result.lock().unwrap_or_else(|e| e.into_inner()) = result;
    }

    fn result(&self) -> Option<bool> {
        *self.result.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct SubjectExtension {
    core: ExtensionCore,
    action: Option<String>,
    process: ProcessDescriptor,
}

pub struct ContactExtension {
    core: ExtensionCore,
    refs: Vec<String>,
}

pub struct ConditionExtension {
    core: ExtensionCore,
}

pub struct ActionExtension {
    core: ExtensionCore,
    process: ProcessDescriptor,
}

/// One claim element with its injected behaviour.
pub enum Extension {
    Subject(SubjectExtension),
    Contact(ContactExtension),
    Condition(ConditionExtension),
    Action(ActionExtension),
}

impl Extension {
    pub fn subject(
        element: &DestroySubject,
        schema: &Value,
        evaluation: EvaluationDescriptor,
        process: ProcessDescriptor,
        validator: &dyn SchemaValidator,
    ) -> Result<Self> {
        process.check()?;
        Ok(Self::Subject(SubjectExtension {
            core: ExtensionCore::new(&element.element, schema, evaluation, validator)?,
            action: element.action.clone(),
            process,
        }))
    }

    pub fn contact(
        element: &DestroyContact,
        schema: &Value,
        evaluation: EvaluationDescriptor,
        validator: &dyn SchemaValidator,
    ) -> Result<Self> {
        Ok(Self::Contact(ContactExtension {
            core: ExtensionCore::new(&element.element, schema, evaluation, validator)?,
            refs: element.refs.clone().unwrap_or_default(),
        }))
    }

    pub fn condition(
        element: &DestroyCondition,
        schema: &Value,
        evaluation: EvaluationDescriptor,
        validator: &dyn SchemaValidator,
    ) -> Result<Self> {
        Ok(Self::Condition(ConditionExtension {
            core: ExtensionCore::new(&element.element, schema, evaluation, validator)?,
        }))
    }

    pub fn action(
        element: &DestroyAction,
        schema: &Value,
        evaluation: EvaluationDescriptor,
        process: ProcessDescriptor,
        validator: &dyn SchemaValidator,
    ) -> Result<Self> {
        process.check()?;
        Ok(Self::Action(ActionExtension {
            core: ExtensionCore::new(&element.element, schema, evaluation, validator)?,
            process,
        }))
    }

    fn core(&self) -> &ExtensionCore {
        match self {
            Self::Subject(s) => &s.core,
            Self::Contact(c) => &c.core,
            Self::Condition(c) => &c.core,
            Self::Action(a) => &a.core,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Subject(_) => ElementKind::DestroySubject,
            Self::Contact(_) => ElementKind::DestroyContact,
            Self::Condition(_) => ElementKind::DestroyCondition,
            Self::Action(_) => ElementKind::DestroyAction,
        }
    }

    pub fn id(&self) -> &str {
        &self.core().id
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn schema(&self) -> &Value {
        &self.core().schema
    }

    pub fn payload(&self) -> &Value {
        &self.core().payload
    }

    pub fn comment(&self) -> Option<&str> {
        self.core().comment.as_deref()
    }

    pub fn conditions(&self) -> Option<&Expr> {
        self.core().conditions.as_ref()
    }

    /// Last evaluation result. `Some(false)` before the first evaluation;
    /// `None` when the callback returned no verdict.
    pub fn evaluation_result(&self) -> Option<bool> {
        self.core().result()
    }

    /// Whether the last evaluation returned `true`.
    pub fn passed(&self) -> bool {
        self.evaluation_result().unwrap_or(false)
    }

    pub fn get_state(&self, key: &str) -> Result<Option<Value>> {
        self.core().state.get(key)
    }

    pub fn set_state(&self, key: &str, value: Value) -> Result<()> {
        self.core().state.set(key, value)
    }

    /// The action a subject is routed through, if any.
    pub fn action_ref(&self) -> Option<&str> {
        match self {
            Self::Subject(s) => s.action.as_deref(),
            _ => None,
        }
    }

    /// Ids a contact is responsible for. Empty for other variants.
    pub fn refs(&self) -> &[String] {
        match self {
            Self::Contact(c) => &c.refs,
            _ => &[],
        }
    }

    pub fn is_responsible(&self, id: &str) -> bool {
        self.refs().iter().any(|r| r == id)
    }

    pub fn is_processable(&self) -> bool {
        self.process_descriptor().is_some()
    }

    fn process_descriptor(&self) -> Option<&ProcessDescriptor> {
        match self {
            Self::Subject(s) => Some(&s.process),
            Self::Action(a) => Some(&a.process),
            Self::Contact(_) | Self::Condition(_) => None,
        }
    }

    /// Runs pre-evaluation, the evaluation callback, then post-evaluation.
    /// Callback errors propagate unchanged.
    pub async fn evaluate(&self, claim: &DestroyClaim) -> Result<Option<bool>> {
        let descriptor = &self.core().evaluation;
        if let Some(pre) = &descriptor.pre_evaluation {
            pre(self, claim).await?;
        }
        let result = (descriptor.evaluation)(self, claim).await?;
        self.core().store_result(result);
        if let Some(post) = &descriptor.post_evaluation {
            post(self, claim).await?;
        }
        debug!(extension_id = %self.id(), kind = %self.kind(), ?result, "extension evaluated");
        Ok(result)
    }

    pub async fn process_real_mode(&self, subject: &Extension, claim: &DestroyClaim) -> Result<()> {
        self.process(ProcessMode::Real, subject, claim).await
    }

    pub async fn process_simulation_mode(
        &self,
        subject: &Extension,
        claim: &DestroyClaim,
    ) -> Result<()> {
        self.process(ProcessMode::Simulation, subject, claim).await
    }

    /// Runs pre-process, the mode callback, then post-process, in order.
    pub async fn process(
        &self,
        mode: ProcessMode,
        subject: &Extension,
        claim: &DestroyClaim,
    ) -> Result<()> {
        let descriptor = self.process_descriptor().ok_or_else(|| {
            Error::invalid_argument(format!("{} '{}' cannot process data", self.kind(), self.id()))
        })?;
        let callback = descriptor.callback(mode).ok_or_else(|| {
            Error::invalid_argument(format!(
                "{} mode callback of '{}' is not set",
                mode,
                self.name()
            ))
        })?;

        if let Some(pre) = &descriptor.pre_process {
            pre(self, subject, claim).await?;
        }
        callback(self, subject, claim).await?;
        if let Some(post) = &descriptor.post_process {
            post(self, subject, claim).await?;
        }
        debug!(extension_id = %self.id(), subject_id = %subject.id(), %mode, "extension processed");
        Ok(())
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .field("name", &self.name())
            .field("result", &self.evaluation_result())
            .finish()
    }
}
