//! Agent capability table and its builder
//!
//! A [`Support`] declares what an agent can do: which modes it runs in, which
//! model versions and destroy reasons it accepts, which named extensions it
//! implements, and which lifecycle hooks wrap evaluation and execution.
//! It is assembled once through [`SupportBuilder`] and then shared read-only
//! by every claim.

use crate::claim::DestroyClaim;
use crate::extension::{EvaluationDescriptor, ProcessDescriptor};
use crate::schema::{JsonSchemaValidator, SchemaValidator};
use destroyclaim_core::{ElementKind, Error, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Claim-level hook, e.g. pre-all-evaluation.
pub type ClaimHookFn =
    Arc<dyn for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

/// Opt-in confirmation. `false` aborts the claim.
pub type OptInFn =
    Arc<dyn for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<bool>> + Send + Sync>;

/// The four mode pairs. A claim picks one side of each pair; the agent must
/// support the side it picks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeSupport {
    pub normal: bool,
    pub strict: bool,
    pub real: bool,
    pub simulation: bool,
    pub automated: bool,
    pub manual: bool,
    pub silent: bool,
    pub notification: bool,
}

impl ModeSupport {
    /// Every mode supported.
    pub fn all() -> Self {
        Self {
            normal: true,
            strict: true,
            real: true,
            simulation: true,
            automated: true,
            manual: true,
            silent: true,
            notification: true,
        }
    }
}

/// Element kind of a registered extension, with process callbacks where the
/// kind can destroy data.
#[derive(Clone, Debug)]
pub enum ExtensionType {
    Subject(ProcessDescriptor),
    Contact,
    Condition,
    Action(ProcessDescriptor),
}

impl ExtensionType {
    pub fn element_kind(&self) -> ElementKind {
        match self {
            Self::Subject(_) => ElementKind::DestroySubject,
            Self::Contact => ElementKind::DestroyContact,
            Self::Condition => ElementKind::DestroyCondition,
            Self::Action(_) => ElementKind::DestroyAction,
        }
    }
}

/// One registered extension.
#[derive(Clone, Debug)]
pub struct ExtensionSupport {
    pub name: String,
    pub schema: Value,
    pub evaluation: EvaluationDescriptor,
    pub kind: ExtensionType,
}

#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub pre_all_evaluation: Option<ClaimHookFn>,
    pub post_all_evaluation: Option<ClaimHookFn>,
    pub pre_all_execute: Option<ClaimHookFn>,
    pub post_all_execute: Option<ClaimHookFn>,
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("pre_all_evaluation", &self.pre_all_evaluation.is_some())
            .field("post_all_evaluation", &self.post_all_evaluation.is_some())
            .field("pre_all_execute", &self.pre_all_execute.is_some())
            .field("post_all_execute", &self.post_all_execute.is_some())
            .finish()
    }
}

/// Run a hook if one is set; an unset hook is a no-op.
pub(crate) async fn run_hook(hook: Option<&ClaimHookFn>, claim: &DestroyClaim) -> Result<()> {
    if let Some(hook) = hook {
        hook(claim).await?;
    }
    Ok(())
}

/// The capability table consumed by the validator and the engine.
pub struct Support {
    modes: ModeSupport,
    model_versions: Vec<String>,
    destroy_reasons: Vec<String>,
    extensions: BTreeMap<String, ExtensionSupport>,
    hooks: LifecycleHooks,
    opt_in: Option<OptInFn>,
    notification: Option<ClaimHookFn>,
    schema_validator: Arc<dyn SchemaValidator>,
}

impl Support {
    pub fn builder() -> SupportBuilder {
        SupportBuilder::new()
    }

    pub fn modes(&self) -> &ModeSupport {
        &self.modes
    }

    pub fn model_versions(&self) -> &[String] {
        &self.model_versions
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.model_versions.iter().any(|v| v == version)
    }

    pub fn destroy_reasons(&self) -> &[String] {
        &self.destroy_reasons
    }

    pub fn supports_reason(&self, reason: &str) -> bool {
        self.destroy_reasons.iter().any(|r| r == reason)
    }

    pub fn extension(&self, name: &str) -> Option<&ExtensionSupport> {
        self.extensions.get(name)
    }

    pub fn extensions(&self) -> impl Iterator<Item = &ExtensionSupport> {
        self.extensions.values()
    }

    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    pub fn opt_in_handler(&self) -> Option<&OptInFn> {
        self.opt_in.as_ref()
    }

    pub fn notification_handler(&self) -> Option<&ClaimHookFn> {
        self.notification.as_ref()
    }

    pub fn schema_validator(&self) -> &dyn SchemaValidator {
        self.schema_validator.as_ref()
    }
}

impl fmt::Debug for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Support")
            .field("modes", &self.modes)
            .field("model_versions", &self.model_versions)
            .field("destroy_reasons", &self.destroy_reasons)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .field("opt_in", &self.opt_in.is_some())
            .field("notification", &self.notification.is_some())
            .finish()
    }
}

/// Builds a [`Support`]. Starts with nothing supported and no-op hooks.
pub struct SupportBuilder {
    modes: ModeSupport,
    model_versions: Vec<String>,
    destroy_reasons: Vec<String>,
    extensions: BTreeMap<String, ExtensionSupport>,
    hooks: LifecycleHooks,
    opt_in: Option<OptInFn>,
    notification: Option<ClaimHookFn>,
    schema_validator: Arc<dyn SchemaValidator>,
}

impl Default for SupportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SupportBuilder {
    pub fn new() -> Self {
        Self {
            modes: ModeSupport::default(),
            model_versions: Vec::new(),
            destroy_reasons: Vec::new(),
            extensions: BTreeMap::new(),
            hooks: LifecycleHooks::default(),
            opt_in: None,
            notification: None,
            schema_validator: Arc::new(JsonSchemaValidator),
        }
    }

    /// Seed modes, versions and reasons from agent configuration.
    pub fn from_config(modes: ModeSupport, versions: &[String], reasons: &[String]) -> Self {
        let mut builder = Self::new();
        builder.modes = modes;
        for version in versions {
            builder.add_supported_version(version);
        }
        builder.add_supported_reasons(reasons.iter().cloned());
        builder
    }

    pub fn modes(&mut self, modes: ModeSupport) -> &mut Self {
        self.modes = modes;
        self
    }

    pub fn support_normal_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.normal = supported;
        self
    }

    pub fn support_strict_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.strict = supported;
        self
    }

    pub fn support_real_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.real = supported;
        self
    }

    pub fn support_simulation_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.simulation = supported;
        self
    }

    pub fn support_automated_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.automated = supported;
        self
    }

    /// Manual and opt-in mode are the same capability.
    pub fn support_manual_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.manual = supported;
        self
    }

    pub fn support_silent_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.silent = supported;
        self
    }

    pub fn support_notification_mode(&mut self, supported: bool) -> &mut Self {
        self.modes.notification = supported;
        self
    }

    pub fn add_supported_version(&mut self, version: impl Into<String>) -> &mut Self {
        let version = version.into();
        if !self.model_versions.contains(&version) {
            self.model_versions.push(version);
        }
        self
    }

    pub fn remove_supported_version(&mut self, version: &str) -> &mut Self {
        self.model_versions.retain(|v| v != version);
        self
    }

    pub fn add_supported_reason(&mut self, reason: impl Into<String>) -> &mut Self {
        let reason = reason.into();
        if !self.destroy_reasons.contains(&reason) {
            self.destroy_reasons.push(reason);
        }
        self
    }

    pub fn add_supported_reasons<I, S>(&mut self, reasons: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reason in reasons {
            self.add_supported_reason(reason);
        }
        self
    }

    pub fn remove_supported_reason(&mut self, reason: &str) -> &mut Self {
        self.destroy_reasons.retain(|r| r != reason);
        self
    }

    pub fn add_subject_extension(
        &mut self,
        name: impl Into<String>,
        schema: Value,
        evaluation: EvaluationDescriptor,
        process: ProcessDescriptor,
    ) -> Result<&mut Self> {
        process.check()?;
        self.register(name.into(), schema, evaluation, ExtensionType::Subject(process))
    }

    pub fn add_contact_extension(
        &mut self,
        name: impl Into<String>,
        schema: Value,
        evaluation: EvaluationDescriptor,
    ) -> Result<&mut Self> {
        self.register(name.into(), schema, evaluation, ExtensionType::Contact)
    }

    pub fn add_condition_extension(
        &mut self,
        name: impl Into<String>,
        schema: Value,
        evaluation: EvaluationDescriptor,
    ) -> Result<&mut Self> {
        self.register(name.into(), schema, evaluation, ExtensionType::Condition)
    }

    pub fn add_action_extension(
        &mut self,
        name: impl Into<String>,
        schema: Value,
        evaluation: EvaluationDescriptor,
        process: ProcessDescriptor,
    ) -> Result<&mut Self> {
        process.check()?;
        self.register(name.into(), schema, evaluation, ExtensionType::Action(process))
    }

    pub fn remove_extension(&mut self, name: &str) -> &mut Self {
        self.extensions.remove(name);
        self
    }

    fn register(
        &mut self,
        name: String,
        schema: Value,
        evaluation: EvaluationDescriptor,
        kind: ExtensionType,
    ) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("extension name must not be empty"));
        }
        if self.extensions.contains_key(&name) {
            return Err(Error::support(format!("extension '{}' already exists", name)));
        }
        if !schema.is_object() {
            return Err(Error::invalid_argument(format!(
                "schema of extension '{}' must be a JSON object",
                name
            )));
        }
        debug!(extension = %name, kind = %kind.element_kind(), "extension registered");
        self.extensions.insert(
            name.clone(),
            ExtensionSupport {
                name,
                schema,
                evaluation,
                kind,
            },
        );
        Ok(self)
    }

    pub fn pre_all_evaluation_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.hooks.pre_all_evaluation = Some(Arc::new(hook));
        self
    }

    pub fn post_all_evaluation_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.hooks.post_all_evaluation = Some(Arc::new(hook));
        self
    }

    pub fn pre_all_execute_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.hooks.pre_all_execute = Some(Arc::new(hook));
        self
    }

    pub fn post_all_execute_hook<F>(&mut self, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.hooks.post_all_execute = Some(Arc::new(hook));
        self
    }

    pub fn clear_pre_all_evaluation_hook(&mut self) -> &mut Self {
        self.hooks.pre_all_evaluation = None;
        self
    }

    pub fn clear_post_all_evaluation_hook(&mut self) -> &mut Self {
        self.hooks.post_all_evaluation = None;
        self
    }

    pub fn clear_pre_all_execute_hook(&mut self) -> &mut Self {
        self.hooks.pre_all_execute = None;
        self
    }

    pub fn clear_post_all_execute_hook(&mut self) -> &mut Self {
        self.hooks.post_all_execute = None;
        self
    }

    /// Asked for confirmation before a manual-mode claim destroys anything.
    pub fn opt_in_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<bool>>
            + Send
            + Sync
            + 'static,
    {
        self.opt_in = Some(Arc::new(handler));
        self
    }

    /// Called before a notification-mode claim executes.
    pub fn notification_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a DestroyClaim) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.notification = Some(Arc::new(handler));
        self
    }

    pub fn schema_validator(&mut self, validator: Arc<dyn SchemaValidator>) -> &mut Self {
        self.schema_validator = validator;
        self
    }

    /// Fails unless one side of each mode pair is supported, a subject
    /// extension exists, and strict mode comes with a model version.
    pub fn build(self) -> Result<Support> {
        let m = &self.modes;
        let mut problems = Vec::new();
        if !m.normal && !m.strict {
            problems.push("normal or strict mode");
        }
        if !m.real && !m.simulation {
            problems.push("real or simulation mode");
        }
        if !m.automated && !m.manual {
            problems.push("automated or manual mode");
        }
        if !m.silent && !m.notification {
            problems.push("silent or notification mode");
        }
        if !self
            .extensions
            .values()
            .any(|e| matches!(e.kind, ExtensionType::Subject(_)))
        {
            problems.push("at least one destroy subject extension");
        }
        if m.strict && self.model_versions.is_empty() {
            problems.push("a model version when strict mode is supported");
        }
        if !problems.is_empty() {
            return Err(Error::support(format!(
                "support object needs {}",
                problems.join(", ")
            )));
        }

        Ok(Support {
            modes: self.modes,
            model_versions: self.model_versions,
            destroy_reasons: self.destroy_reasons,
            extensions: self.extensions,
            hooks: self.hooks,
            opt_in: self.opt_in,
            notification: self.notification,
            schema_validator: self.schema_validator,
        })
    }
}
