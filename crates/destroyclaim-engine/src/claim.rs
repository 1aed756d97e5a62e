//! Destroy claim engine
//!
//! A [`DestroyClaim`] is built from a raw claim document and a shared
//! [`Support`]. Construction validates the document and instantiates one
//! extension per element. [`DestroyClaim::evaluate`] runs every evaluation
//! callback and resolves condition expressions; [`DestroyClaim::process`]
//! evaluates, checks the claim-wide gate, and then destroys every eligible
//! subject through its action or its own default callback.
//!
//! Callbacks run strictly one after another. The first failing callback
//! aborts the claim.

use crate::extension::{Extension, ProcessMode};
use crate::state::ScratchState;
use crate::support::{run_hook, ExtensionType, Support};
use crate::validator::ClaimValidator;
use chrono::{DateTime, Utc};
use destroyclaim_core::{ClaimDocument, ElementKind, Error, Expr, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Resolved outcome of one element (or the claim root).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// The element's own evaluation callback result.
    pub evaluation: bool,
    /// Its condition expression, `true` when it has none.
    pub conditions: bool,
}

impl Resolution {
    pub fn passed(&self) -> bool {
        self.evaluation && self.conditions
    }
}

/// Identifier → resolution, for every element and the root.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EvaluationState(BTreeMap<String, Resolution>);

impl EvaluationState {
    pub fn get(&self, id: &str) -> Option<&Resolution> {
        self.0.get(id)
    }

    /// `false` for unknown ids.
    pub fn passed(&self, id: &str) -> bool {
        self.get(id).map(Resolution::passed).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Resolution)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimPhase {
    Validated,
    Evaluated,
    Processed,
    Failed,
}

/// A subject that was handed to a process callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSubject {
    pub subject_id: String,
    /// The action that handled it, `None` for the subject's own callback.
    pub action_id: Option<String>,
}

/// Outcome of [`DestroyClaim::process`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub claim_id: String,
    pub mode: ProcessMode,
    pub processed: Vec<ProcessedSubject>,
    /// Subjects left alone because their own resolution failed.
    pub skipped: Vec<String>,
}

pub struct DestroyClaim {
    original: Value,
    document: ClaimDocument,
    support: Arc<Support>,
    extensions: Vec<Extension>,
    index: HashMap<String, usize>,
    state: ScratchState,
    evaluation_state: Mutex<EvaluationState>,
    phase: Mutex<ClaimPhase>,
}

impl DestroyClaim {
    /// Validate `claim` against `support` and instantiate its extensions.
    ///
    /// Any validation failure is reported as [`Error::ClaimValidation`]
    /// carrying every failed check.
    pub fn new(claim: Value, support: Arc<Support>) -> Result<Self> {
        if !claim.is_object() {
            return Err(Error::invalid_argument("destroy claim must be a JSON object"));
        }
        let document = ClaimDocument::from_value(&claim)
            .map_err(|e| Error::ClaimValidation { errors: vec![e] })?;

        let validator = ClaimValidator::new(&document, &support);
        if !validator.validate_destroy_claim() {
            let errors = validator.into_errors();
            warn!(claim_id = %document.id, errors = errors.len(), "destroy claim rejected");
            return Err(Error::ClaimValidation { errors });
        }

        let extensions = instantiate(&document, &support)?;
        let index = extensions
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id().to_string(), i))
            .collect();

        info!(claim_id = %document.id, extensions = extensions.len(), "destroy claim validated");
        Ok(Self {
            original: claim,
            document,
            support,
            extensions,
            index,
            state: ScratchState::new(),
            evaluation_state: Mutex::new(EvaluationState::default()),
            phase: Mutex::new(ClaimPhase::Validated),
        })
    }

    /// Parse a JSON string and construct the claim.
    pub fn from_json(json: &str, support: Arc<Support>) -> Result<Self> {
        Self::new(serde_json::from_str(json)?, support)
    }

    // -----------------------------------------------------------------------
    // Evaluation and execution
    // -----------------------------------------------------------------------

    /// Evaluate every extension and resolve every condition expression.
    pub async fn evaluate(&self) -> Result<EvaluationState> {
        let result = self.run_evaluation().await;
        match &result {
            Ok(_) => self.set_phase(ClaimPhase::Evaluated),
            Err(e) => {
                warn!(claim_id = %self.id(), error = %e, "destroy claim evaluation failed");
                self.set_phase(ClaimPhase::Failed);
            }
        }
        result
    }

    async fn run_evaluation(&self) -> Result<EvaluationState> {
        info!(claim_id = %self.id(), "evaluating destroy claim");
        run_hook(self.support.hooks().pre_all_evaluation.as_ref(), self).await?;

        let order = [
            ElementKind::DestroyContact,
            ElementKind::DestroyCondition,
            ElementKind::DestroyAction,
            ElementKind::DestroySubject,
        ];
        for kind in order {
            for extension in self.extensions_of(kind) {
                extension.evaluate(self).await?;
            }
        }

        let state = self.resolve();
        *self
            .evaluation_state
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = state.clone();

        run_hook(self.support.hooks().post_all_evaluation.as_ref(), self).await?;
        Ok(state)
    }

    /// Condition expressions see each referenced element's own evaluation
    /// result; the claim id resolves to `true`.
    fn resolve(&self) -> EvaluationState {
        let mut context: BTreeMap<String, bool> = self
            .extensions
            .iter()
            .map(|e| (e.id().to_string(), e.passed()))
            .collect();
        context.insert(self.document.id.clone(), true);

        let conditions =
            |expr: Option<&Expr>| expr.map(|c| c.evaluate_bool(&context)).unwrap_or(true);

        let mut resolved: BTreeMap<String, Resolution> = self
            .extensions
            .iter()
            .map(|e| {
                let resolution = Resolution {
                    evaluation: e.passed(),
                    conditions: conditions(e.conditions()),
                };
                debug!(extension_id = %e.id(), ?resolution, "extension resolved");
                (e.id().to_string(), resolution)
            })
            .collect();
        resolved.insert(
            self.document.id.clone(),
            Resolution {
                evaluation: true,
                conditions: conditions(self.document.conditions.as_ref()),
            },
        );
        EvaluationState(resolved)
    }

    /// The claim-wide gate. With a root condition expression it decides alone;
    /// without one every element has to pass.
    fn gate_open(&self, state: &EvaluationState) -> bool {
        if self.document.conditions.is_some() {
            state.passed(&self.document.id)
        } else {
            self.extensions.iter().all(|e| state.passed(e.id()))
        }
    }

    /// Evaluate, gate, then destroy every eligible subject.
    ///
    /// Nothing is destroyed when the claim is inactive, expired, not
    /// confirmed, fails evaluation, or does not pass its gate.
    pub async fn process(&self) -> Result<ProcessReport> {
        let result = self.run_process().await;
        match &result {
            Ok(report) => {
                info!(
                    claim_id = %self.id(),
                    mode = %report.mode,
                    processed = report.processed.len(),
                    skipped = report.skipped.len(),
                    "destroy claim processed"
                );
                self.set_phase(ClaimPhase::Processed);
            }
            Err(e) => {
                warn!(claim_id = %self.id(), error = %e, "destroy claim processing failed");
                self.set_phase(ClaimPhase::Failed);
            }
        }
        result
    }

    async fn run_process(&self) -> Result<ProcessReport> {
        if !self.document.is_active {
            return Err(Error::claim("destroy claim is not active"));
        }
        if self.document.is_expired() {
            return Err(Error::claim("destroy claim is expired"));
        }

        let state = self.evaluate().await?;
        if !self.gate_open(&state) {
            return Err(Error::claim("destroy claim conditions are not fulfilled"));
        }

        if self.document.is_manual_mode() {
            if let Some(confirm) = self.support.opt_in_handler() {
                if !confirm(self).await? {
                    return Err(Error::claim("destroy claim was not confirmed"));
                }
            }
        }
        if self.document.is_notification_mode() {
            if let Some(notify) = self.support.notification_handler() {
                notify(self).await?;
            }
        }

        run_hook(self.support.hooks().pre_all_execute.as_ref(), self).await?;

        let mode = ProcessMode::from_simulation_flag(self.document.is_simulation_mode());
        let mut report = ProcessReport {
            claim_id: self.document.id.clone(),
            mode,
            processed: Vec::new(),
            skipped: Vec::new(),
        };
        for subject in self.extensions_of(ElementKind::DestroySubject) {
            if !state.passed(subject.id()) {
                debug!(subject_id = %subject.id(), "destroy subject skipped");
                report.skipped.push(subject.id().to_string());
                continue;
            }
            let action = subject
                .action_ref()
                .filter(|id| state.passed(id))
                .and_then(|id| self.extension(id))
                .filter(|a| a.kind() == ElementKind::DestroyAction);
            match action {
                Some(action) => action.process(mode, subject, self).await?,
                None => subject.process(mode, subject, self).await?,
            }
            info!(
                claim_id = %self.document.id,
                subject_id = %subject.id(),
                action_id = action.map(|a| a.id()).unwrap_or("default"),
                %mode,
                "destroy subject processed"
            );
            report.processed.push(ProcessedSubject {
                subject_id: subject.id().to_string(),
                action_id: action.map(|a| a.id().to_string()),
            });
        }

        run_hook(self.support.hooks().post_all_execute.as_ref(), self).await?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The document exactly as it was passed in.
    pub fn original(&self) -> &Value {
        &self.original
    }

    pub fn document(&self) -> &ClaimDocument {
        &self.document
    }

    pub fn support(&self) -> &Support {
        &self.support
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn is_active(&self) -> bool {
        self.document.is_active
    }

    pub fn is_strict_mode(&self) -> bool {
        self.document.is_strict_mode()
    }

    pub fn is_simulation_mode(&self) -> bool {
        self.document.is_simulation_mode()
    }

    pub fn is_manual_mode(&self) -> bool {
        self.document.is_manual_mode()
    }

    pub fn is_notification_mode(&self) -> bool {
        self.document.is_notification_mode()
    }

    pub fn is_expired(&self) -> bool {
        self.document.is_expired()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.document.model_version.as_deref()
    }

    pub fn spec_version(&self) -> Option<&str> {
        self.document.spec_version.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.document.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.document.description.as_deref()
    }

    pub fn keywords(&self) -> &[String] {
        self.document.keywords.as_deref().unwrap_or(&[])
    }

    pub fn issued(&self) -> Option<DateTime<Utc>> {
        self.document.issued
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.document.modified
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.document.expires
    }

    pub fn destroy_reasons(&self) -> &[String] {
        self.document.destroy_reasons()
    }

    pub fn conditions(&self) -> Option<&Expr> {
        self.document.conditions.as_ref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.document.signature.as_deref()
    }

    pub fn destroy_subjects(&self) -> Vec<&Extension> {
        self.extensions_of(ElementKind::DestroySubject).collect()
    }

    pub fn destroy_contacts(&self) -> Vec<&Extension> {
        self.extensions_of(ElementKind::DestroyContact).collect()
    }

    pub fn destroy_conditions(&self) -> Vec<&Extension> {
        self.extensions_of(ElementKind::DestroyCondition).collect()
    }

    pub fn destroy_actions(&self) -> Vec<&Extension> {
        self.extensions_of(ElementKind::DestroyAction).collect()
    }

    /// Extension by element id.
    pub fn extension(&self, id: &str) -> Option<&Extension> {
        self.index.get(id).and_then(|i| self.extensions.get(*i))
    }

    /// Contacts responsible for `id`.
    pub fn contacts_for(&self, id: &str) -> Vec<&Extension> {
        self.extensions_of(ElementKind::DestroyContact)
            .filter(|c| c.is_responsible(id))
            .collect()
    }

    /// Result of the last completed evaluation; empty before the first one.
    pub fn evaluation_state(&self) -> EvaluationState {
        self.evaluation_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn phase(&self) -> ClaimPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_state(&self, key: &str) -> Result<Option<Value>> {
        self.state.get(key)
    }

    pub fn set_state(&self, key: &str, value: Value) -> Result<()> {
        self.state.set(key, value)
    }

    fn extensions_of(&self, kind: ElementKind) -> impl Iterator<Item = &Extension> {
        self.extensions.iter().filter(move |e| e.kind() == kind)
    }

    fn set_phase(&self, phase: ClaimPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }
}

impl std::fmt::Debug for DestroyClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestroyClaim")
            .field("id", &self.document.id)
            .field("phase", &self.phase())
            .field("extensions", &self.extensions)
            .finish()
    }
}

/// One extension per element, in flat-index order.
fn instantiate(document: &ClaimDocument, support: &Support) -> Result<Vec<Extension>> {
    let validator = support.schema_validator();
    let mut unsupported = BTreeSet::new();
    let mut extensions = Vec::new();

    for subject in &document.destroy_subjects {
        match support.extension(&subject.element.name).map(|s| (s, &s.kind)) {
            Some((s, ExtensionType::Subject(process))) => extensions.push(Extension::subject(
                subject,
                &s.schema,
                s.evaluation.clone(),
                process.clone(),
                validator,
            )?),
            _ => {
                unsupported.insert(subject.element.name.clone());
            }
        }
    }
    for contact in &document.destroy_contacts {
        match support.extension(&contact.element.name).map(|s| (s, &s.kind)) {
            Some((s, ExtensionType::Contact)) => extensions.push(Extension::contact(
                contact,
                &s.schema,
                s.evaluation.clone(),
                validator,
            )?),
            _ => {
                unsupported.insert(contact.element.name.clone());
            }
        }
    }
    for condition in &document.destroy_conditions {
        match support.extension(&condition.element.name).map(|s| (s, &s.kind)) {
            Some((s, ExtensionType::Condition)) => extensions.push(Extension::condition(
                condition,
                &s.schema,
                s.evaluation.clone(),
                validator,
            )?),
            _ => {
                unsupported.insert(condition.element.name.clone());
            }
        }
    }
    for action in &document.destroy_actions {
        match support.extension(&action.element.name).map(|s| (s, &s.kind)) {
            Some((s, ExtensionType::Action(process))) => extensions.push(Extension::action(
                action,
                &s.schema,
                s.evaluation.clone(),
                process.clone(),
                validator,
            )?),
            _ => {
                unsupported.insert(action.element.name.clone());
            }
        }
    }

    if !unsupported.is_empty() {
        return Err(Error::ExtensionUnsupported {
            names: unsupported.into_iter().collect(),
        });
    }
    Ok(extensions)
}
