//! Claim validation against an agent's capability table
//!
//! Every check runs, in a fixed order, whether or not an earlier one failed.
//! The validator collects one error per failed check.

use crate::support::Support;
use destroyclaim_core::{
    detect_cycles, flat_index, id_universe, ClaimDocument, Error, IdSelector, Result,
};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

pub struct ClaimValidator<'a> {
    claim: &'a ClaimDocument,
    support: &'a Support,
    errors: Vec<Error>,
}

impl<'a> ClaimValidator<'a> {
    /// Runs every check immediately.
    pub fn new(claim: &'a ClaimDocument, support: &'a Support) -> Self {
        let mut validator = Self {
            claim,
            support,
            errors: Vec::new(),
        };
        let checks: [(&str, fn(&Self) -> Result<()>); 13] = [
            ("envelope", Self::check_envelope),
            ("normal/strict mode", Self::check_normal_strict_mode),
            ("real/simulation mode", Self::check_real_simulation_mode),
            ("model version", Self::check_version),
            ("destroy reasons", Self::check_destroy_reasons),
            ("manual/automated mode", Self::check_manual_automated_mode),
            ("notification/silent mode", Self::check_notification_silent_mode),
            ("subject action references", Self::check_subject_references),
            ("contact references", Self::check_contact_references),
            ("condition self references", Self::check_condition_self_references),
            ("condition references", Self::check_condition_references),
            ("extension support", Self::check_extension_support),
            ("deadlocks", Self::check_deadlocks),
        ];
        for (name, check) in checks {
            if let Err(e) = check(&validator) {
                debug!(claim_id = %claim.id, check = name, error = %e, "claim check failed");
                validator.errors.push(e);
            }
        }
        validator
    }

    /// True iff no check failed.
    pub fn validate_destroy_claim(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    fn strict(&self) -> bool {
        self.claim.is_strict_mode()
    }

    fn check_envelope(&self) -> Result<()> {
        let claim = self.claim;
        let mut violations = Vec::new();

        let mut seen = HashSet::new();
        let mut duplicates = BTreeSet::new();
        seen.insert(claim.id.as_str());
        for element in flat_index(claim) {
            if !seen.insert(element.element.id.as_str()) {
                duplicates.insert(element.element.id.clone());
            }
        }
        for id in duplicates {
            violations.push(format!("id '{}' is not unique", id));
        }
        if claim.id.is_empty() {
            violations.push("id must not be empty".to_string());
        }
        if claim.destroy_subjects.is_empty() {
            violations.push("destroySubjects needs at least one element".to_string());
        }
        for contact in &claim.destroy_contacts {
            if contact.refs.is_none() {
                violations.push(format!("destroyContact '{}' has no refs", contact.element.id));
            }
        }

        if self.strict() {
            let required = [
                ("modelVersion", claim.model_version.is_some()),
                ("manualMode", claim.manual_mode.is_some()),
                ("notificationMode", claim.notification_mode.is_some()),
                ("simulationMode", claim.simulation_mode.is_some()),
            ];
            for (field, present) in required {
                if !present {
                    violations.push(format!("{} is required in strict mode", field));
                }
            }
            for field in &claim.unknown_fields {
                violations.push(format!("'{}' is not allowed in strict mode", field));
            }
            for subject in &claim.destroy_subjects {
                if subject.action.is_none() {
                    violations.push(format!(
                        "destroySubject '{}' needs an action in strict mode",
                        subject.element.id
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::schema_validation("destroy claim envelope not valid", violations))
        }
    }

    fn check_normal_strict_mode(&self) -> Result<()> {
        let modes = self.support.modes();
        if self.strict() && !modes.strict {
            return Err(Error::ModeUnsupported("strict mode".into()));
        }
        if !self.strict() && !modes.normal {
            return Err(Error::ModeUnsupported("normal mode".into()));
        }
        Ok(())
    }

    fn check_real_simulation_mode(&self) -> Result<()> {
        let modes = self.support.modes();
        let simulation = self.claim.is_simulation_mode();
        if simulation && !modes.simulation {
            return Err(Error::ModeUnsupported("simulation mode".into()));
        }
        if !simulation && !modes.real {
            return Err(Error::ModeUnsupported("real mode".into()));
        }
        Ok(())
    }

    fn check_version(&self) -> Result<()> {
        if !self.strict() {
            return Ok(());
        }
        match &self.claim.model_version {
            None => Err(Error::VersionUnsupported(
                "destroy claim needs a model version in strict mode".into(),
            )),
            Some(v) if !self.support.supports_version(v) => Err(Error::VersionUnsupported(
                format!("destroy claim version {} is not supported", v),
            )),
            Some(_) => Ok(()),
        }
    }

    fn check_destroy_reasons(&self) -> Result<()> {
        if !self.strict() {
            return Ok(());
        }
        let unsupported: Vec<String> = self
            .claim
            .destroy_reasons()
            .iter()
            .filter(|r| !self.support.supports_reason(r))
            .cloned()
            .collect();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(Error::ReasonUnsupported {
                reasons: unsupported,
            })
        }
    }

    fn check_manual_automated_mode(&self) -> Result<()> {
        let modes = self.support.modes();
        let manual = self.claim.is_manual_mode();
        if manual && !modes.manual {
            return Err(Error::ModeUnsupported("manual mode".into()));
        }
        if !manual && !modes.automated {
            return Err(Error::ModeUnsupported("automated mode".into()));
        }
        Ok(())
    }

    fn check_notification_silent_mode(&self) -> Result<()> {
        let modes = self.support.modes();
        let notification = self.claim.is_notification_mode();
        if notification && !modes.notification {
            return Err(Error::ModeUnsupported("notification mode".into()));
        }
        if !notification && !modes.silent {
            return Err(Error::ModeUnsupported("silent mode".into()));
        }
        Ok(())
    }

    fn check_subject_references(&self) -> Result<()> {
        if !self.strict() {
            return Ok(());
        }
        let actions = id_universe(self.claim, IdSelector::Actions);
        let missing: Vec<String> = self
            .claim
            .destroy_subjects
            .iter()
            .filter_map(|s| match &s.action {
                Some(a) if actions.contains(a) => None,
                Some(a) => Some(a.clone()),
                None => Some(format!("<none on {}>", s.element.id)),
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::reference_missing(
                "destroySubjects action ids do not exist in destroyActions",
                missing,
            ))
        }
    }

    fn check_contact_references(&self) -> Result<()> {
        if !self.strict() {
            return Ok(());
        }
        let ids = id_universe(self.claim, IdSelector::All);
        let missing: Vec<String> = self
            .claim
            .destroy_contacts
            .iter()
            .flat_map(|c| c.refs.iter().flatten())
            .filter(|r| !ids.contains(*r))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::reference_missing(
                "destroyContacts reference ids that do not exist",
                missing,
            ))
        }
    }

    fn check_condition_self_references(&self) -> Result<()> {
        let mut offenders: Vec<String> = flat_index(self.claim)
            .into_iter()
            .filter(|e| {
                e.element
                    .conditions
                    .as_ref()
                    .map(|c| c.references().contains(&e.element.id))
                    .unwrap_or(false)
            })
            .map(|e| e.element.id.clone())
            .collect();
        if let Some(root) = &self.claim.conditions {
            if root.references().contains(&self.claim.id) {
                offenders.push(self.claim.id.clone());
            }
        }
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(Error::condition_validation(
                "conditions reference their own element",
                offenders,
            ))
        }
    }

    fn check_condition_references(&self) -> Result<()> {
        let ids = id_universe(self.claim, IdSelector::All);
        let expressions = flat_index(self.claim)
            .into_iter()
            .filter_map(|e| e.element.conditions.as_ref())
            .chain(self.claim.conditions.as_ref());
        let mut missing = BTreeSet::new();
        for expr in expressions {
            missing.extend(expr.references().into_iter().filter(|r| !ids.contains(r)));
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::reference_missing(
                "conditions reference ids that do not exist",
                missing.into_iter().collect(),
            ))
        }
    }

    fn check_extension_support(&self) -> Result<()> {
        if !self.strict() {
            return Ok(());
        }
        let unsupported: BTreeSet<String> = flat_index(self.claim)
            .into_iter()
            .filter(|e| {
                self.support
                    .extension(&e.element.name)
                    .map(|s| s.kind.element_kind() != e.kind)
                    .unwrap_or(true)
            })
            .map(|e| e.element.name.clone())
            .collect();
        if unsupported.is_empty() {
            Ok(())
        } else {
            Err(Error::ExtensionUnsupported {
                names: unsupported.into_iter().collect(),
            })
        }
    }

    fn check_deadlocks(&self) -> Result<()> {
        let cycles = detect_cycles(self.claim);
        if cycles.is_empty() {
            Ok(())
        } else {
            Err(Error::DeadlockDetected { cycles })
        }
    }
}
