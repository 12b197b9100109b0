use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::aggregate::{
    clamp_percentage, round_percentage, score_rubric, settle, tally_rubric, tally_weighted,
    AggregationError, Rubric, RubricError, RubricScore, WeightedAggregate, WeightedItem,
};
use super::calculator::{calculate, CalculationError};
use super::domain::{
    GradeResult, GradingRecord, Policy, PolicyDraft, PolicyFilter, PolicyId, PolicyPatch,
};
use super::late::{apply_late_policy, LatePenaltyOutcome, LatePolicy};
use super::registry::{PolicyRegistry, RegistryError, RegistrySnapshot};
use super::resolver::{PolicyResolver, ResolutionError, ResolutionRequest, ResolutionSource};
use super::standard::{standard_late_policy, STANDARD_LATE_POLICY_ID};
use super::store::{late_policy_key, PolicyStore, PolicyStoreExt, StoreError, REGISTRY_KEY};
use super::validation::ValidationError;

/// Error raised by the grading service.
#[derive(Debug, thiserror::Error)]
pub enum GradingServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Calculation(#[from] CalculationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Rubric(#[from] RubricError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("late policy {0} not found")]
    LatePolicyNotFound(String),
}

/// A resolved policy and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResolution {
    pub policy: Policy,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalGrade {
    pub aggregate: WeightedAggregate,
    pub grade: GradeResult,
}

/// Everything needed to grade one rubric-scored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub rubric: Rubric,
    pub record: GradingRecord,
    #[serde(default)]
    pub program_type: Option<String>,
    #[serde(default)]
    pub policy_id: Option<PolicyId>,
    #[serde(default)]
    pub late_policy_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionGrade {
    pub student_id: String,
    pub assignment_id: String,
    pub rubric: RubricScore,
    pub late: LatePenaltyOutcome,
    pub percentage: f64,
    pub grade: GradeResult,
}

/// Service composing the policy registry, resolver, late tables, and store.
pub struct GradingService<S> {
    registry: RwLock<PolicyRegistry>,
    late_policies: RwLock<BTreeMap<String, LatePolicy>>,
    resolver: PolicyResolver,
    store: Arc<S>,
}

impl<S> std::fmt::Debug for GradingService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingService")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl<S> GradingService<S>
where
    S: PolicyStore + 'static,
{
    /// Service over an explicit registry, with only the standard late policy.
    pub fn new(registry: PolicyRegistry, store: Arc<S>) -> Self {
        let mut late_policies = BTreeMap::new();
        let standard = standard_late_policy();
        late_policies.insert(standard.id.clone(), standard);

        Self {
            registry: RwLock::new(registry),
            late_policies: RwLock::new(late_policies),
            resolver: PolicyResolver::default(),
            store,
        }
    }

    pub fn with_resolver(mut self, resolver: PolicyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Load persisted policies, falling back to the built-ins when nothing usable is stored.
    pub fn bootstrap(store: Arc<S>) -> Self {
        let registry = load_registry(store.as_ref());
        let service = Self::new(registry, store);
        service.load_custom_late_policies();
        service
    }

    fn load_custom_late_policies(&self) {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "unable to list stored late policies");
                return;
            }
        };

        let mut late_policies = self.late_policies.write().expect("late policy lock poisoned");
        for key in keys.iter().filter(|key| key.starts_with("late-policy-")) {
            match self.store.load::<LatePolicy>(key) {
                Ok(Some(policy)) => {
                    let report = policy.validate();
                    if report.is_valid {
                        late_policies.insert(policy.id.clone(), policy);
                    } else {
                        warn!(%key, errors = ?report.errors, "skipping invalid stored late policy");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(%key, error = %err, "skipping unreadable late policy"),
            }
        }
    }

    pub fn list_policies(&self, filter: &PolicyFilter) -> Vec<Policy> {
        let registry = self.registry.read().expect("registry lock poisoned");
        registry.list(filter).into_iter().cloned().collect()
    }

    pub fn get_policy(&self, id: &PolicyId) -> Result<Policy, GradingServiceError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        Ok(registry.get(id)?.clone())
    }

    pub fn create_policy(&self, draft: PolicyDraft) -> Result<Policy, GradingServiceError> {
        let policy = self.mutate(|registry| registry.create(draft).cloned())?;
        info!(policy_id = %policy.id, name = %policy.name, "grading policy created");
        Ok(policy)
    }

    pub fn update_policy(
        &self,
        id: &PolicyId,
        patch: PolicyPatch,
    ) -> Result<Policy, GradingServiceError> {
        let policy = self.mutate(|registry| registry.update(id, patch).cloned())?;
        info!(policy_id = %policy.id, version = policy.version, "grading policy updated");
        Ok(policy)
    }

    pub fn delete_policy(&self, id: &PolicyId) -> Result<Policy, GradingServiceError> {
        let removed = self.mutate(|registry| registry.delete(id))?;
        info!(policy_id = %removed.id, "grading policy deleted");
        Ok(removed)
    }

    /// Apply `change` to a copy of the registry and only commit it once persisted.
    fn mutate<T, F>(&self, change: F) -> Result<T, GradingServiceError>
    where
        F: FnOnce(&mut PolicyRegistry) -> Result<T, RegistryError>,
    {
        let mut registry = self.registry.write().expect("registry lock poisoned");
        let mut next = registry.clone();
        let outcome = change(&mut next)?;
        self.store.save(REGISTRY_KEY, &next.snapshot())?;
        *registry = next;
        Ok(outcome)
    }

    pub fn resolve(
        &self,
        program_type: Option<&str>,
        policy_id: Option<&PolicyId>,
    ) -> Result<PolicyResolution, GradingServiceError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let resolved = self.resolver.resolve(
            &registry,
            &ResolutionRequest {
                program_type,
                explicit_policy_id: policy_id,
            },
        )?;
        Ok(PolicyResolution {
            policy: resolved.policy.clone(),
            source: resolved.source,
        })
    }

    /// Resolve the applicable policy and map `percentage` onto it.
    pub fn calculate_grade(
        &self,
        percentage: f64,
        policy_id: Option<&PolicyId>,
        program_type: Option<&str>,
    ) -> Result<GradeResult, GradingServiceError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let resolved = self.resolver.resolve(
            &registry,
            &ResolutionRequest {
                program_type,
                explicit_policy_id: policy_id,
            },
        )?;

        let result = calculate(percentage, resolved.policy).map_err(|err| {
            if let CalculationError::PolicyIntegrity { policy_id, .. } = &err {
                tracing::error!(%policy_id, error = %err, "stored grading policy is malformed");
            }
            err
        })?;

        debug!(
            percentage,
            letter = %result.letter,
            policy_id = %result.policy_id,
            "grade calculated"
        );
        Ok(result)
    }

    pub fn late_policies(&self) -> Vec<LatePolicy> {
        let late_policies = self.late_policies.read().expect("late policy lock poisoned");
        late_policies.values().cloned().collect()
    }

    pub fn late_policy(&self, id: &str) -> Result<LatePolicy, GradingServiceError> {
        let late_policies = self.late_policies.read().expect("late policy lock poisoned");
        late_policies
            .get(id)
            .cloned()
            .ok_or_else(|| GradingServiceError::LatePolicyNotFound(id.to_string()))
    }

    /// Validate, persist, and register a custom late policy.
    pub fn save_late_policy(&self, policy: LatePolicy) -> Result<LatePolicy, GradingServiceError> {
        policy.validate().into_result()?;
        if policy.id == STANDARD_LATE_POLICY_ID {
            return Err(ValidationError {
                errors: vec![format!("Late policy '{STANDARD_LATE_POLICY_ID}' is built in")],
            }
            .into());
        }

        let mut late_policies = self.late_policies.write().expect("late policy lock poisoned");
        self.store.save(&late_policy_key(&policy.id), &policy)?;
        late_policies.insert(policy.id.clone(), policy.clone());
        info!(late_policy_id = %policy.id, "late policy saved");
        Ok(policy)
    }

    /// Apply a late level; `late_policy_id` defaults to the standard table.
    pub fn apply_late_penalty(
        &self,
        raw_score: f64,
        level_key: &str,
        late_policy_id: Option<&str>,
    ) -> Result<LatePenaltyOutcome, GradingServiceError> {
        let policy = self.late_policy(late_policy_id.unwrap_or(STANDARD_LATE_POLICY_ID))?;
        if !policy.levels.contains_key(level_key) {
            debug!(level_key, late_policy_id = %policy.id, "unknown late level, treating as on time");
        }
        Ok(apply_late_policy(raw_score, level_key, &policy))
    }

    pub fn score_rubric(
        &self,
        rubric: &Rubric,
        selections: &BTreeMap<String, String>,
    ) -> Result<RubricScore, GradingServiceError> {
        Ok(score_rubric(rubric, selections)?)
    }

    /// Weighted final percentage across assignments, mapped onto the resolved policy.
    pub fn final_grade(
        &self,
        items: &[WeightedItem],
        policy_id: Option<&PolicyId>,
        program_type: Option<&str>,
    ) -> Result<FinalGrade, GradingServiceError> {
        let tally = tally_weighted(items)?;
        let percentage = clamp_percentage(settle(tally.percentage()));
        let grade = self.grade_percentage(percentage, policy_id, program_type)?;
        Ok(FinalGrade {
            aggregate: tally.to_aggregate(),
            grade,
        })
    }

    /// Rubric score, then late penalty, then letter grade.
    pub fn grade_submission(
        &self,
        request: &SubmissionRequest,
    ) -> Result<SubmissionGrade, GradingServiceError> {
        let tally = tally_rubric(&request.rubric, &request.record.selections)?;
        let late = self.apply_late_penalty(
            tally.earned,
            &request.record.late_level,
            request.late_policy_id.as_deref(),
        )?;

        let penalised = if tally.possible > 0.0 {
            late.level_applied.apply(tally.earned) / tally.possible * 100.0
        } else {
            0.0
        };
        let grade = self.grade_percentage(
            clamp_percentage(settle(penalised)),
            request.policy_id.as_ref(),
            request.program_type.as_deref(),
        )?;

        Ok(SubmissionGrade {
            student_id: request.record.student_id.clone(),
            assignment_id: request.record.assignment_id.clone(),
            rubric: tally.to_score(&request.rubric.id),
            late,
            percentage: grade.percentage,
            grade,
        })
    }

    /// Grade an unrounded percentage. Only the percentage echoed in the result is rounded,
    /// so the letter always matches what `calculate_grade` gives for the exact value.
    pub fn grade_percentage(
        &self,
        percentage: f64,
        policy_id: Option<&PolicyId>,
        program_type: Option<&str>,
    ) -> Result<GradeResult, GradingServiceError> {
        let mut grade = self.calculate_grade(settle(percentage), policy_id, program_type)?;
        grade.percentage = round_percentage(grade.percentage);
        Ok(grade)
    }
}

fn load_registry<S: PolicyStore + ?Sized>(store: &S) -> PolicyRegistry {
    match store.load::<RegistrySnapshot>(REGISTRY_KEY) {
        Ok(Some(snapshot)) => {
            let (registry, rejected) = PolicyRegistry::from_snapshot(snapshot);
            for (policy_id, err) in &rejected {
                warn!(%policy_id, error = %err, "skipping invalid stored grading policy");
            }
            if registry.is_empty() {
                warn!("stored grading policies unusable, seeding built-in policies");
                PolicyRegistry::with_built_ins()
            } else {
                info!(policies = registry.len(), "grading policies loaded from store");
                registry
            }
        }
        Ok(None) => {
            info!("no stored grading policies, seeding built-in policies");
            PolicyRegistry::with_built_ins()
        }
        Err(err) => {
            warn!(error = %err, "failed to load grading policies, seeding built-in policies");
            PolicyRegistry::with_built_ins()
        }
    }
}
