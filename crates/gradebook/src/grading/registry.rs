use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{Policy, PolicyDraft, PolicyFilter, PolicyId, PolicyPatch};
use super::standard;
use super::validation::{validate, ValidationError, INACTIVE_DEFAULT};

/// Error enumeration for registry operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("grading policy {0} not found")]
    NotFound(PolicyId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("grading policy {id} is at version {actual}, expected {expected}")]
    VersionConflict {
        id: PolicyId,
        expected: u64,
        actual: u64,
    },
}

/// Insertion-ordered collection of grading policies.
///
/// Iteration order is stable so program-type resolution is deterministic: when several
/// policies claim a program type, the earliest registered one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRegistry {
    policies: Vec<Policy>,
    next_sequence: u64,
}

/// Serializable form of a registry, as written to a policy store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub policies: Vec<Policy>,
    #[serde(default = "first_sequence")]
    pub next_sequence: u64,
}

fn first_sequence() -> u64 {
    1
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Registry seeded with the built-in policies.
    pub fn with_built_ins() -> Self {
        Self {
            policies: standard::built_in_policies(),
            next_sequence: 1,
        }
    }

    /// Rebuild a registry from a stored snapshot, skipping policies that fail validation.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> (Self, Vec<(PolicyId, ValidationError)>) {
        let mut registry = Self {
            policies: Vec::new(),
            next_sequence: snapshot.next_sequence.max(1),
        };
        let mut rejected = Vec::new();

        for policy in snapshot.policies {
            if registry.contains(&policy.id) {
                rejected.push((
                    policy.id.clone(),
                    ValidationError {
                        errors: vec![format!("Duplicate policy id '{}'", policy.id)],
                    },
                ));
                continue;
            }
            match validate(&policy.to_draft()).into_result() {
                Ok(()) => registry.policies.push(policy),
                Err(err) => rejected.push((policy.id.clone(), err)),
            }
        }

        registry.enforce_single_default(None);
        (registry, rejected)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            policies: self.policies.clone(),
            next_sequence: self.next_sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Policy> {
        self.policies.iter()
    }

    pub fn contains(&self, id: &PolicyId) -> bool {
        self.policies.iter().any(|policy| &policy.id == id)
    }

    pub fn list(&self, filter: &PolicyFilter) -> Vec<&Policy> {
        self.policies
            .iter()
            .filter(|policy| filter.matches(policy))
            .collect()
    }

    pub fn get(&self, id: &PolicyId) -> Result<&Policy, RegistryError> {
        self.policies
            .iter()
            .find(|policy| &policy.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// The active policy flagged as default, if any.
    pub fn default_policy(&self) -> Option<&Policy> {
        self.policies
            .iter()
            .find(|policy| policy.is_default && policy.is_active)
    }

    pub fn create(&mut self, draft: PolicyDraft) -> Result<&Policy, RegistryError> {
        validate(&draft).into_result()?;
        if draft.is_default && !draft.is_active {
            return Err(inactive_default());
        }

        let id = self.allocate_id();
        let policy = Policy {
            id: id.clone(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            program_types: normalize_program_types(draft.program_types),
            grade_scale: draft.grade_scale,
            is_active: draft.is_active,
            is_default: draft.is_default,
            version: 1,
            updated_at: Utc::now(),
        };

        let becomes_default = policy.is_default;
        self.policies.push(policy);
        self.enforce_single_default(becomes_default.then_some(&id));
        self.get(&id)
    }

    pub fn update(&mut self, id: &PolicyId, patch: PolicyPatch) -> Result<&Policy, RegistryError> {
        let index = self.index_of(id)?;
        let current = &self.policies[index];

        if let Some(expected) = patch.expected_version {
            if expected != current.version {
                return Err(RegistryError::VersionConflict {
                    id: id.clone(),
                    expected,
                    actual: current.version,
                });
            }
        }

        let mut draft = current.to_draft();
        patch.apply_to(&mut draft);
        validate(&draft).into_result()?;

        // Deactivating the default gives up the flag; asking to keep it is rejected.
        let mut hand_over = false;
        if draft.is_default && !draft.is_active {
            if patch.is_default == Some(true) {
                return Err(inactive_default());
            }
            draft.is_default = false;
            hand_over = true;
        }

        let becomes_default = draft.is_default;
        let policy = &mut self.policies[index];
        policy.name = draft.name.trim().to_string();
        policy.description = draft.description;
        policy.program_types = normalize_program_types(draft.program_types);
        policy.grade_scale = draft.grade_scale;
        policy.is_active = draft.is_active;
        policy.is_default = draft.is_default;
        policy.version += 1;
        policy.updated_at = Utc::now();

        self.enforce_single_default(becomes_default.then_some(id));
        if hand_over {
            self.promote_successor();
        }
        self.get(id)
    }

    /// Remove a policy. Removing the default hands the flag to the first remaining
    /// active policy, or leaves the registry without a default.
    pub fn delete(&mut self, id: &PolicyId) -> Result<Policy, RegistryError> {
        let index = self.index_of(id)?;
        let removed = self.policies.remove(index);

        if removed.is_default {
            self.promote_successor();
        }

        Ok(removed)
    }

    fn promote_successor(&mut self) {
        if let Some(successor) = self.policies.iter_mut().find(|policy| policy.is_active) {
            successor.is_default = true;
            successor.version += 1;
            successor.updated_at = Utc::now();
        }
    }

    fn index_of(&self, id: &PolicyId) -> Result<usize, RegistryError> {
        self.policies
            .iter()
            .position(|policy| &policy.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    fn allocate_id(&mut self) -> PolicyId {
        loop {
            let candidate = PolicyId(format!("policy-{:04}", self.next_sequence));
            self.next_sequence += 1;
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Keep at most one default. `winner` keeps the flag; otherwise the earliest active
    /// default does. Inactive policies never keep it.
    fn enforce_single_default(&mut self, winner: Option<&PolicyId>) {
        let keep = winner.cloned().or_else(|| {
            self.policies
                .iter()
                .find(|policy| policy.is_default && policy.is_active)
                .map(|policy| policy.id.clone())
        });

        for policy in &mut self.policies {
            if policy.is_default && Some(&policy.id) != keep.as_ref() {
                policy.is_default = false;
                policy.version += 1;
                policy.updated_at = Utc::now();
            }
        }
    }
}

fn inactive_default() -> RegistryError {
    RegistryError::Validation(ValidationError {
        errors: vec![INACTIVE_DEFAULT.to_string()],
    })
}

fn normalize_program_types(program_types: Vec<String>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for program_type in program_types {
        let cleaned = program_type.trim().to_ascii_lowercase();
        if !cleaned.is_empty() && !normalized.contains(&cleaned) {
            normalized.push(cleaned);
        }
    }
    normalized
}
