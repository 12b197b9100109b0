use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{Policy, PolicyId};
use super::registry::PolicyRegistry;
use super::standard;
use super::validation::{validate, ValidationError};

/// Inputs to policy resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionRequest<'a> {
    pub program_type: Option<&'a str>,
    pub explicit_policy_id: Option<&'a PolicyId>,
}

/// Which strategy produced the resolved policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Explicit,
    ProgramType,
    RegistryDefault,
    StaticFallback,
}

/// Outcome of a single strategy.
#[derive(Debug)]
pub enum Resolution<'a> {
    Hit(&'a Policy),
    Miss,
}

/// A borrowed policy together with the strategy that chose it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPolicy<'a> {
    pub policy: &'a Policy,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no grading policy could be resolved")]
    Exhausted,
    #[error("fallback grading policy {id} failed validation: {source}")]
    InvalidFallback {
        id: PolicyId,
        #[source]
        source: ValidationError,
    },
}

/// One step of the resolution chain.
pub trait ResolverStrategy: Send + Sync {
    fn source(&self) -> ResolutionSource;

    fn resolve<'a>(
        &self,
        registry: &'a PolicyRegistry,
        request: &ResolutionRequest<'_>,
    ) -> Result<Resolution<'a>, ResolutionError>;
}

/// An explicitly requested policy, when it exists and is active.
#[derive(Debug, Default)]
pub struct ExplicitPolicyStrategy;

impl ResolverStrategy for ExplicitPolicyStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::Explicit
    }

    fn resolve<'a>(
        &self,
        registry: &'a PolicyRegistry,
        request: &ResolutionRequest<'_>,
    ) -> Result<Resolution<'a>, ResolutionError> {
        let Some(id) = request.explicit_policy_id else {
            return Ok(Resolution::Miss);
        };

        match registry.get(id) {
            Ok(policy) if policy.is_active => Ok(Resolution::Hit(policy)),
            Ok(_) => {
                warn!(policy_id = %id, "requested grading policy is inactive, falling back");
                Ok(Resolution::Miss)
            }
            Err(_) => {
                warn!(policy_id = %id, "requested grading policy not found, falling back");
                Ok(Resolution::Miss)
            }
        }
    }
}

/// First active policy, in registry order, that lists the program type.
#[derive(Debug, Default)]
pub struct ProgramTypeStrategy;

impl ResolverStrategy for ProgramTypeStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::ProgramType
    }

    fn resolve<'a>(
        &self,
        registry: &'a PolicyRegistry,
        request: &ResolutionRequest<'_>,
    ) -> Result<Resolution<'a>, ResolutionError> {
        let Some(program_type) = request.program_type.filter(|value| !value.trim().is_empty())
        else {
            return Ok(Resolution::Miss);
        };

        Ok(registry
            .iter()
            .find(|policy| policy.is_active && policy.applies_to(program_type))
            .map_or(Resolution::Miss, Resolution::Hit))
    }
}

#[derive(Debug, Default)]
pub struct RegistryDefaultStrategy;

impl ResolverStrategy for RegistryDefaultStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::RegistryDefault
    }

    fn resolve<'a>(
        &self,
        registry: &'a PolicyRegistry,
        _request: &ResolutionRequest<'_>,
    ) -> Result<Resolution<'a>, ResolutionError> {
        Ok(registry
            .default_policy()
            .map_or(Resolution::Miss, Resolution::Hit))
    }
}

/// Hardcoded table, validated exactly like registry policies before use.
#[derive(Debug)]
pub struct StaticFallbackStrategy {
    policy: &'static Policy,
}

impl Default for StaticFallbackStrategy {
    fn default() -> Self {
        Self {
            policy: standard::static_fallback(),
        }
    }
}

impl StaticFallbackStrategy {
    pub fn new(policy: &'static Policy) -> Self {
        Self { policy }
    }
}

impl ResolverStrategy for StaticFallbackStrategy {
    fn source(&self) -> ResolutionSource {
        ResolutionSource::StaticFallback
    }

    fn resolve<'a>(
        &self,
        _registry: &'a PolicyRegistry,
        _request: &ResolutionRequest<'_>,
    ) -> Result<Resolution<'a>, ResolutionError> {
        validate(&self.policy.to_draft())
            .into_result()
            .map_err(|source| ResolutionError::InvalidFallback {
                id: self.policy.id.clone(),
                source,
            })?;
        warn!(policy_id = %self.policy.id, "using static fallback grading policy");
        Ok(Resolution::Hit(self.policy))
    }
}

/// Ordered chain of strategies; the first hit wins.
pub struct PolicyResolver {
    strategies: Vec<Box<dyn ResolverStrategy>>,
}

impl std::fmt::Debug for PolicyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<_> = self.strategies.iter().map(|s| s.source()).collect();
        f.debug_struct("PolicyResolver")
            .field("strategies", &sources)
            .finish()
    }
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ExplicitPolicyStrategy),
            Box::new(ProgramTypeStrategy),
            Box::new(RegistryDefaultStrategy),
            Box::new(StaticFallbackStrategy::default()),
        ])
    }
}

impl PolicyResolver {
    pub fn new(strategies: Vec<Box<dyn ResolverStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn resolve<'a>(
        &self,
        registry: &'a PolicyRegistry,
        request: &ResolutionRequest<'_>,
    ) -> Result<ResolvedPolicy<'a>, ResolutionError> {
        for strategy in &self.strategies {
            match strategy.resolve(registry, request)? {
                Resolution::Hit(policy) => {
                    debug!(
                        policy_id = %policy.id,
                        source = ?strategy.source(),
                        "grading policy resolved"
                    );
                    return Ok(ResolvedPolicy {
                        policy,
                        source: strategy.source(),
                    });
                }
                Resolution::Miss => continue,
            }
        }

        Err(ResolutionError::Exhausted)
    }

    /// Resolve for a program type with an optional explicit policy id.
    pub fn resolve_for_program<'a>(
        &self,
        registry: &'a PolicyRegistry,
        program_type: &str,
        explicit_policy_id: Option<&PolicyId>,
    ) -> Result<ResolvedPolicy<'a>, ResolutionError> {
        self.resolve(
            registry,
            &ResolutionRequest {
                program_type: Some(program_type),
                explicit_policy_id,
            },
        )
    }
}
