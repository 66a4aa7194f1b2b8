//! Scorer registry: which scorer handles which task family.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ScorersConfig, TaskFamily};
use crate::domain::ports::Scorer;

use super::command::CommandScorer;
use super::mock::MockScorer;

/// Scorers keyed by family.
#[derive(Default, Clone)]
pub struct ScorerRegistry {
    scorers: HashMap<TaskFamily, Arc<dyn Scorer>>,
}

impl ScorerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// One `CommandScorer` per configured question code.
    pub fn from_config(config: &ScorersConfig) -> DomainResult<Self> {
        let mut registry = Self::new();
        for (code, command) in &config.families {
            let family = TaskFamily::from_code(code)
                .ok_or_else(|| DomainError::ValidationFailed(format!("Unknown scorer family: {code}")))?;
            registry.register(family, Arc::new(CommandScorer::new(command.clone())));
        }
        Ok(registry)
    }

    /// The same scorer for every family.
    pub fn uniform(scorer: Arc<dyn Scorer>) -> Self {
        let mut registry = Self::new();
        for family in TaskFamily::ALL {
            registry.register(family, scorer.clone());
        }
        registry
    }

    /// Every family answered by a default `MockScorer`.
    pub fn mock() -> Self {
        Self::uniform(Arc::new(MockScorer::new()))
    }

    /// Register `scorer` for `family`, replacing any earlier one.
    pub fn register(&mut self, family: TaskFamily, scorer: Arc<dyn Scorer>) {
        self.scorers.insert(family, scorer);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, family: TaskFamily, scorer: Arc<dyn Scorer>) -> Self {
        self.register(family, scorer);
        self
    }

    /// Scorer registered for `family`.
    pub fn get(&self, family: TaskFamily) -> Option<Arc<dyn Scorer>> {
        self.scorers.get(&family).cloned()
    }

    /// Configured families, in table order.
    pub fn families(&self) -> Vec<TaskFamily> {
        TaskFamily::ALL
            .into_iter()
            .filter(|f| self.scorers.contains_key(f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ScorerCommandConfig;

    #[test]
    fn test_from_config_maps_codes() {
        let mut config = ScorersConfig::default();
        config.families.insert(
            "AH_SOUND".into(),
            ScorerCommandConfig { program: "score-ah".into(), args: vec![] },
        );
        let registry = ScorerRegistry::from_config(&config).unwrap();
        assert_eq!(registry.families(), vec![TaskFamily::SustainedVowel]);
        assert!(registry.get(TaskFamily::SayObject).is_none());
    }

    #[test]
    fn test_from_config_rejects_unknown_code() {
        let mut config = ScorersConfig::default();
        config.families.insert(
            "NOPE".into(),
            ScorerCommandConfig { program: "x".into(), args: vec![] },
        );
        assert!(ScorerRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_mock_covers_every_family() {
        assert_eq!(ScorerRegistry::mock().families().len(), TaskFamily::ALL.len());
    }
}
