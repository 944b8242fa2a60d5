//! Provider registry: the static table fixes and resolvers come from.

use crate::config::StagehandConfig;
use crate::types::Stage;

use super::{
    Provider, base::CoreProvider, github::GitHubProvider, ssh::SshProvider,
    vault::VaultProvider,
};

/// Registered providers, in registration order.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_default_providers()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with all default providers.
    pub fn with_default_providers() -> Self {
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(CoreProvider::new()),
            Box::new(VaultProvider::new()),
            Box::new(SshProvider::new()),
            Box::new(GitHubProvider::new()),
        ];
        Self { providers }
    }

    /// Register a provider.
    pub fn register(&mut self, provider: Box<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn all(&self) -> &[Box<dyn Provider>] {
        &self.providers
    }

    pub fn get(&self, name: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// The provider resolving `stage`. For remote stages the claimant named
    /// by the first environment's pipeline wins; otherwise the first
    /// claimant in registration order.
    pub fn owner(&self, stage: Stage, config: &StagehandConfig) -> Option<&dyn Provider> {
        let mut claimants = self.providers.iter().filter(|p| p.owns(stage));

        if stage.is_remote()
            && let Some(env) = config.environments_for(stage).next()
            && let Some(tagged) = claimants.clone().find(|p| p.name() == env.pipeline)
        {
            return Some(tagged.as_ref());
        }

        claimants.next().map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfig;
    use crate::fix::Fix;
    use crate::reachability::{Reachability, Route};
    use crate::signals::Signals;

    struct K8s;

    impl Provider for K8s {
        fn name(&self) -> &'static str {
            "k8s"
        }
        fn owned_stages(&self) -> &'static [Stage] {
            &[Stage::Staging, Stage::Prod]
        }
        fn fixes(&self, _config: &StagehandConfig) -> Vec<Box<dyn Fix>> {
            Vec::new()
        }
        fn resolve(&self, _: Stage, _: &StagehandConfig, _: &Signals) -> Reachability {
            Reachability::via(Route::Api)
        }
    }

    #[test]
    fn test_default_owners() {
        let registry = ProviderRegistry::with_default_providers();
        let config = StagehandConfig::new();
        assert_eq!(registry.owner(Stage::Dev, &config).unwrap().name(), "core");
        assert_eq!(registry.owner(Stage::Secrets, &config).unwrap().name(), "vault");
        assert_eq!(registry.owner(Stage::Prod, &config).unwrap().name(), "ssh");
        assert!(registry.get("github").is_some());
    }

    #[test]
    fn test_pipeline_tag_selects_owner() {
        let mut registry = ProviderRegistry::with_default_providers();
        registry.register(Box::new(K8s));

        let mut config = StagehandConfig::new();
        let mut env = EnvironmentConfig::new("prod-eu", Stage::Prod, "p.example.com");
        env.pipeline = "k8s".to_string();
        config.environments.push(env);

        assert_eq!(registry.owner(Stage::Prod, &config).unwrap().name(), "k8s");
        assert_eq!(registry.owner(Stage::Staging, &config).unwrap().name(), "ssh");
    }

    #[test]
    fn test_empty_registry_has_no_owner() {
        let registry = ProviderRegistry::new();
        assert!(registry.owner(Stage::Dev, &StagehandConfig::new()).is_none());
    }
}
