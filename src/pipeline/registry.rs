//! Calculator registry.
//!
//! Maps calculator names used in graph configs to something that can produce
//! a contract and an instance. Three kinds of registration exist:
//!
//! - **Builtin**: one of the [`CalculatorKind`]s compiled into the crate.
//! - **Plugin**: a contract function plus a factory closure, for
//!   calculators defined outside the crate.
//! - **Subgraph**: a [`GraphConfig`] expanded in place by the compiler.
//!
//! The registry is an explicit object handed to [`Graph::new`](super::Graph::new);
//! there is no process-wide table.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph_config::{GraphConfig, NodeConfig};
use crate::pipeline::node::{AnyCalculator, Calculator};
use crate::pipeline::node_type::CalculatorKind;
use crate::pipeline::port::Contract;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a contract from a node's configuration.
pub type ContractFn = Arc<dyn Fn(&NodeConfig) -> PipelineResult<Contract> + Send + Sync>;

/// Creates a fresh calculator instance.
pub type CalculatorFactory = Arc<dyn Fn() -> Box<dyn Calculator> + Send + Sync>;

#[derive(Clone)]
pub enum Registration {
    Builtin(CalculatorKind),
    Plugin {
        contract: ContractFn,
        create: CalculatorFactory,
    },
    Subgraph(Arc<GraphConfig>),
}

impl Registration {
    /// Contract for a node using this registration. Subgraphs have no
    /// contract of their own; they are expanded before contracts are needed.
    pub fn contract(&self, node: &NodeConfig) -> PipelineResult<Contract> {
        match self {
            Registration::Builtin(kind) => kind.contract(node),
            Registration::Plugin { contract, .. } => contract(node),
            Registration::Subgraph(_) => Err(PipelineError::Config(format!(
                "'{}' is a subgraph and has no calculator contract",
                node.calculator
            ))),
        }
    }

    /// Creates a calculator instance. `None` for subgraphs.
    pub fn create(&self) -> Option<AnyCalculator> {
        match self {
            Registration::Builtin(kind) => Some(AnyCalculator::Builtin(kind.create())),
            Registration::Plugin { create, .. } => Some(AnyCalculator::Plugin(create())),
            Registration::Subgraph(_) => None,
        }
    }

    pub fn is_subgraph(&self) -> bool {
        matches!(self, Registration::Subgraph(_))
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Registration::Builtin(kind) => write!(f, "Builtin({kind})"),
            Registration::Plugin { .. } => write!(f, "Plugin"),
            Registration::Subgraph(config) => {
                write!(f, "Subgraph({} nodes)", config.node.len())
            }
        }
    }
}

/// Registry of calculators and subgraphs by name.
#[derive(Debug, Default, Clone)]
pub struct CalculatorRegistry {
    entries: HashMap<String, Registration>,
}

impl CalculatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in calculator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for kind in CalculatorKind::all() {
            registry
                .entries
                .insert(kind.registered_name().to_string(), Registration::Builtin(*kind));
        }
        registry
    }

    /// Register a calculator defined outside the crate.
    ///
    /// `contract` is called once per node at graph-build time; `create` once
    /// per node at the start of every run.
    ///
    /// # Errors
    /// `DuplicateCalculator` if the name is taken.
    pub fn register_calculator<C, F>(
        &mut self,
        name: impl Into<String>,
        contract: C,
        create: F,
    ) -> PipelineResult<()>
    where
        C: Fn(&NodeConfig) -> PipelineResult<Contract> + Send + Sync + 'static,
        F: Fn() -> Box<dyn Calculator> + Send + Sync + 'static,
    {
        self.insert(
            name.into(),
            Registration::Plugin {
                contract: Arc::new(contract),
                create: Arc::new(create),
            },
        )
    }

    /// Register a graph to be used as a calculator. The name is taken from
    /// `name`, falling back to the config's `type` field.
    pub fn register_subgraph(
        &mut self,
        name: Option<&str>,
        config: GraphConfig,
    ) -> PipelineResult<()> {
        let name = name
            .map(str::to_string)
            .or_else(|| config.type_name.clone())
            .ok_or_else(|| {
                PipelineError::Config("subgraph needs a name or a 'type' field".into())
            })?;
        self.insert(name, Registration::Subgraph(Arc::new(config)))
    }

    fn insert(&mut self, name: String, registration: Registration) -> PipelineResult<()> {
        if self.entries.contains_key(&name) {
            return Err(PipelineError::DuplicateCalculator(name));
        }
        tracing::debug!("Registered calculator '{}' ({:?})", name, registration);
        self.entries.insert(name, registration);
        Ok(())
    }

    pub fn get(&self, name: &str) -> PipelineResult<&Registration> {
        self.entries
            .get(name)
            .ok_or_else(|| PipelineError::UnknownCalculator(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::node::{CalculatorContext, ProcessStatus};
    use crate::pipeline::packet::PacketType;

    struct Nop;

    impl Calculator for Nop {
        fn name(&self) -> &str {
            "Nop"
        }

        fn process(&mut self, _ctx: &mut CalculatorContext) -> PipelineResult<ProcessStatus> {
            Ok(ProcessStatus::Stop)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = CalculatorRegistry::with_builtins();
        assert_eq!(registry.len(), CalculatorKind::all().len());
        assert!(registry.contains("ImageResizeCalculator"));
        assert!(matches!(
            registry.get("PassThroughCalculator").unwrap(),
            Registration::Builtin(CalculatorKind::PassThrough)
        ));
        assert!(matches!(
            registry.get("Missing"),
            Err(PipelineError::UnknownCalculator(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_register_plugin() {
        let mut registry = CalculatorRegistry::new();
        registry
            .register_calculator(
                "Nop",
                |_| Ok(Contract::new().output("OUT", 0, PacketType::any())),
                || Box::new(Nop),
            )
            .unwrap();

        let reg = registry.get("Nop").unwrap();
        let contract = reg.contract(&NodeConfig::new("Nop")).unwrap();
        assert!(contract.is_source());
        assert_eq!(reg.create().unwrap().name(), "Nop");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = CalculatorRegistry::with_builtins();
        let err = registry
            .register_calculator("PassThroughCalculator", |_| Ok(Contract::new()), || {
                Box::new(Nop)
            })
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateCalculator(_)));
    }

    #[test]
    fn test_subgraph_registration() {
        let mut registry = CalculatorRegistry::new();
        let sub = GraphConfig::new().with_type_name("Doubler");
        registry.register_subgraph(None, sub).unwrap();
        let reg = registry.get("Doubler").unwrap();
        assert!(reg.is_subgraph());
        assert!(reg.create().is_none());
        assert!(reg.contract(&NodeConfig::new("Doubler")).is_err());

        assert!(registry.register_subgraph(None, GraphConfig::new()).is_err());
        assert_eq!(registry.names(), vec!["Doubler"]);
    }
}
