//! Interface contracts and their registry.
//!
//! A contract is the only thing the core knows about an external module:
//! its id, the variable ids it requires and optionally accepts, the ids it
//! produces, and a compute function. The registry is built once at process
//! start from a static list; there is no runtime discovery.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use mre_model::StructuredValue;

use crate::error::{CoreError, Result};

/// Output mapping produced by a compute function.
pub type OutputMap = BTreeMap<String, StructuredValue>;

type ComputeFn = Box<dyn Fn(&InputSet) -> anyhow::Result<OutputMap> + Send + Sync>;

/// Resolved input mapping handed to a compute function.
///
/// Values are shared with the data state they were read from; a module
/// never observes or causes mutation of the state.
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    values: BTreeMap<String, Arc<StructuredValue>>,
}

impl InputSet {
    pub(crate) fn insert(&mut self, id: String, value: Arc<StructuredValue>) {
        self.values.insert(id, value);
    }

    /// Required input accessor. A missing id here is a contract violation,
    /// surfaced as a compute failure.
    pub fn get(&self, id: &str) -> anyhow::Result<&StructuredValue> {
        self.values
            .get(id)
            .map(Arc::as_ref)
            .ok_or_else(|| anyhow!("input '{id}' is not present"))
    }

    /// Optional input accessor.
    pub fn get_optional(&self, id: &str) -> Option<&StructuredValue> {
        self.values.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Static declaration of a module or theme.
pub struct InterfaceContract {
    id: String,
    required: Vec<String>,
    optional: Vec<String>,
    outputs: Vec<String>,
    family: Option<String>,
    compute: ComputeFn,
}

impl fmt::Debug for InterfaceContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceContract")
            .field("id", &self.id)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("outputs", &self.outputs)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl InterfaceContract {
    pub fn new(
        id: impl Into<String>,
        compute: impl Fn(&InputSet) -> anyhow::Result<OutputMap> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            required: Vec::new(),
            optional: Vec::new(),
            outputs: Vec::new(),
            family: None,
            compute: Box::new(compute),
        }
    }

    /// Declare the required input ids, in the order a blocked status
    /// reports them.
    pub fn requires(mut self, ids: &[&str]) -> Self {
        self.required = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Declare optional input ids. These never block execution.
    pub fn accepts(mut self, ids: &[&str]) -> Self {
        self.optional = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Declare the output ids the compute function may produce.
    pub fn produces(mut self, ids: &[&str]) -> Self {
        self.outputs = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Tag the contract with a device-type family. Modules of different
    /// families are mutually exclusive within one project.
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn optional(&self) -> &[String] {
        &self.optional
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn declares_output(&self, id: &str) -> bool {
        self.outputs.iter().any(|output| output == id)
    }

    /// Run the compute function on a resolved input mapping.
    pub fn invoke(&self, inputs: &InputSet) -> anyhow::Result<OutputMap> {
        (self.compute)(inputs)
    }
}

/// Registry of interface contracts, filled once at process start.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    contracts: Vec<InterfaceContract>,
    index: BTreeMap<String, usize>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract. Ids are unique.
    pub fn register(&mut self, contract: InterfaceContract) -> Result<()> {
        if self.index.contains_key(contract.id()) {
            return Err(CoreError::DuplicateContract {
                id: contract.id().to_string(),
            });
        }
        self.index
            .insert(contract.id().to_string(), self.contracts.len());
        self.contracts.push(contract);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&InterfaceContract> {
        self.index.get(id).map(|&position| &self.contracts[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Contract ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.contracts.iter().map(InterfaceContract::id)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
