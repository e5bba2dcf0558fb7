use std::collections::BTreeMap;
use std::sync::Arc;

use sparcflow_phase_api::{PhaseCapability, PhaseNode};
use sparcflow_utils::types::PhaseId;

use crate::nodes::ArtifactNode;
use crate::template::TemplateCapability;

/// Phase nodes available to the driver, keyed by phase.
///
/// A phase without a node is allowed; the driver stops when it reaches one.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: BTreeMap<PhaseId, Arc<dyn PhaseNode>>,
}

impl NodeRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ArtifactNode`] per phase, all sharing `capability`.
    #[must_use]
    pub fn standard(capability: Arc<dyn PhaseCapability>) -> Self {
        let mut registry = Self::new();
        for phase in PhaseId::ALL {
            registry.register(Arc::new(ArtifactNode::new(phase, capability.clone())));
        }
        registry
    }

    /// Standard nodes backed by [`TemplateCapability`].
    #[must_use]
    pub fn offline() -> Self {
        Self::standard(Arc::new(TemplateCapability))
    }

    /// Add or replace the node for `node.id()`; returns the replaced node.
    pub fn register(&mut self, node: Arc<dyn PhaseNode>) -> Option<Arc<dyn PhaseNode>> {
        self.nodes.insert(node.id(), node)
    }

    #[must_use]
    pub fn with(mut self, node: Arc<dyn PhaseNode>) -> Self {
        self.register(node);
        self
    }

    #[must_use]
    pub fn get(&self, phase: PhaseId) -> Option<Arc<dyn PhaseNode>> {
        self.nodes.get(&phase).cloned()
    }

    pub fn remove(&mut self, phase: PhaseId) -> Option<Arc<dyn PhaseNode>> {
        self.nodes.remove(&phase)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registered phases in cycle order.
    pub fn phases(&self) -> impl Iterator<Item = PhaseId> + '_ {
        self.nodes.keys().copied()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("phases", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_registry_covers_every_phase() {
        let registry = NodeRegistry::offline();
        assert_eq!(registry.len(), 9);
        for phase in PhaseId::ALL {
            assert_eq!(registry.get(phase).map(|n| n.id()), Some(phase));
        }
        assert_eq!(registry.phases().collect::<Vec<_>>(), PhaseId::ALL.to_vec());
    }

    #[test]
    fn test_register_replaces_and_remove_drops() {
        let mut registry = NodeRegistry::offline();
        let node: Arc<dyn PhaseNode> =
            Arc::new(ArtifactNode::new(PhaseId::Testing, Arc::new(TemplateCapability)));

        assert!(registry.register(node).is_some());
        assert_eq!(registry.len(), 9);

        assert!(registry.remove(PhaseId::Testing).is_some());
        assert!(registry.get(PhaseId::Testing).is_none());
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_empty_registry() {
        let registry = NodeRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(PhaseId::Specification).is_none());
    }
}
