//! Arena of nodes keyed by name, with Markov blankets resolved once
//! into index tables.

use crate::error::ModelError;
use crate::nodes::{Moments, Node, NodeName, ObservedViews};
use log::debug;
use std::collections::HashMap;

/// Dependency links of one node: (name, arena index)
type Links = Vec<(NodeName, usize)>;

#[derive(Default)]
pub struct NodeRegistry {
    nodes: Vec<Box<dyn Node>>,
    index: HashMap<NodeName, usize>,
    blankets: Option<Vec<Links>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Any resolved Markov blankets are dropped and
    /// must be resolved again.
    pub fn add(&mut self, node: Box<dyn Node>) -> anyhow::Result<()> {
        let name = node.name();
        if self.index.contains_key(&name) {
            return Err(ModelError::DuplicateNode(name).into());
        }
        self.index.insert(name, self.nodes.len());
        self.nodes.push(node);
        self.blankets = None;
        Ok(())
    }

    pub fn contains(&self, name: NodeName) -> bool {
        self.index.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// node names in registration order
    pub fn names(&self) -> Vec<NodeName> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    pub fn get(&self, name: NodeName) -> anyhow::Result<&dyn Node> {
        let &i = self
            .index
            .get(&name)
            .ok_or(ModelError::NodeNotFound(name))?;
        Ok(self.nodes[i].as_ref())
    }

    pub fn get_mut(&mut self, name: NodeName) -> anyhow::Result<&mut dyn Node> {
        let &i = self
            .index
            .get(&name)
            .ok_or(ModelError::NodeNotFound(name))?;
        Ok(self.nodes[i].as_mut())
    }

    /// Replace the moments of one block of a node
    pub fn set_moments(
        &mut self,
        name: NodeName,
        view: usize,
        moments: Moments,
    ) -> anyhow::Result<()> {
        self.get_mut(name)?.set_moments(view, moments)
    }

    /// The observation node `Y`
    pub fn observations(&self) -> anyhow::Result<&ObservedViews> {
        self.get(NodeName::Y)?
            .as_observations()
            .ok_or_else(|| anyhow::anyhow!("node Y does not hold observations"))
    }

    pub fn observations_mut(&mut self) -> anyhow::Result<&mut ObservedViews> {
        self.get_mut(NodeName::Y)?
            .as_observations_mut()
            .ok_or_else(|| anyhow::anyhow!("node Y does not hold observations"))
    }

    /// Turn every node's declared dependencies into arena indices.
    /// Dependencies that are not registered are left out; asking
    /// for them later is a missing-expectation error.
    pub fn resolve_markov_blankets(&mut self) {
        let blankets = self
            .nodes
            .iter()
            .map(|node| {
                node.dependencies()
                    .iter()
                    .filter_map(|dep| match self.index.get(dep) {
                        Some(&j) => Some((*dep, j)),
                        None => {
                            debug!("{} depends on {}, which is not registered", node.name(), dep);
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        self.blankets = Some(blankets);
    }

    pub fn is_resolved(&self) -> bool {
        self.blankets.is_some()
    }

    pub fn markov_blanket(&self, name: NodeName) -> anyhow::Result<MarkovBlanket<'_>> {
        let blankets = self
            .blankets
            .as_ref()
            .ok_or(ModelError::BlanketNotResolved)?;
        let &i = self
            .index
            .get(&name)
            .ok_or(ModelError::NodeNotFound(name))?;
        Ok(MarkovBlanket {
            owner: name,
            nodes: &self.nodes,
            links: &blankets[i],
        })
    }

    /// Sum of every node's ELBO term
    pub fn calculate_elbo(&self) -> anyhow::Result<f64> {
        let mut elbo = 0.0;
        for node in self.nodes.iter() {
            let blanket = self.markov_blanket(node.name())?;
            elbo += node.calculate_elbo(&blanket)?;
        }
        Ok(elbo)
    }
}

/// Read-only view on the nodes a given node depends on
pub struct MarkovBlanket<'a> {
    owner: NodeName,
    nodes: &'a [Box<dyn Node>],
    links: &'a [(NodeName, usize)],
}

impl<'a> MarkovBlanket<'a> {
    pub fn owner(&self) -> NodeName {
        self.owner
    }

    pub fn names(&self) -> Vec<NodeName> {
        self.links.iter().map(|(n, _)| *n).collect()
    }

    pub fn get(&self, name: NodeName) -> anyhow::Result<&'a dyn Node> {
        let nodes = self.nodes;
        self.links
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, j)| nodes[j].as_ref())
            .ok_or_else(|| {
                ModelError::MissingExpectation {
                    node: name,
                    moment: crate::nodes::Moment::E,
                }
                .into()
            })
    }

    /// Moments of `name` for view `m`; single-view nodes ignore `m`
    pub fn expectations_for_view(&self, name: NodeName, m: usize) -> anyhow::Result<&'a Moments> {
        let node = self.get(name)?;
        let view = if node.kind().multi_view { m } else { 0 };
        node.expectations(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{LatentNode, Mat, Moment};

    fn z_node() -> Box<dyn Node> {
        Box::new(
            LatentNode::single_view(
                NodeName::Z,
                true,
                Moments::first(Mat::zeros((3, 1))),
                &[NodeName::W, NodeName::Y],
            )
            .unwrap(),
        )
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = NodeRegistry::new();
        reg.add(z_node()).unwrap();
        let err = reg.add(z_node()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::DuplicateNode(NodeName::Z))
        ));
    }

    #[test]
    fn blanket_resolution_is_explicit() -> anyhow::Result<()> {
        let mut reg = NodeRegistry::new();
        reg.add(z_node())?;
        assert!(reg.markov_blanket(NodeName::Z).is_err());

        reg.resolve_markov_blankets();
        let blanket = reg.markov_blanket(NodeName::Z)?;
        assert!(blanket.names().is_empty());

        let err = blanket.get(NodeName::W).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::MissingExpectation {
                node: NodeName::W,
                moment: Moment::E
            })
        ));

        reg.add(Box::new(LatentNode::multi_view(
            NodeName::W,
            false,
            vec![Moments::first(Mat::ones((2, 1)))],
            &[NodeName::Z],
        )?))?;
        assert!(!reg.is_resolved());

        reg.resolve_markov_blankets();
        let blanket = reg.markov_blanket(NodeName::Z)?;
        assert_eq!(blanket.names(), vec![NodeName::W]);
        assert_eq!(blanket.expectations_for_view(NodeName::W, 0)?.e.sum(), 2.0);
        Ok(())
    }

    #[test]
    fn unknown_node_lookup_fails() {
        let reg = NodeRegistry::new();
        assert!(reg.get(NodeName::Tau).is_err());
        assert!(reg.observations().is_err());
    }
}
