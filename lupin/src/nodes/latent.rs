use super::*;

/// Moments of a node whose update rule lives with the training loop
/// (factors, loadings, precisions, ARD and sparsity parameters).
///
/// The node only carries the current expectations and its declared
/// dependencies. Block count and shapes are fixed at construction.
#[derive(Debug, Clone)]
pub struct LatentNode {
    name: NodeName,
    kind: NodeKind,
    blocks: Vec<Moments>,
    dependencies: Vec<NodeName>,
}

impl LatentNode {
    /// A node with one parameter block shared by all views
    /// * `name`: node name
    /// * `multi_group`: rows are indexed by samples across groups
    /// * `moments`: initial moments
    /// * `dependencies`: names of the nodes in the Markov blanket
    pub fn single_view(
        name: NodeName,
        multi_group: bool,
        moments: Moments,
        dependencies: &[NodeName],
    ) -> anyhow::Result<Self> {
        Self::build(
            name,
            NodeKind::new(false, multi_group),
            vec![moments],
            dependencies,
        )
    }

    /// A node with one parameter block per view
    /// * `name`: node name
    /// * `multi_group`: rows are indexed by samples across groups
    /// * `blocks`: initial moments of each view
    /// * `dependencies`: names of the nodes in the Markov blanket
    pub fn multi_view(
        name: NodeName,
        multi_group: bool,
        blocks: Vec<Moments>,
        dependencies: &[NodeName],
    ) -> anyhow::Result<Self> {
        if blocks.is_empty() {
            anyhow::bail!("multi-view node {} needs at least one view", name);
        }
        Self::build(name, NodeKind::new(true, multi_group), blocks, dependencies)
    }

    fn build(
        name: NodeName,
        kind: NodeKind,
        blocks: Vec<Moments>,
        dependencies: &[NodeName],
    ) -> anyhow::Result<Self> {
        for b in blocks.iter() {
            b.check_shapes(name)?;
        }

        if kind.multi_group {
            let nn = blocks[0].dim().0;
            for b in blocks.iter().skip(1) {
                if b.dim().0 != nn {
                    return Err(ModelError::DimensionMismatch {
                        what: format!("samples of {}", name),
                        expected: nn,
                        found: b.dim().0,
                    }
                    .into());
                }
            }
        }

        Ok(Self {
            name,
            kind,
            blocks,
            dependencies: dependencies.to_vec(),
        })
    }
}

impl Node for LatentNode {
    fn name(&self) -> NodeName {
        self.name
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn num_views(&self) -> usize {
        self.blocks.len()
    }

    fn expectations(&self, view: usize) -> anyhow::Result<&Moments> {
        check_view(view, self.blocks.len())?;
        Ok(&self.blocks[view])
    }

    fn dependencies(&self) -> &[NodeName] {
        &self.dependencies
    }

    fn set_moments(&mut self, view: usize, moments: Moments) -> anyhow::Result<()> {
        check_view(view, self.blocks.len())?;
        moments.check_shapes(self.name)?;

        let expected = self.blocks[view].dim();
        if moments.dim() != expected {
            return Err(ModelError::ShapeMismatch {
                what: format!("E of {}", self.name),
                expected,
                found: moments.dim(),
            }
            .into());
        }
        self.blocks[view] = moments;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_keeps_shape() -> anyhow::Result<()> {
        let mut w = LatentNode::multi_view(
            NodeName::W,
            false,
            vec![
                Moments::first(Mat::zeros((4, 2))),
                Moments::first(Mat::zeros((3, 2))),
            ],
            &[NodeName::Z, NodeName::Y],
        )?;

        assert_eq!(w.num_views(), 2);
        assert!(w.set_moments(1, Moments::first(Mat::ones((3, 2)))).is_ok());
        assert_eq!(w.expectation(1)?.sum(), 6.0);

        assert!(w.set_moments(0, Moments::first(Mat::ones((3, 2)))).is_err());
        assert!(w.set_moments(2, Moments::first(Mat::ones((3, 2)))).is_err());
        assert!(w.expectation(2).is_err());
        Ok(())
    }

    #[test]
    fn multi_group_views_share_samples() {
        let tau = LatentNode::multi_view(
            NodeName::Tau,
            true,
            vec![
                Moments::first(Mat::ones((5, 2))),
                Moments::first(Mat::ones((4, 3))),
            ],
            &[NodeName::Y],
        );
        assert!(tau.is_err());
    }
}
