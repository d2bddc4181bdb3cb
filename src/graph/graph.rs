//! Graph topology handed to backends for execution.

use crate::graph::{Op, TensorDesc, TensorId};

#[derive(Debug, Clone)]
pub struct Node {
    pub op: Op,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
}

#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub tensors: Vec<TensorDesc>,
    pub nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tensor(&mut self, mut desc: TensorDesc) -> TensorId {
        let id = TensorId(self.tensors.len());
        desc.id = id;
        self.tensors.push(desc);
        id
    }

    pub fn add_node(&mut self, op: Op, inputs: Vec<TensorId>, outputs: Vec<TensorId>) {
        self.nodes.push(Node {
            op,
            inputs,
            outputs,
        });
    }

    pub fn tensor(&self, id: TensorId) -> Option<&TensorDesc> {
        self.tensors.get(id.0)
    }

    /// Topology comparison used by graph-plan refresh: same tensor and node
    /// counts, same operation kinds, and same input/output wiring. Operation
    /// parameters (e.g. a scale factor) and tensor placement may differ.
    pub fn same_topology(&self, other: &Graph) -> bool {
        if self.tensors.len() != other.tensors.len() || self.nodes.len() != other.nodes.len() {
            return false;
        }
        self.nodes.iter().zip(other.nodes.iter()).all(|(a, b)| {
            std::mem::discriminant(&a.op) == std::mem::discriminant(&b.op)
                && a.inputs == b.inputs
                && a.outputs == b.outputs
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DType;

    fn two_node_graph(factor: f32) -> Graph {
        let mut g = Graph::new();
        let a = g.add_tensor(TensorDesc::new(vec![4], DType::F32));
        let b = g.add_tensor(TensorDesc::new(vec![4], DType::F32));
        let c = g.add_tensor(TensorDesc::new(vec![4], DType::F32));
        g.add_node(Op::Add, vec![a, b], vec![c]);
        g.add_node(Op::Scale { factor }, vec![c], vec![c]);
        g
    }

    #[test]
    fn test_add_tensor_assigns_sequential_ids() {
        let mut g = Graph::new();
        let a = g.add_tensor(TensorDesc::new(vec![1], DType::F32));
        let b = g.add_tensor(TensorDesc::new(vec![1], DType::F32));
        assert_eq!(a, TensorId(0));
        assert_eq!(b, TensorId(1));
        assert_eq!(g.tensor(b).map(|d| d.id), Some(b));
    }

    #[test]
    fn test_same_topology_ignores_op_params() {
        let g1 = two_node_graph(2.0);
        let g2 = two_node_graph(0.5);
        assert!(g1.same_topology(&g2));
    }

    #[test]
    fn test_same_topology_rejects_different_wiring() {
        let g1 = two_node_graph(1.0);
        let mut g2 = two_node_graph(1.0);
        g2.nodes[0].inputs.reverse();
        assert!(!g1.same_topology(&g2));
    }

    #[test]
    fn test_same_topology_rejects_different_ops() {
        let g1 = two_node_graph(1.0);
        let mut g2 = two_node_graph(1.0);
        g2.nodes[0].op = Op::Mul;
        assert!(!g1.same_topology(&g2));
    }
}
