//! f32 execution of the vocabulary operations against bound tensors.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use super::buffer_type::{BindingTable, TensorBinding};
use crate::backend::ComputeStatus;
use crate::error::{ForgeResult, TensorForgeError};
use crate::graph::{DType, Graph, Node, Op, TensorDesc, TensorId};

/// MatMul row count above which parallel execution pays off.
const PAR_MATMUL_MIN_ROWS: usize = 32;

pub(super) fn run_graph(
    bindings: &BindingTable,
    graph: &Graph,
    abort: Option<&AtomicBool>,
) -> ComputeStatus {
    for (index, node) in graph.nodes.iter().enumerate() {
        if let Some(flag) = abort {
            if flag.load(Ordering::Relaxed) {
                tracing::debug!(node = index, "graph execution aborted");
                return ComputeStatus::Aborted;
            }
        }
        if node.op.is_view_op() {
            continue;
        }
        if let Err(err) = run_node(bindings, graph, node) {
            return ComputeStatus::Failed(format!("node {index} ({:?}): {err}", node.op));
        }
    }
    ComputeStatus::Success
}

fn run_node(bindings: &BindingTable, graph: &Graph, node: &Node) -> ForgeResult<()> {
    match &node.op {
        Op::MatMul => {
            let (a_desc, b_desc) = (input(graph, node, 0)?, input(graph, node, 1)?);
            let c_desc = output(graph, node)?;
            let (m, k) = dims2(a_desc)?;
            let (k2, n) = dims2(b_desc)?;
            if k != k2 {
                return Err(TensorForgeError::InvalidGraph(format!(
                    "matmul inner dimensions disagree: {k} vs {k2}"
                )));
            }
            let a = read_f32(bindings, a_desc)?;
            let b = read_f32(bindings, b_desc)?;
            if m == 0 || n == 0 {
                return write_f32(bindings, c_desc, &[]);
            }
            let mut c = vec![0f32; m * n];
            let row = |i: usize, out: &mut [f32]| {
                for j in 0..n {
                    let mut sum = 0f32;
                    for kk in 0..k {
                        sum += a[i * k + kk] * b[kk * n + j];
                    }
                    out[j] = sum;
                }
            };
            if m >= PAR_MATMUL_MIN_ROWS {
                c.par_chunks_mut(n).enumerate().for_each(|(i, out)| row(i, out));
            } else {
                for (i, out) in c.chunks_mut(n).enumerate() {
                    row(i, out);
                }
            }
            write_f32(bindings, c_desc, &c)
        }
        Op::Add | Op::Mul => {
            let a = read_f32(bindings, input(graph, node, 0)?)?;
            let b = read_f32(bindings, input(graph, node, 1)?)?;
            if a.len() != b.len() {
                return Err(TensorForgeError::InvalidGraph(format!(
                    "elementwise operands differ in length: {} vs {}",
                    a.len(),
                    b.len()
                )));
            }
            let out: Vec<f32> = match node.op {
                Op::Add => a.iter().zip(&b).map(|(x, y)| x + y).collect(),
                _ => a.iter().zip(&b).map(|(x, y)| x * y).collect(),
            };
            write_f32(bindings, output(graph, node)?, &out)
        }
        Op::Scale { factor } => {
            let a = read_f32(bindings, input(graph, node, 0)?)?;
            let out: Vec<f32> = a.iter().map(|x| x * factor).collect();
            write_f32(bindings, output(graph, node)?, &out)
        }
        Op::Relu => {
            let a = read_f32(bindings, input(graph, node, 0)?)?;
            let out: Vec<f32> = a.iter().map(|x| x.max(0.0)).collect();
            write_f32(bindings, output(graph, node)?, &out)
        }
        Op::Softmax => {
            let desc = input(graph, node, 0)?;
            let a = read_f32(bindings, desc)?;
            let row = *desc.shape.last().ok_or_else(|| {
                TensorForgeError::InvalidGraph("softmax input is rank 0".to_string())
            })?;
            if row == 0 || a.len() % row != 0 {
                return Err(TensorForgeError::InvalidGraph(format!(
                    "softmax row size {row} does not divide {} elements",
                    a.len()
                )));
            }
            let mut out = Vec::with_capacity(a.len());
            for chunk in a.chunks(row) {
                let max = chunk.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                let exps: Vec<f32> = chunk.iter().map(|x| (x - max).exp()).collect();
                let sum: f32 = exps.iter().sum();
                out.extend(exps.iter().map(|e| e / sum));
            }
            write_f32(bindings, output(graph, node)?, &out)
        }
        Op::Copy => {
            let src = input(graph, node, 0)?;
            let dst = output(graph, node)?;
            if src.byte_size() != dst.byte_size() {
                return Err(TensorForgeError::CopySizeMismatch {
                    src: src.byte_size(),
                    dst: dst.byte_size(),
                });
            }
            let bytes = read_bytes(bindings, src)?;
            write_bytes(bindings, dst, &bytes)
        }
        Op::Reshape | Op::View => Ok(()),
    }
}

fn input<'g>(graph: &'g Graph, node: &Node, index: usize) -> ForgeResult<&'g TensorDesc> {
    let id = node.inputs.get(index).copied().ok_or_else(|| {
        TensorForgeError::InvalidGraph(format!("{:?} is missing input {index}", node.op))
    })?;
    desc(graph, id)
}

fn output<'g>(graph: &'g Graph, node: &Node) -> ForgeResult<&'g TensorDesc> {
    let id = node.outputs.first().copied().ok_or_else(|| {
        TensorForgeError::InvalidGraph(format!("{:?} has no output", node.op))
    })?;
    desc(graph, id)
}

fn desc(graph: &Graph, id: TensorId) -> ForgeResult<&TensorDesc> {
    graph
        .tensor(id)
        .ok_or_else(|| TensorForgeError::InvalidGraph(format!("unknown tensor {id:?}")))
}

fn dims2(desc: &TensorDesc) -> ForgeResult<(usize, usize)> {
    match desc.shape.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        other => Err(TensorForgeError::InvalidGraph(format!(
            "expected a rank-2 tensor, got rank {}",
            other.len()
        ))),
    }
}

fn binding(bindings: &BindingTable, id: TensorId) -> ForgeResult<TensorBinding> {
    bindings
        .lock()?
        .get(&id)
        .cloned()
        .ok_or(TensorForgeError::TensorNotBound(id))
}

fn read_bytes(bindings: &BindingTable, desc: &TensorDesc) -> ForgeResult<Vec<u8>> {
    let bind = binding(bindings, desc.id)?;
    let guard = bind.data.lock()?;
    let n = desc.byte_size();
    let end = bind.offset + n;
    if end > guard.len() {
        return Err(TensorForgeError::OutOfBounds {
            offset: bind.offset,
            len: n,
            size: guard.len(),
        });
    }
    Ok(guard[bind.offset..end].to_vec())
}

fn write_bytes(bindings: &BindingTable, desc: &TensorDesc, bytes: &[u8]) -> ForgeResult<()> {
    let bind = binding(bindings, desc.id)?;
    let mut guard = bind.data.lock()?;
    let end = bind.offset + bytes.len();
    if end > guard.len() {
        return Err(TensorForgeError::OutOfBounds {
            offset: bind.offset,
            len: bytes.len(),
            size: guard.len(),
        });
    }
    guard[bind.offset..end].copy_from_slice(bytes);
    Ok(())
}

fn read_f32(bindings: &BindingTable, desc: &TensorDesc) -> ForgeResult<Vec<f32>> {
    if desc.dtype != DType::F32 {
        return Err(TensorForgeError::Unsupported(format!(
            "host execution computes f32 only, tensor {:?} is {:?}",
            desc.id, desc.dtype
        )));
    }
    let bytes = read_bytes(bindings, desc)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn write_f32(bindings: &BindingTable, desc: &TensorDesc, values: &[f32]) -> ForgeResult<()> {
    if desc.dtype != DType::F32 {
        return Err(TensorForgeError::Unsupported(format!(
            "host execution computes f32 only, tensor {:?} is {:?}",
            desc.id, desc.dtype
        )));
    }
    let expected = desc.element_count();
    if values.len() != expected {
        return Err(TensorForgeError::InvalidGraph(format!(
            "output tensor {:?} holds {expected} elements, produced {}",
            desc.id,
            values.len()
        )));
    }
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_ne_bytes());
    }
    write_bytes(bindings, desc, &bytes)
}
