use crate::onnx;
use crate::onnx::tensor_shape_proto::dimension::Value;
use crate::traversal::traverse_graphs_mut;

#[derive(Debug, thiserror::Error)]
pub enum ShapeFixError {
    #[error("Rank mismatch. Existing:{existing} Replacement:{replacement}")]
    RankMismatch { existing: usize, replacement: usize },
    #[error("Can't replace existing fixed size of {existing} with {replacement} at index {index}")]
    ValueConflict {
        index: usize,
        existing: i64,
        replacement: i64,
    },
    #[error("Input {name} was not found in graph inputs. Valid input names are: {}", .valid.join(","))]
    UnknownInput { name: String, valid: Vec<String> },
    #[error("Input {0} is not a tensor")]
    NotATensor(String),
}

/// Classification of a single shape entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension<'a> {
    Known(i64),
    Symbolic(&'a str),
    Unknown,
}

impl<'a> From<&'a onnx::tensor_shape_proto::Dimension> for Dimension<'a> {
    fn from(dim: &'a onnx::tensor_shape_proto::Dimension) -> Self {
        match &dim.value {
            Some(Value::DimValue(x)) => Dimension::Known(*x),
            Some(Value::DimParam(x)) if !x.is_empty() => Dimension::Symbolic(x),
            _ => Dimension::Unknown,
        }
    }
}

pub(crate) fn tensor_type(value: &onnx::ValueInfoProto) -> Option<&onnx::type_proto::Tensor> {
    match value.r#type.as_ref()?.value.as_ref()? {
        onnx::type_proto::Value::TensorType(t) => Some(t),
        _ => None,
    }
}

fn tensor_type_mut(value: &mut onnx::ValueInfoProto) -> Option<&mut onnx::type_proto::Tensor> {
    match value.r#type.as_mut()?.value.as_mut()? {
        onnx::type_proto::Value::TensorType(t) => Some(t),
        _ => None,
    }
}

/// A tensor with a declared shape whose dimensions all have a concrete
/// value greater than zero. Scalars (empty shape) count as fixed.
pub fn is_fixed_size_tensor(value: &onnx::ValueInfoProto) -> bool {
    let Some(shape) = tensor_type(value).and_then(|t| t.shape.as_ref()) else {
        return false;
    };
    shape
        .dim
        .iter()
        .all(|dim| matches!(Dimension::from(dim), Dimension::Known(x) if x > 0))
}

/// A symbolic dimension name and the concrete value that replaces it.
#[derive(Clone, Copy, Debug)]
pub struct DimParamReplacement<'a> {
    pub dim_param: &'a str,
    pub value: i64,
}

fn replace_symbolic_dim_value(graph: &mut onnx::GraphProto, replacement: &DimParamReplacement) {
    let value_infos = graph
        .input
        .iter_mut()
        .chain(graph.output.iter_mut())
        .chain(graph.value_info.iter_mut());

    for value_info in value_infos {
        let Some(shape) = tensor_type_mut(value_info).and_then(|t| t.shape.as_mut()) else {
            continue;
        };
        for dim in &mut shape.dim {
            if Dimension::from(&*dim) == Dimension::Symbolic(replacement.dim_param) {
                dim.value = Some(Value::DimValue(replacement.value));
            }
        }
    }
}

/// Replace the symbolic dimension `dim_param` with `value` in every input,
/// output and value info of `graph` and its subgraphs.
pub fn make_dim_param_fixed(graph: &mut onnx::GraphProto, dim_param: &str, value: i64) {
    log::debug!("Fixing dim_param \"{dim_param}\" to {value}");
    traverse_graphs_mut(
        graph,
        &mut replace_symbolic_dim_value,
        &DimParamReplacement { dim_param, value },
    );
}

/// Set the shape of graph input `input_name` to `fixed_shape`.
///
/// Unknown dimensions are set on the input alone. Symbolic dimensions are
/// replaced throughout the graph, so every other value sharing the symbol is
/// fixed too. Dimensions that already have a value must match.
///
/// Dimensions are handled in order and errors are returned as soon as they
/// are found; earlier dimensions may already have been rewritten by then.
pub fn make_input_shape_fixed(
    graph: &mut onnx::GraphProto,
    input_name: &str,
    fixed_shape: &[i64],
) -> Result<(), ShapeFixError> {
    let Some(input_idx) = graph.input.iter().position(|x| x.name == input_name) else {
        return Err(ShapeFixError::UnknownInput {
            name: input_name.to_string(),
            valid: graph.input.iter().map(|x| x.name.clone()).collect(),
        });
    };

    let rank = {
        let tensor = tensor_type(&graph.input[input_idx])
            .ok_or_else(|| ShapeFixError::NotATensor(input_name.to_string()))?;
        tensor.shape.as_ref().map_or(0, |s| s.dim.len())
    };
    if rank != fixed_shape.len() {
        return Err(ShapeFixError::RankMismatch {
            existing: rank,
            replacement: fixed_shape.len(),
        });
    }

    for (index, &replacement) in fixed_shape.iter().enumerate() {
        let current = input_dim(graph, input_idx, index).cloned();
        let Some(current) = current else {
            continue;
        };
        match Dimension::from(&current) {
            Dimension::Known(existing) => {
                if existing != replacement {
                    return Err(ShapeFixError::ValueConflict {
                        index,
                        existing,
                        replacement,
                    });
                }
            }
            Dimension::Symbolic(dim_param) => {
                make_dim_param_fixed(graph, dim_param, replacement);
            }
            Dimension::Unknown => {
                if let Some(dim) = input_dim_mut(graph, input_idx, index) {
                    dim.value = Some(Value::DimValue(replacement));
                }
            }
        }
    }

    Ok(())
}

fn input_dim(
    graph: &onnx::GraphProto,
    input_idx: usize,
    index: usize,
) -> Option<&onnx::tensor_shape_proto::Dimension> {
    tensor_type(graph.input.get(input_idx)?)?
        .shape
        .as_ref()?
        .dim
        .get(index)
}

fn input_dim_mut(
    graph: &mut onnx::GraphProto,
    input_idx: usize,
    index: usize,
) -> Option<&mut onnx::tensor_shape_proto::Dimension> {
    tensor_type_mut(graph.input.get_mut(input_idx)?)?
        .shape
        .as_mut()?
        .dim
        .get_mut(index)
}
