use std::path::Path;

use prost::Message;

use crate::dimension::{make_dim_param_fixed, make_input_shape_fixed};
use crate::onnx;
use crate::ModelUtilsError;

#[derive(Debug, thiserror::Error)]
pub enum ModelIoError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to decode ONNX model {path}: {source}")]
    Decode {
        path: String,
        source: prost::DecodeError,
    },
    #[error("Model has no graph")]
    MissingGraph,
}

pub fn load_model(path: &Path) -> Result<onnx::ModelProto, ModelIoError> {
    let bytes = std::fs::read(path).map_err(|source| ModelIoError::Io {
        path: path.display().to_string(),
        source,
    })?;
    onnx::ModelProto::decode(bytes.as_slice()).map_err(|source| ModelIoError::Decode {
        path: path.display().to_string(),
        source,
    })
}

pub fn save_model(model: &onnx::ModelProto, path: &Path) -> Result<(), ModelIoError> {
    std::fs::write(path, model.encode_to_vec()).map_err(|source| ModelIoError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn graph_mut(model: &mut onnx::ModelProto) -> Result<&mut onnx::GraphProto, ModelIoError> {
    model.graph.as_mut().ok_or(ModelIoError::MissingGraph)
}

/// How to turn dynamic dimensions of a model into fixed ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DynamicShapeFix {
    /// Replace a symbolic dimension everywhere it appears.
    DimParam { name: String, value: i64 },
    /// Set the full shape of one graph input.
    InputShape { input_name: String, shape: Vec<i64> },
}

impl DynamicShapeFix {
    pub fn apply(&self, graph: &mut onnx::GraphProto) -> Result<(), ModelUtilsError> {
        match self {
            DynamicShapeFix::DimParam { name, value } => make_dim_param_fixed(graph, name, *value),
            DynamicShapeFix::InputShape { input_name, shape } => {
                make_input_shape_fixed(graph, input_name, shape)?
            }
        }
        Ok(())
    }
}

/// Load `model_path`, apply `fix`, and save the result to `output_path`.
pub fn make_dynamic_shape_fixed(
    model_path: &Path,
    output_path: &Path,
    fix: &DynamicShapeFix,
) -> Result<onnx::ModelProto, ModelUtilsError> {
    let mut model = load_model(model_path)?;
    fix.apply(graph_mut(&mut model)?)?;
    save_model(&model, output_path)?;
    log::info!("Saved model with fixed shapes to {}", output_path.display());
    Ok(model)
}
