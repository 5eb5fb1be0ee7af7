//! Utilities for inspecting and rewriting ONNX models: producer/consumer
//! maps across nested subgraphs, fixing dynamic input shapes, moving a model
//! to a newer default opset, and running graph optimization.

pub mod attribute;
pub mod dependency;
pub mod dimension;
pub mod model_io;
pub mod onnx;
pub mod opset;
pub mod optimizer;
pub mod traversal;

pub use dependency::{
    DependencyError, DependencyMaps, DependencyReport, NodeId, compute_dependency_maps,
    get_producer_consumer_maps,
};
pub use dimension::{
    Dimension, ShapeFixError, is_fixed_size_tensor, make_dim_param_fixed, make_input_shape_fixed,
};
pub use model_io::{DynamicShapeFix, ModelIoError, load_model, make_dynamic_shape_fixed, save_model};
pub use opset::{AxesInputConverter, OpsetConverter, OpsetError, update_onnx_opset};
pub use optimizer::{
    GraphOptimizer, OptimizationLevel, OptimizeError, get_optimization_level, optimize_model,
};
#[cfg(feature = "ort")]
pub use optimizer::OrtOptimizer;
pub use traversal::{traverse_graphs, traverse_graphs_mut, traverse_nodes, traverse_nodes_mut};

#[derive(Debug, thiserror::Error)]
pub enum ModelUtilsError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    #[error(transparent)]
    ShapeFix(#[from] ShapeFixError),
    #[error(transparent)]
    ModelIo(#[from] ModelIoError),
    #[error(transparent)]
    Opset(#[from] OpsetError),
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}
