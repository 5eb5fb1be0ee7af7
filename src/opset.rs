use std::collections::HashSet;
use std::path::Path;

use crate::ModelUtilsError;
use crate::attribute::{AttributeValue, Repeated, Scalar, query_attribute};
use crate::model_io::{load_model, save_model};
use crate::onnx;
use crate::onnx::attribute_proto::AttributeType;
use crate::onnx::tensor_proto::DataType;
use crate::onnx::tensor_shape_proto::dimension::Value::DimValue;
use crate::traversal::{traverse_graphs, traverse_graphs_mut, traverse_nodes};

/// Domain names that refer to the default ONNX operator set.
pub const DEFAULT_DOMAINS: [&str; 2] = ["", "ai.onnx"];

#[derive(Debug, thiserror::Error)]
pub enum OpsetError {
    #[error("Model does not import the default ONNX operator set")]
    MissingCoreOpset,
    #[error("Target opset {target} is lower than the current opset {current}")]
    Downgrade { current: i64, target: i64 },
    #[error("Can't convert {op_type} node \"{node}\" across opset {breaking_version}")]
    UnsupportedConversion {
        op_type: String,
        node: String,
        breaking_version: i64,
    },
    #[error("{op_type} node \"{node}\" is missing required attribute \"{attribute}\"")]
    MissingAttribute {
        op_type: String,
        node: String,
        attribute: String,
    },
}

/// Rewrites a model so that it is valid under a newer default opset.
pub trait OpsetConverter {
    fn convert(
        &self,
        model: onnx::ModelProto,
        target_opset: i64,
    ) -> Result<onnx::ModelProto, OpsetError>;
}

pub fn core_opset_version(model: &onnx::ModelProto) -> Option<i64> {
    let mut version = None;
    for opset_proto in &model.opset_import {
        if DEFAULT_DOMAINS.contains(&opset_proto.domain.as_str()) {
            version = Some(opset_proto.version);
        }
    }
    version
}

#[derive(Clone, Copy, Debug)]
enum ConstantLayout {
    /// `ints` attribute to a 1-D int64 tensor.
    Ints,
    /// `int` attribute to a 1-D int64 tensor holding one element.
    Int,
    /// `float` attribute to a float scalar.
    Float,
}

#[derive(Clone, Copy, Debug)]
struct AttributeToInput {
    attribute: &'static str,
    input_index: usize,
    required: bool,
    layout: ConstantLayout,
}

#[derive(Clone, Copy, Debug)]
struct InputMigration {
    op_type: &'static str,
    since_version: i64,
    moves: &'static [AttributeToInput],
}

const OPTIONAL_AXES: &[AttributeToInput] = &[AttributeToInput {
    attribute: "axes",
    input_index: 1,
    required: false,
    layout: ConstantLayout::Ints,
}];

const fn reduce(op_type: &'static str, since_version: i64) -> InputMigration {
    InputMigration {
        op_type,
        since_version,
        moves: OPTIONAL_AXES,
    }
}

const INPUT_MIGRATIONS: &[InputMigration] = &[
    InputMigration {
        op_type: "Slice",
        since_version: 10,
        moves: &[
            AttributeToInput {
                attribute: "starts",
                input_index: 1,
                required: true,
                layout: ConstantLayout::Ints,
            },
            AttributeToInput {
                attribute: "ends",
                input_index: 2,
                required: true,
                layout: ConstantLayout::Ints,
            },
            AttributeToInput {
                attribute: "axes",
                input_index: 3,
                required: false,
                layout: ConstantLayout::Ints,
            },
        ],
    },
    InputMigration {
        op_type: "TopK",
        since_version: 10,
        moves: &[AttributeToInput {
            attribute: "k",
            input_index: 1,
            required: true,
            layout: ConstantLayout::Int,
        }],
    },
    InputMigration {
        op_type: "Dropout",
        since_version: 12,
        moves: &[AttributeToInput {
            attribute: "ratio",
            input_index: 1,
            required: false,
            layout: ConstantLayout::Float,
        }],
    },
    InputMigration {
        op_type: "Split",
        since_version: 13,
        moves: &[AttributeToInput {
            attribute: "split",
            input_index: 1,
            required: false,
            layout: ConstantLayout::Ints,
        }],
    },
    InputMigration {
        op_type: "Unsqueeze",
        since_version: 13,
        moves: &[AttributeToInput {
            attribute: "axes",
            input_index: 1,
            required: true,
            layout: ConstantLayout::Ints,
        }],
    },
    reduce("Squeeze", 13),
    reduce("ReduceSum", 13),
    reduce("ReduceMean", 18),
    reduce("ReduceMax", 18),
    reduce("ReduceMin", 18),
    reduce("ReduceProd", 18),
    reduce("ReduceL1", 18),
    reduce("ReduceL2", 18),
    reduce("ReduceLogSum", 18),
    reduce("ReduceLogSumExp", 18),
    reduce("ReduceSumSquare", 18),
];

/// An op whose meaning changed at `since_version` in a way that can't be
/// expressed by moving attributes. `carries_over` tells which nodes keep
/// their meaning anyway.
struct BreakingChange {
    op_type: &'static str,
    since_version: i64,
    carries_over: fn(&onnx::NodeProto) -> bool,
}

fn never(_: &onnx::NodeProto) -> bool {
    false
}

const fn breaking(op_type: &'static str, since_version: i64) -> BreakingChange {
    BreakingChange {
        op_type,
        since_version,
        carries_over: never,
    }
}

// Before 13 the input is coerced to 2-D around `axis` (default 1). Only an
// explicit last axis normalizes over the same elements in both versions.
fn normalizes_last_axis(node: &onnx::NodeProto) -> bool {
    matches!(
        query_attribute(&node.attribute, "axis"),
        Some(AttributeValue::Scalar(Scalar::Int(-1)))
    )
}

// `spatial` was removed at 9; the remaining op behaves like spatial=1.
fn is_spatial(node: &onnx::NodeProto) -> bool {
    match query_attribute(&node.attribute, "spatial") {
        None => true,
        Some(AttributeValue::Scalar(Scalar::Int(x))) => x == 1,
        Some(_) => false,
    }
}

const BREAKING_CHANGES: &[BreakingChange] = &[
    BreakingChange {
        op_type: "BatchNormalization",
        since_version: 9,
        carries_over: is_spatial,
    },
    breaking("Upsample", 10),
    breaking("Pad", 11),
    breaking("Resize", 11),
    breaking("Scatter", 11),
    breaking("Clip", 11),
    BreakingChange {
        op_type: "Softmax",
        since_version: 13,
        carries_over: normalizes_last_axis,
    },
    BreakingChange {
        op_type: "LogSoftmax",
        since_version: 13,
        carries_over: normalizes_last_axis,
    },
    BreakingChange {
        op_type: "Hardmax",
        since_version: 13,
        carries_over: normalizes_last_axis,
    },
];

fn crosses(since_version: i64, current: i64, target: i64) -> bool {
    current < since_version && since_version <= target
}

fn is_default_domain(node: &onnx::NodeProto) -> bool {
    DEFAULT_DOMAINS.contains(&node.domain.as_str())
}

fn node_display_name(node: &onnx::NodeProto) -> String {
    if !node.name.is_empty() {
        node.name.clone()
    } else if let Some(output) = node.output.first() {
        output.clone()
    } else {
        node.op_type.clone()
    }
}

/// Converter that moves attributes the default opset turned into inputs over
/// to int64/float initializers, and otherwise carries nodes forward as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct AxesInputConverter;

#[derive(Clone, Copy, Debug)]
struct OpsetRange {
    current: i64,
    target: i64,
}

impl OpsetRange {
    fn migrations_for(&self, node: &onnx::NodeProto) -> impl Iterator<Item = &'static InputMigration> {
        let (current, target) = (self.current, self.target);
        let applies = is_default_domain(node);
        INPUT_MIGRATIONS.iter().filter(move |m| {
            applies && m.op_type == node.op_type && crosses(m.since_version, current, target)
        })
    }
}

fn check_node(node: &onnx::NodeProto, range: &OpsetRange) -> Result<(), OpsetError> {
    if !is_default_domain(node) {
        return Ok(());
    }
    for change in BREAKING_CHANGES {
        if node.op_type == change.op_type
            && crosses(change.since_version, range.current, range.target)
            && !(change.carries_over)(node)
        {
            return Err(OpsetError::UnsupportedConversion {
                op_type: node.op_type.clone(),
                node: node_display_name(node),
                breaking_version: change.since_version,
            });
        }
    }
    for migration in range.migrations_for(node) {
        for m in migration.moves {
            if m.required && query_attribute(&node.attribute, m.attribute).is_none() {
                return Err(OpsetError::MissingAttribute {
                    op_type: node.op_type.clone(),
                    node: node_display_name(node),
                    attribute: m.attribute.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn collect_value_names(graph: &onnx::GraphProto) -> HashSet<String> {
    let mut names = HashSet::new();
    traverse_graphs(
        graph,
        &mut |g: &onnx::GraphProto, _: &()| {
            let declared = g.input.iter().chain(&g.output).chain(&g.value_info);
            names.extend(declared.map(|x| x.name.clone()));
            names.extend(g.initializer.iter().map(|x| x.name.clone()));
            for node in &g.node {
                names.extend(node.input.iter().chain(&node.output).cloned());
            }
        },
        &(),
    );
    names
}

fn unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    let mut name = base.to_string();
    let mut suffix = 0;
    while taken.contains(&name) {
        suffix += 1;
        name = format!("{base}_{suffix}");
    }
    taken.insert(name.clone());
    name
}

fn constant_from_attribute(
    attr: &onnx::AttributeProto,
    layout: ConstantLayout,
    name: String,
) -> Option<onnx::TensorProto> {
    let value = AttributeValue::from(attr);
    let tensor = match (layout, value) {
        (ConstantLayout::Ints, AttributeValue::Repeated(Repeated::Ints(x))) => {
            onnx::TensorProto {
                dims: vec![x.len() as i64],
                data_type: DataType::Int64 as i32,
                int64_data: x.to_vec(),
                ..Default::default()
            }
        }
        (ConstantLayout::Int, AttributeValue::Scalar(Scalar::Int(x))) => onnx::TensorProto {
            dims: vec![1],
            data_type: DataType::Int64 as i32,
            int64_data: vec![x],
            ..Default::default()
        },
        (ConstantLayout::Float, AttributeValue::Scalar(Scalar::Float(x))) => onnx::TensorProto {
            dims: vec![],
            data_type: DataType::Float as i32,
            float_data: vec![x],
            ..Default::default()
        },
        _ => return None,
    };
    Some(onnx::TensorProto { name, ..tensor })
}

fn migrate_node(
    node: &mut onnx::NodeProto,
    migration: &InputMigration,
    taken_names: &mut HashSet<String>,
    new_initializers: &mut Vec<onnx::TensorProto>,
) {
    let base = node_display_name(node);
    for m in migration.moves {
        let Some(position) = node.attribute.iter().position(|a| a.name == m.attribute) else {
            continue;
        };
        let attr = node.attribute.remove(position);
        let name = unique_name(taken_names, &format!("{base}_{}", m.attribute));
        let Some(tensor) = constant_from_attribute(&attr, m.layout, name.clone()) else {
            log::warn!(
                "{} node \"{base}\": attribute \"{}\" has an unexpected type, leaving it in place",
                node.op_type,
                m.attribute
            );
            node.attribute.insert(position, attr);
            continue;
        };
        while node.input.len() < m.input_index {
            node.input.push(String::new());
        }
        if node.input.len() == m.input_index {
            node.input.push(name);
        } else {
            node.input[m.input_index] = name;
        }
        new_initializers.push(tensor);
    }
}

/// Attribute edits for ops whose attribute set changed while keeping their
/// meaning. Runs after the attribute-to-input moves of the same node.
fn rewrite_attributes(node: &mut onnx::NodeProto, range: &OpsetRange) {
    if !is_default_domain(node) {
        return;
    }
    match node.op_type.as_str() {
        "BatchNormalization" if crosses(9, range.current, range.target) => {
            node.attribute.retain(|a| a.name != "spatial");
        }
        // An equal split is implied by the output count before 18 and must
        // be spelled out afterwards.
        "Split" if crosses(18, range.current, range.target) => {
            let has_split_input = node.input.get(1).is_some_and(|x| !x.is_empty());
            let has_split_attr = query_attribute(&node.attribute, "split").is_some();
            let has_num_outputs = query_attribute(&node.attribute, "num_outputs").is_some();
            if !has_split_input && !has_split_attr && !has_num_outputs {
                node.attribute.push(onnx::AttributeProto {
                    name: "num_outputs".to_string(),
                    r#type: AttributeType::Int as i32,
                    i: node.output.len() as i64,
                    ..Default::default()
                });
            }
        }
        _ => {}
    }
}

/// Graph input declaring an initializer, as required before IR version 4.
fn initializer_input(tensor: &onnx::TensorProto) -> onnx::ValueInfoProto {
    let dim = tensor
        .dims
        .iter()
        .map(|x| onnx::tensor_shape_proto::Dimension {
            value: Some(DimValue(*x)),
            ..Default::default()
        })
        .collect();
    onnx::ValueInfoProto {
        name: tensor.name.clone(),
        r#type: Some(onnx::TypeProto {
            value: Some(onnx::type_proto::Value::TensorType(onnx::type_proto::Tensor {
                elem_type: tensor.data_type,
                shape: Some(onnx::TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl OpsetConverter for AxesInputConverter {
    fn convert(
        &self,
        mut model: onnx::ModelProto,
        target_opset: i64,
    ) -> Result<onnx::ModelProto, OpsetError> {
        let current = core_opset_version(&model).ok_or(OpsetError::MissingCoreOpset)?;
        if target_opset < current {
            return Err(OpsetError::Downgrade {
                current,
                target: target_opset,
            });
        }
        if target_opset == current {
            log::info!("Model is already at opset {current}");
            return Ok(model);
        }
        let range = OpsetRange {
            current,
            target: target_opset,
        };

        if let Some(graph) = &model.graph {
            let mut first_error = None;
            traverse_nodes(
                graph,
                &mut |node: &onnx::NodeProto, range: &OpsetRange| {
                    if first_error.is_none() {
                        first_error = check_node(node, range).err();
                    }
                },
                &range,
            );
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        let declare_initializers = model.ir_version < 4;
        if let Some(graph) = &mut model.graph {
            let mut taken_names = collect_value_names(graph);
            let mut num_moved = 0;
            traverse_graphs_mut(
                graph,
                &mut |g: &mut onnx::GraphProto, range: &OpsetRange| {
                    let mut new_initializers = vec![];
                    for node in &mut g.node {
                        for migration in range.migrations_for(node).collect::<Vec<_>>() {
                            migrate_node(node, migration, &mut taken_names, &mut new_initializers);
                        }
                        rewrite_attributes(node, range);
                    }
                    num_moved += new_initializers.len();
                    if declare_initializers {
                        g.input.extend(new_initializers.iter().map(initializer_input));
                    }
                    g.initializer.extend(new_initializers);
                },
                &range,
            );
            log::info!("Moved {num_moved} attributes to initializer inputs");
        }

        for opset_proto in &mut model.opset_import {
            if DEFAULT_DOMAINS.contains(&opset_proto.domain.as_str()) {
                opset_proto.version = target_opset;
            }
        }
        Ok(model)
    }
}

/// Load `model_path`, convert it to `opset` and optionally save it to
/// `out_path`. Returns the converted model.
pub fn update_onnx_opset(
    model_path: &Path,
    opset: i64,
    out_path: Option<&Path>,
    converter: &impl OpsetConverter,
) -> Result<onnx::ModelProto, ModelUtilsError> {
    log::info!("Updating {} to opset {}", model_path.display(), opset);

    let model = load_model(model_path)?;
    let new_model = converter.convert(model, opset)?;

    if let Some(out_path) = out_path {
        save_model(&new_model, out_path)?;
        log::info!("Saved updated model to {}", out_path.display());
    }

    Ok(new_model)
}
