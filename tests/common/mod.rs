#![allow(dead_code)]

use std::sync::Once;

use onnx_model_utils::onnx;
use onnx_model_utils::onnx::attribute_proto::AttributeType;
use onnx_model_utils::onnx::tensor_shape_proto::dimension::Value;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn node(op_type: &str, name: &str, inputs: &[&str], outputs: &[&str]) -> onnx::NodeProto {
    onnx::NodeProto {
        op_type: op_type.to_string(),
        name: name.to_string(),
        input: inputs.iter().map(|x| x.to_string()).collect(),
        output: outputs.iter().map(|x| x.to_string()).collect(),
        ..Default::default()
    }
}

pub fn with_subgraph(mut node: onnx::NodeProto, attribute: &str, graph: onnx::GraphProto) -> onnx::NodeProto {
    node.attribute.push(onnx::AttributeProto {
        name: attribute.to_string(),
        r#type: AttributeType::Graph as i32,
        g: Some(graph),
        ..Default::default()
    });
    node
}

pub fn with_ints(mut node: onnx::NodeProto, attribute: &str, values: &[i64]) -> onnx::NodeProto {
    node.attribute.push(onnx::AttributeProto {
        name: attribute.to_string(),
        r#type: AttributeType::Ints as i32,
        ints: values.to_vec(),
        ..Default::default()
    });
    node
}

pub fn with_int(mut node: onnx::NodeProto, attribute: &str, value: i64) -> onnx::NodeProto {
    node.attribute.push(onnx::AttributeProto {
        name: attribute.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    });
    node
}

/// Float tensor value info. Each dim is a number, `?` for an unknown
/// dimension, or a symbolic name.
pub fn tensor_value(name: &str, dims: &[&str]) -> onnx::ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| onnx::tensor_shape_proto::Dimension {
            value: match *d {
                "?" => None,
                d => Some(match d.parse::<i64>() {
                    Ok(x) => Value::DimValue(x),
                    Err(_) => Value::DimParam(d.to_string()),
                }),
            },
            ..Default::default()
        })
        .collect();
    onnx::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(onnx::TypeProto {
            value: Some(onnx::type_proto::Value::TensorType(onnx::type_proto::Tensor {
                elem_type: onnx::tensor_proto::DataType::Float as i32,
                shape: Some(onnx::TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Shape of a tensor value info in the same notation as [`tensor_value`].
pub fn shape_of(value: &onnx::ValueInfoProto) -> Vec<String> {
    let Some(onnx::type_proto::Value::TensorType(t)) = value.r#type.as_ref().and_then(|t| t.value.as_ref()) else {
        return vec![];
    };
    t.shape
        .iter()
        .flat_map(|s| &s.dim)
        .map(|d| match &d.value {
            Some(Value::DimValue(x)) => x.to_string(),
            Some(Value::DimParam(x)) => x.clone(),
            None => "?".to_string(),
        })
        .collect()
}

pub fn initializer(name: &str) -> onnx::TensorProto {
    onnx::TensorProto {
        name: name.to_string(),
        data_type: onnx::tensor_proto::DataType::Float as i32,
        dims: vec![1],
        float_data: vec![1.0],
        ..Default::default()
    }
}

pub fn graph(
    name: &str,
    inputs: Vec<onnx::ValueInfoProto>,
    initializers: &[&str],
    nodes: Vec<onnx::NodeProto>,
) -> onnx::GraphProto {
    onnx::GraphProto {
        name: name.to_string(),
        input: inputs,
        initializer: initializers.iter().map(|x| initializer(x)).collect(),
        node: nodes,
        ..Default::default()
    }
}

pub fn model(graph: onnx::GraphProto, opset: i64) -> onnx::ModelProto {
    onnx::ModelProto {
        ir_version: 8,
        producer_name: "onnx-model-utils-tests".to_string(),
        opset_import: vec![onnx::OperatorSetIdProto {
            domain: String::new(),
            version: opset,
        }],
        graph: Some(graph),
        ..Default::default()
    }
}
