mod common;

use common::{
    graph, init_logging, model, node, shape_of, tensor_value, with_int, with_ints, with_subgraph,
};
use onnx_model_utils::onnx;
use onnx_model_utils::onnx::attribute_proto::AttributeType;
use onnx_model_utils::onnx::tensor_proto::DataType;
use onnx_model_utils::opset::core_opset_version;
use onnx_model_utils::{
    AxesInputConverter, ModelUtilsError, OpsetConverter, OpsetError, compute_dependency_maps,
    load_model, save_model, update_onnx_opset,
};

fn single_node_model(n: onnx::NodeProto, opset: i64) -> onnx::ModelProto {
    model(graph("main", vec![tensor_value("x", &["2", "3"])], &[], vec![n]), opset)
}

fn initializer<'a>(g: &'a onnx::GraphProto, name: &str) -> &'a onnx::TensorProto {
    g.initializer.iter().find(|x| x.name == name).unwrap()
}

#[test]
fn test_reduce_axes_become_input() {
    init_logging();
    let mut n = with_ints(node("ReduceMean", "mean", &["x"], &["y"]), "axes", &[1]);
    n.attribute.push(onnx::AttributeProto {
        name: "keepdims".to_string(),
        r#type: AttributeType::Int as i32,
        i: 0,
        ..Default::default()
    });
    let converted = AxesInputConverter.convert(single_node_model(n, 13), 18).unwrap();

    assert_eq!(core_opset_version(&converted), Some(18));
    let g = converted.graph.as_ref().unwrap();
    assert_eq!(g.node[0].input, vec!["x", "mean_axes"]);
    let names: Vec<_> = g.node[0].attribute.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["keepdims"]);

    let axes = initializer(g, "mean_axes");
    assert_eq!(axes.data_type, DataType::Int64 as i32);
    assert_eq!(axes.dims, vec![1]);
    assert_eq!(axes.int64_data, vec![1]);

    // the new initializer is a resolvable value
    assert!(compute_dependency_maps(g).is_ok());
}

#[test]
fn test_slice_attributes_become_inputs() {
    let n = with_ints(
        with_ints(node("Slice", "", &["x"], &["y"]), "starts", &[0, 1]),
        "ends",
        &[2, 3],
    );
    let converted = AxesInputConverter.convert(single_node_model(n, 9), 13).unwrap();
    let g = converted.graph.unwrap();
    // unnamed nodes are named after their first output
    assert_eq!(g.node[0].input, vec!["x", "y_starts", "y_ends"]);
    assert!(g.node[0].attribute.is_empty());
    assert_eq!(g.initializer.len(), 2);
}

#[test]
fn test_optional_attribute_absent_adds_nothing() {
    let n = node("Squeeze", "sq", &["x"], &["y"]);
    let converted = AxesInputConverter.convert(single_node_model(n, 11), 13).unwrap();
    let g = converted.graph.unwrap();
    assert_eq!(g.node[0].input, vec!["x"]);
    assert!(g.initializer.is_empty());
}

#[test]
fn test_dropout_ratio_becomes_float_input() {
    let mut n = node("Dropout", "drop", &["x"], &["y"]);
    n.attribute.push(onnx::AttributeProto {
        name: "ratio".to_string(),
        r#type: AttributeType::Float as i32,
        f: 0.25,
        ..Default::default()
    });
    let converted = AxesInputConverter.convert(single_node_model(n, 11), 13).unwrap();
    let g = converted.graph.unwrap();
    assert_eq!(g.node[0].input, vec!["x", "drop_ratio"]);
    let ratio = initializer(&g, "drop_ratio");
    assert_eq!(ratio.data_type, DataType::Float as i32);
    assert!(ratio.dims.is_empty());
    assert_eq!(ratio.float_data, vec![0.25]);
}

#[test]
fn test_migration_outside_window_is_skipped() {
    let n = with_ints(node("ReduceMean", "mean", &["x"], &["y"]), "axes", &[1]);
    let converted = AxesInputConverter.convert(single_node_model(n, 13), 17).unwrap();
    let g = converted.graph.unwrap();
    assert_eq!(g.node[0].input, vec!["x"]);
    assert_eq!(g.node[0].attribute.len(), 1);
}

#[test]
fn test_subgraph_initializers_stay_in_subgraph() {
    init_logging();
    let body = graph(
        "then",
        vec![],
        &[],
        vec![with_ints(node("Unsqueeze", "unsq", &["x"], &["u"]), "axes", &[0])],
    );
    let g = graph(
        "main",
        vec![tensor_value("x", &["3"]), tensor_value("cond", &[])],
        &[],
        vec![with_subgraph(node("If", "if", &["cond"], &["y"]), "then_branch", body)],
    );
    let converted = AxesInputConverter.convert(model(g, 11), 13).unwrap();
    let g = converted.graph.unwrap();
    assert!(g.initializer.is_empty());
    let body = g.node[0].attribute[0].g.as_ref().unwrap();
    assert_eq!(body.node[0].input, vec!["x", "unsq_axes"]);
    assert_eq!(initializer(body, "unsq_axes").int64_data, vec![0]);
}

#[test]
fn test_new_names_do_not_collide() {
    let mut g = graph(
        "main",
        vec![tensor_value("x", &["2", "3"]), tensor_value("sq_axes", &["1"])],
        &["sq_axes_1"],
        vec![with_ints(node("Squeeze", "sq", &["x"], &["y"]), "axes", &[0])],
    );
    g.node.push(with_ints(node("Squeeze", "sq", &["y"], &["z"]), "axes", &[0]));
    let converted = AxesInputConverter.convert(model(g, 11), 13).unwrap();
    let g = converted.graph.unwrap();
    assert_eq!(g.node[0].input[1], "sq_axes_2");
    assert_eq!(g.node[1].input[1], "sq_axes_3");
}

#[test]
fn test_other_domains_untouched() {
    let mut n = with_ints(node("ReduceMean", "custom", &["x"], &["y"]), "axes", &[1]);
    n.domain = "com.example".to_string();
    let mut m = single_node_model(n, 13);
    m.opset_import.push(onnx::OperatorSetIdProto {
        domain: "com.example".to_string(),
        version: 1,
    });
    let converted = AxesInputConverter.convert(m, 18).unwrap();
    let g = converted.graph.as_ref().unwrap();
    assert_eq!(g.node[0].input, vec!["x"]);
    assert_eq!(converted.opset_import[1].version, 1);
}

#[test]
fn test_conversion_errors() {
    let m = single_node_model(node("Relu", "r", &["x"], &["y"]), 13);
    assert!(matches!(
        AxesInputConverter.convert(m.clone(), 11),
        Err(OpsetError::Downgrade {
            current: 13,
            target: 11
        })
    ));
    assert_eq!(AxesInputConverter.convert(m.clone(), 13).unwrap(), m);

    let mut no_core = m;
    no_core.opset_import.clear();
    assert!(matches!(
        AxesInputConverter.convert(no_core, 13),
        Err(OpsetError::MissingCoreOpset)
    ));

    let pad = single_node_model(with_ints(node("Pad", "pad", &["x"], &["y"]), "pads", &[0; 4]), 10);
    let err = AxesInputConverter.convert(pad.clone(), 13).unwrap_err();
    assert!(matches!(
        &err,
        OpsetError::UnsupportedConversion { op_type, breaking_version: 11, .. } if op_type == "Pad"
    ));
    assert_eq!(err.to_string(), "Can't convert Pad node \"pad\" across opset 11");
    assert!(AxesInputConverter.convert(pad, 10).is_ok());

    let unsqueeze = single_node_model(node("Unsqueeze", "u", &["x"], &["y"]), 11);
    assert!(matches!(
        AxesInputConverter.convert(unsqueeze, 13),
        Err(OpsetError::MissingAttribute { attribute, .. }) if attribute == "axes"
    ));
}

#[test]
fn test_update_onnx_opset_files() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("model.onnx");
    let output = dir.path().join("model.opset13.onnx");
    let n = with_ints(node("ReduceSum", "sum", &["x"], &["y"]), "axes", &[0]);
    save_model(&single_node_model(n, 12), &input).unwrap();

    let converted = update_onnx_opset(&input, 13, Some(output.as_path()), &AxesInputConverter).unwrap();
    assert_eq!(load_model(&output).unwrap(), converted);
    assert_eq!(core_opset_version(&load_model(&input).unwrap()), Some(12));

    let err = update_onnx_opset(&input, 11, None, &AxesInputConverter).unwrap_err();
    assert!(matches!(err, ModelUtilsError::Opset(OpsetError::Downgrade { .. })));
}

fn four_d_model(n: onnx::NodeProto, opset: i64) -> onnx::ModelProto {
    model(
        graph("main", vec![tensor_value("x", &["1", "3", "4", "4"])], &[], vec![n]),
        opset,
    )
}

#[test]
fn test_softmax_family_default_axis_is_rejected() {
    init_logging();
    for op_type in ["Softmax", "LogSoftmax", "Hardmax"] {
        let m = four_d_model(node(op_type, "sm", &["x"], &["y"]), 12);
        let err = AxesInputConverter.convert(m, 13).unwrap_err();
        assert!(matches!(
            &err,
            OpsetError::UnsupportedConversion { op_type: op, breaking_version: 13, .. } if op == op_type
        ));

        let m = four_d_model(with_int(node(op_type, "sm", &["x"], &["y"]), "axis", 1), 12);
        assert!(AxesInputConverter.convert(m, 13).is_err());
    }
}

#[test]
fn test_softmax_over_last_axis_carries_over() {
    let m = four_d_model(with_int(node("Softmax", "sm", &["x"], &["y"]), "axis", -1), 11);
    let converted = AxesInputConverter.convert(m, 13).unwrap();
    let g = converted.graph.unwrap();
    assert_eq!(g.node[0].attribute.len(), 1);
    assert_eq!(g.node[0].attribute[0].i, -1);

    // already past the change
    let m = four_d_model(node("Softmax", "sm", &["x"], &["y"]), 13);
    assert!(AxesInputConverter.convert(m, 18).is_ok());
}

#[test]
fn test_batch_normalization_spatial() {
    let inputs = ["x", "scale", "bias", "mean", "var"];
    let m = four_d_model(with_int(node("BatchNormalization", "bn", &inputs, &["y"]), "spatial", 0), 8);
    assert!(matches!(
        AxesInputConverter.convert(m, 9),
        Err(OpsetError::UnsupportedConversion { breaking_version: 9, .. })
    ));

    let mut n = with_int(node("BatchNormalization", "bn", &inputs, &["y"]), "spatial", 1);
    n.attribute.push(onnx::AttributeProto {
        name: "epsilon".to_string(),
        r#type: AttributeType::Float as i32,
        f: 1e-3,
        ..Default::default()
    });
    let converted = AxesInputConverter.convert(four_d_model(n, 8), 9).unwrap();
    let names: Vec<_> = converted.graph.as_ref().unwrap().node[0]
        .attribute
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, vec!["epsilon"]);
}

#[test]
fn test_equal_split_gets_num_outputs() {
    let m = four_d_model(with_int(node("Split", "split", &["x"], &["a", "b"]), "axis", 2), 13);
    let converted = AxesInputConverter.convert(m, 18).unwrap();
    let n = &converted.graph.as_ref().unwrap().node[0];
    assert_eq!(n.input, vec!["x"]);
    let num_outputs = n.attribute.iter().find(|a| a.name == "num_outputs").unwrap();
    assert_eq!(num_outputs.i, 2);
}

#[test]
fn test_explicit_split_needs_no_num_outputs() {
    let n = with_ints(node("Split", "split", &["x"], &["a", "b"]), "split", &[1, 3]);
    let converted = AxesInputConverter.convert(four_d_model(n, 11), 18).unwrap();
    let g = converted.graph.unwrap();
    assert_eq!(g.node[0].input, vec!["x", "split_split"]);
    assert!(g.node[0].attribute.iter().all(|a| a.name != "num_outputs"));
    assert_eq!(initializer(&g, "split_split").int64_data, vec![1, 3]);
}

#[test]
fn test_old_ir_declares_new_initializers_as_inputs() {
    let n = with_ints(node("Unsqueeze", "unsq", &["x"], &["y"]), "axes", &[0, 1]);
    let mut m = single_node_model(n, 11);
    m.ir_version = 3;
    let converted = AxesInputConverter.convert(m, 13).unwrap();
    let g = converted.graph.unwrap();
    let names: Vec<_> = g.input.iter().map(|x| x.name.as_str()).collect();
    assert_eq!(names, vec!["x", "unsq_axes"]);
    assert_eq!(shape_of(&g.input[1]), vec!["2"]);

    // newer IR versions keep initializers out of the inputs
    let n = with_ints(node("Unsqueeze", "unsq", &["x"], &["y"]), "axes", &[0]);
    let converted = AxesInputConverter.convert(single_node_model(n, 11), 13).unwrap();
    assert_eq!(converted.graph.unwrap().input.len(), 1);
}
