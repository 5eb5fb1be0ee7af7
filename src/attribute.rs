use crate::onnx;
use crate::onnx::attribute_proto::AttributeType;

/// Singular non-graph attribute payloads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar<'a> {
    Float(f32),
    Int(i64),
    String(&'a [u8]),
}

/// List attribute payloads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Repeated<'a> {
    Floats(&'a [f32]),
    Ints(&'a [i64]),
    Strings(&'a [Vec<u8>]),
    Tensors(&'a [onnx::TensorProto]),
    Graphs(&'a [onnx::GraphProto]),
}

/// Borrowed view of whichever value an [`onnx::AttributeProto`] carries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AttributeValue<'a> {
    Scalar(Scalar<'a>),
    Tensor(&'a onnx::TensorProto),
    Graph(&'a onnx::GraphProto),
    Repeated(Repeated<'a>),
    /// Sparse tensors, type protos, or an attribute with no payload.
    Other(AttributeType),
}

/// The declared kind of an attribute.
///
/// IR version 1 models predate the `type` field, so an UNDEFINED
/// discriminator falls back to looking at which payload field is populated.
pub fn attribute_type(attr: &onnx::AttributeProto) -> AttributeType {
    match AttributeType::try_from(attr.r#type) {
        Ok(AttributeType::Undefined) | Err(_) => infer_attribute_type(attr),
        Ok(x) => x,
    }
}

fn infer_attribute_type(attr: &onnx::AttributeProto) -> AttributeType {
    if attr.g.is_some() {
        AttributeType::Graph
    } else if !attr.graphs.is_empty() {
        AttributeType::Graphs
    } else if attr.t.is_some() {
        AttributeType::Tensor
    } else if !attr.tensors.is_empty() {
        AttributeType::Tensors
    } else if !attr.ints.is_empty() {
        AttributeType::Ints
    } else if !attr.floats.is_empty() {
        AttributeType::Floats
    } else if !attr.strings.is_empty() {
        AttributeType::Strings
    } else if !attr.s.is_empty() {
        AttributeType::String
    } else if attr.f != 0.0 {
        AttributeType::Float
    } else if attr.i != 0 {
        AttributeType::Int
    } else {
        AttributeType::Undefined
    }
}

impl<'a> From<&'a onnx::AttributeProto> for AttributeValue<'a> {
    fn from(attr: &'a onnx::AttributeProto) -> Self {
        match attribute_type(attr) {
            AttributeType::Float => AttributeValue::Scalar(Scalar::Float(attr.f)),
            AttributeType::Int => AttributeValue::Scalar(Scalar::Int(attr.i)),
            AttributeType::String => AttributeValue::Scalar(Scalar::String(&attr.s)),
            AttributeType::Tensor => match &attr.t {
                Some(t) => AttributeValue::Tensor(t),
                None => AttributeValue::Other(AttributeType::Tensor),
            },
            AttributeType::Graph => match &attr.g {
                Some(g) => AttributeValue::Graph(g),
                None => AttributeValue::Other(AttributeType::Graph),
            },
            AttributeType::Floats => AttributeValue::Repeated(Repeated::Floats(&attr.floats)),
            AttributeType::Ints => AttributeValue::Repeated(Repeated::Ints(&attr.ints)),
            AttributeType::Strings => AttributeValue::Repeated(Repeated::Strings(&attr.strings)),
            AttributeType::Tensors => AttributeValue::Repeated(Repeated::Tensors(&attr.tensors)),
            AttributeType::Graphs => AttributeValue::Repeated(Repeated::Graphs(&attr.graphs)),
            other => AttributeValue::Other(other),
        }
    }
}

/// Graphs nested in a node's attributes, in attribute order.
pub fn nested_graphs(node: &onnx::NodeProto) -> impl Iterator<Item = &onnx::GraphProto> {
    node.attribute
        .iter()
        .flat_map(|attr| match AttributeValue::from(attr) {
            AttributeValue::Graph(g) => std::slice::from_ref(g),
            AttributeValue::Repeated(Repeated::Graphs(graphs)) => graphs,
            _ => &[],
        })
}

pub fn nested_graphs_mut(node: &mut onnx::NodeProto) -> impl Iterator<Item = &mut onnx::GraphProto> {
    node.attribute.iter_mut().flat_map(|attr| {
        let graphs: &mut [onnx::GraphProto] = match attribute_type(attr) {
            AttributeType::Graph => match attr.g.as_mut() {
                Some(g) => std::slice::from_mut(g),
                None => &mut [],
            },
            AttributeType::Graphs => attr.graphs.as_mut_slice(),
            _ => &mut [],
        };
        graphs.iter_mut()
    })
}

pub fn has_nested_graphs(node: &onnx::NodeProto) -> bool {
    nested_graphs(node).next().is_some()
}

pub(crate) fn query_attribute<'a>(
    attributes: &'a [onnx::AttributeProto],
    name: &str,
) -> Option<AttributeValue<'a>> {
    attributes
        .iter()
        .find(|attr| attr.name == name)
        .map(AttributeValue::from)
}
