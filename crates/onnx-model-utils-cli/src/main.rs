use std::path::Path;

use anyhow::Result;
use clap::Parser;
use onnx_model_utils::{
    AxesInputConverter, DynamicShapeFix, ModelIoError, OptimizationLevel, compute_dependency_maps,
    is_fixed_size_tensor, load_model, make_dynamic_shape_fixed, update_onnx_opset,
};

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::UpdateOpset {
            model,
            opset,
            output,
        } => {
            update_onnx_opset(&model, opset, output.as_deref(), &AxesInputConverter)?;
        }
        Commands::Optimize {
            model,
            output,
            level,
        } => optimize(&model, output.as_deref(), level, cli.verbose > 0)?,
        Commands::MakeFixed {
            model,
            output,
            dim_param,
            dim_value,
            input_name,
            input_shape,
        } => {
            let fix = match (dim_param, dim_value, input_name, input_shape) {
                (Some(name), Some(value), _, _) => DynamicShapeFix::DimParam { name, value },
                (_, _, Some(input_name), Some(shape)) => {
                    DynamicShapeFix::InputShape { input_name, shape }
                }
                _ => anyhow::bail!("Either --dim-param and --dim-value or --input-name and --input-shape must be provided"),
            };
            let fixed = make_dynamic_shape_fixed(&model, &output, &fix)?;
            let graph = fixed.graph.as_ref().ok_or(ModelIoError::MissingGraph)?;
            let dynamic: Vec<&str> = graph
                .input
                .iter()
                .filter(|x| !is_fixed_size_tensor(x))
                .map(|x| x.name.as_str())
                .collect();
            if dynamic.is_empty() {
                log::info!("All model inputs are fixed size");
            } else {
                log::warn!("Inputs that are still not fixed size: {}", dynamic.join(","));
            }
        }
        Commands::Dependencies { model, json } => print_dependencies(&model, json)?,
    }
    Ok(())
}

#[cfg(feature = "ort")]
fn optimize(
    model: &Path,
    output: Option<&Path>,
    level: OptimizationLevel,
    verbose: bool,
) -> Result<()> {
    let optimizer = onnx_model_utils::OrtOptimizer { verbose };
    let written = onnx_model_utils::optimize_model(model, output, level, &optimizer)?;
    log::info!("Saved optimized model to {}", written.display());
    Ok(())
}

#[cfg(not(feature = "ort"))]
fn optimize(
    _model: &Path,
    _output: Option<&Path>,
    _level: OptimizationLevel,
    _verbose: bool,
) -> Result<()> {
    Err(onnx_model_utils::OptimizeError::Unavailable.into())
}

fn print_dependencies(model_path: &Path, json: bool) -> Result<()> {
    let model = load_model(model_path)?;
    let graph = model.graph.as_ref().ok_or(ModelIoError::MissingGraph)?;
    let report = compute_dependency_maps(graph)?.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} nodes, {} links", report.num_nodes, report.num_edges);
    for node in &report.nodes {
        println!("[{}] {} ({})", node.id, node.label, node.op_type);
        if !node.producers.is_empty() {
            println!("    producers: {}", node.producers.join(", "));
        }
        if !node.consumers.is_empty() {
            println!("    consumers: {}", node.consumers.join(", "));
        }
    }
    Ok(())
}
