use clap::{ArgGroup, Parser, Subcommand};
use onnx_model_utils::{OptimizationLevel, get_optimization_level};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "onnx-model-utils")]
#[command(version, about = "Inspect and rewrite ONNX models")]
pub struct Cli {
    /// Log more detail (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a model to a newer default ONNX opset
    UpdateOpset {
        /// Model to convert
        model: PathBuf,

        /// Target opset version
        #[arg(long)]
        opset: i64,

        /// Where to save the converted model
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run ONNX Runtime graph optimizations and save the optimized model
    Optimize {
        /// Model to optimize
        model: PathBuf,

        /// Output path. Defaults to <model>.<level>.optimized.onnx
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// One of disable, basic, extended, all
        #[arg(long, default_value = "basic", value_parser = get_optimization_level)]
        level: OptimizationLevel,
    },

    /// Replace dynamic dimensions with fixed values
    #[command(group(ArgGroup::new("fix").required(true).args(["dim_param", "input_name"])))]
    MakeFixed {
        /// Model to update
        model: PathBuf,

        /// Where to save the updated model
        output: PathBuf,

        /// Symbolic dimension to replace everywhere it appears
        #[arg(long, requires = "dim_value")]
        dim_param: Option<String>,

        /// Value to use for --dim-param
        #[arg(long, requires = "dim_param", value_parser = clap::value_parser!(i64).range(1..))]
        dim_value: Option<i64>,

        /// Graph input whose shape should be set
        #[arg(long, requires = "input_shape")]
        input_name: Option<String>,

        /// Comma separated shape for --input-name, e.g. 1,3,224,224
        #[arg(
            long,
            requires = "input_name",
            value_delimiter = ',',
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        input_shape: Option<Vec<i64>>,
    },

    /// Print the producers and consumers of every node
    Dependencies {
        /// Model to analyse
        model: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
