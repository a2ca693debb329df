use anyhow::Result;
use clap::Args;
use log::info;

use lupin::options::{ModelOptions, TrainOptions};
use lupin::persist::*;
use lupin::simulate::{simulate_factor_model, SimArgs};
use matrix_util::common_io::{open_buf_reader, read_lines};

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(short, long, help = "Output HDF5 file")]
    pub out: Box<str>,

    #[arg(long, default_value = "100", help = "Number of samples")]
    pub samples: usize,

    #[arg(long, default_value = "2", help = "Number of sample groups")]
    pub groups: usize,

    #[arg(
        long,
        value_delimiter = ',',
        default_value = "50,30",
        help = "Number of features in each view"
    )]
    pub features: Vec<usize>,

    #[arg(long, default_value = "5", help = "Number of factors")]
    pub factors: usize,

    #[arg(long, default_value = "0.05", help = "Fraction of missing entries")]
    pub missing: f64,

    #[arg(long, default_value = "10", help = "Noise precision")]
    pub precision: f64,

    #[arg(long, default_value = "42", help = "Random seed")]
    pub seed: u64,

    #[arg(long, default_value = "9", help = "gzip level of the data blocks (1-9)")]
    pub compression: u8,

    #[arg(
        long,
        default_value = "all",
        help = "Nodes whose expectations are saved: `all` or a comma-separated list"
    )]
    pub nodes: Box<str>,

    #[arg(
        long,
        help = "Group label of each sample, one per line (.gz ok); contiguous groups if omitted"
    )]
    pub groups_file: Option<Box<str>>,

    #[arg(long, help = "JSON file of training options")]
    pub train_opts: Option<Box<str>>,

    #[arg(long, help = "JSON file of model options")]
    pub model_opts: Option<Box<str>>,
}

fn read_json<T: serde::de::DeserializeOwned>(json_file: &str) -> Result<T> {
    let reader = open_buf_reader(json_file)?;
    Ok(serde_json::from_reader(reader)?)
}

pub fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let nodes: NodeSelection = args.nodes.parse()?;

    let sim_args = SimArgs {
        samples: args.samples,
        groups: args.groups,
        features: args.features.clone(),
        factors: args.factors,
        missing: args.missing,
        precision: args.precision,
        rseed: args.seed,
    };

    let mut sim = simulate_factor_model(&sim_args)?;

    if let Some(file) = &args.groups_file {
        sim.samples_groups = read_lines(file)?;
        info!("read {} group labels from {}", sim.samples_groups.len(), file);
    }

    let model_options = match &args.model_opts {
        Some(file) => read_json::<ModelOptions>(file)?,
        None => ModelOptions {
            likelihoods: vec!["gaussian".to_string(); args.features.len()],
            ..Default::default()
        },
    };

    let train_options = match &args.train_opts {
        Some(file) => read_json::<TrainOptions>(file)?,
        None => {
            let mut opts = TrainOptions::new();
            opts.insert("iter".into(), 1.into());
            opts.insert("seed".into(), args.seed.into());
            opts
        }
    };

    let inputs = SaveInputs {
        data: &sim.data,
        samples_groups: &sim.samples_groups,
        names: &sim.names,
        model_options: &model_options,
        train_options: &train_options,
    };

    let options = SaveOptions {
        compression_level: args.compression,
    };

    save_model(&sim.model, inputs, &options, &nodes, &args.out)?;

    info!("done");
    Ok(())
}
