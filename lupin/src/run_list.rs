use anyhow::Result;
use clap::Args;
use log::info;

use lupin::persist::store::join_path;
use lupin::persist::{Dataset, Hdf5Store, MemoryStore, PersistedModel};
use matrix_util::common_io::write_lines;

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(help = "Saved model (HDF5)")]
    pub h5_file: Box<str>,

    #[arg(short, long, default_value = "stdout", help = "Output file (.gz ok) or `stdout`")]
    pub out: Box<str>,
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[arg(help = "Saved model (HDF5)")]
    pub h5_file: Box<str>,

    #[arg(short, long, default_value = "stdout", help = "Output file (.gz ok) or `stdout`")]
    pub out: Box<str>,
}

fn describe(data: &Dataset) -> String {
    let kind = match data {
        Dataset::Matrix(_) => "f64",
        Dataset::Vector(_) => "f64",
        Dataset::Integers(_) => "i64",
        Dataset::Names(_) | Dataset::Label(_) => "str",
    };
    format!("{} {:?}", kind, data.shape())
}

/// One line per group or dataset, indented by depth
pub fn tree_lines(store: &MemoryStore) -> Vec<Box<str>> {
    fn visit(store: &MemoryStore, path: &str, indent: usize, lines: &mut Vec<Box<str>>) {
        for member in store.children(path) {
            let child = join_path(path, member);
            let line = match store.dataset(&child) {
                Some(data) => format!("{:indent$}{}  {}", "", member, describe(data), indent = indent),
                None => format!("{:indent$}{}/", "", member, indent = indent),
            };
            lines.push(line.into_boxed_str());
            if store.has_group(&child) {
                visit(store, &child, indent + 2, lines);
            }
        }
    }

    let mut lines = vec![];
    visit(store, "", 0, &mut lines);
    lines
}

/// What a persisted model holds, one fact per line
pub fn summary_lines(model: &PersistedModel) -> Vec<Box<str>> {
    let mut lines: Vec<String> = vec![];

    lines.push("views:".into());
    for v in model.views() {
        let nfeatures = model.features(v).map(|f| f.len()).unwrap_or(0);
        lines.push(format!("  {}\t{} features", v, nfeatures));
    }

    lines.push("groups:".into());
    for g in model.groups() {
        let nsamples = model.samples(g).map(|s| s.len()).unwrap_or(0);
        lines.push(format!("  {}\t{} samples", g, nsamples));
    }

    let nodes: Vec<String> = model.nodes().iter().map(|n| n.to_string()).collect();
    lines.push(format!("expectations: {}", nodes.join(", ")));

    if let Some(likelihoods) = model.model_option("likelihoods") {
        lines.push(format!("likelihoods: {}", likelihoods.join(", ")));
    }

    lines.push("training options:".into());
    for (k, v) in model.train_options() {
        lines.push(format!("  {}\t{}", k, v));
    }

    let stats = model.training_stats();
    if let (Some(elbo), Some(nf)) = (stats.elbo.last(), stats.number_factors.last()) {
        lines.push(format!(
            "{} iterations, final ELBO {:.4}, {} factors",
            stats.num_iterations(),
            elbo,
            nf
        ));
    }

    lines.into_iter().map(|x| x.into_boxed_str()).collect()
}

/// List the tree of a saved model
pub fn run_list(args: &ListArgs) -> Result<()> {
    let store = Hdf5Store::load(&args.h5_file)?;
    write_lines(&tree_lines(&store), &args.out)?;
    info!("listed {}", args.h5_file);
    Ok(())
}

/// Print what is in a saved model
pub fn run_summary(args: &SummaryArgs) -> Result<()> {
    let model = PersistedModel::load_hdf5(&args.h5_file)?;
    write_lines(&summary_lines(&model), &args.out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lupin::persist::HierarchicalStore;
    use matrix_util::common_io::{create_temp_dir_file, mkdir, read_lines};
    use ndarray::Array2;

    #[test]
    fn tree_is_written_as_lines() -> anyhow::Result<()> {
        let mut store = MemoryStore::new();
        store.create_group("data")?;
        store.create_group("data/rna")?;
        store.write_dataset("data/rna/g1", &Dataset::Matrix(Array2::zeros((2, 3))), Some(9))?;
        store.write_dataset("samples", &Dataset::Names(vec!["s0".into()]), None)?;

        let lines = tree_lines(&store);
        let expected: Vec<Box<str>> = vec![
            "data/".into(),
            "  rna/".into(),
            "    g1  f64 [2, 3]".into(),
            "samples  str [1]".into(),
        ];
        assert_eq!(lines, expected);

        let file = create_temp_dir_file(".txt.gz")?;
        let file = file.to_str().unwrap();
        mkdir(file)?;
        write_lines(&lines, file)?;
        assert_eq!(read_lines(file)?, expected);
        std::fs::remove_file(file)?;
        Ok(())
    }
}
