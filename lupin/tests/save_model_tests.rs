mod common;

use common::*;
use lupin::nodes::NodeName;
use lupin::options::{ModelOptions, TrainOptions};
use lupin::persist::*;
use lupin::ModelError;
use matrix_util::common_io::create_temp_dir_file;
use serde_json::json;

fn model_options() -> ModelOptions {
    ModelOptions {
        likelihoods: vec!["gaussian".into(), "gaussian".into()],
        sl_z: false,
        sl_w: true,
    }
}

fn train_options() -> TrainOptions {
    match json!({
        "maxiter": 100,
        "tolerance": "0.01",
        "schedule": ["Y", "W", "Z", "Tau"],
        "convergence_mode": "fast",
        "stochastic": {"batch_size": 0.5, "learning_rate": 1.0},
        "verbose": false
    }) {
        serde_json::Value::Object(m) => m,
        _ => unreachable!(),
    }
}

fn inputs<'a>(
    fx: &'a Fixture,
    model_options: &'a ModelOptions,
    train_options: &'a TrainOptions,
) -> SaveInputs<'a> {
    SaveInputs {
        data: &fx.data,
        samples_groups: &fx.samples_groups,
        names: &fx.names,
        model_options,
        train_options,
    }
}

fn model_error(err: &anyhow::Error) -> Option<&ModelError> {
    err.downcast_ref::<ModelError>()
}

#[test]
fn hdf5_round_trip() -> anyhow::Result<()> {
    let fx = two_view_model(true)?;
    let (mo, to) = (model_options(), train_options());

    let file = create_temp_dir_file(".h5")?;
    let file = file.to_str().unwrap();

    save_model(
        &fx.model,
        inputs(&fx, &mo, &to),
        &SaveOptions::default(),
        &NodeSelection::All,
        file,
    )?;

    let saved = PersistedModel::load_hdf5(file)?;

    assert_eq!(saved.views(), boxed(&["view0", "view1"]).as_slice());
    assert_eq!(saved.groups(), boxed(&["a", "b"]).as_slice());
    assert_eq!(saved.samples("a").unwrap(), boxed(&["s1", "s3"]).as_slice());
    assert_eq!(saved.samples("b").unwrap().len(), 3);
    assert_eq!(saved.features("view1").unwrap().len(), 2);
    assert_eq!(saved.num_samples(), 5);

    // group b holds samples 0, 2, 4 in that order
    let y = saved.data("view0", "b").unwrap();
    assert_eq!(y.dim(), (3, 3));
    assert!(y[[0, 1]].is_nan());
    assert_eq!(y[[1, 0]], 2.0);

    let y_exp = saved.expectation(NodeName::Y, &["view0", "a"]).unwrap();
    assert_eq!(y_exp.dim(), (2, 3));

    // single-group loadings are stored factors x features
    let w = saved.expectation(NodeName::W, &["view0"]).unwrap();
    assert_eq!(w.dim(), (1, 3));
    assert_eq!(w.row(0).to_vec(), vec![1.0, 2.0, 3.0]);

    let z = saved.expectation(NodeName::Z, &["a"]).unwrap();
    assert_eq!(z.dim(), (1, 2));
    approx::assert_abs_diff_eq!(z[[0, 1]], 0.3, epsilon = 1e-12);

    let tau = saved.expectation(NodeName::Tau, &["view0", "b"]).unwrap();
    assert_eq!(tau.dim(), (3, 3));
    assert!(tau[[0, 1]].is_nan());
    assert_eq!(tau[[0, 0]], 2.0);

    let alpha = saved.expectation(NodeName::AlphaW, &["view1"]).unwrap();
    assert_eq!(alpha[[0, 0]], 2.0);

    let mut nodes = saved.nodes();
    let mut expected = vec![
        NodeName::Y,
        NodeName::Z,
        NodeName::W,
        NodeName::Tau,
        NodeName::AlphaW,
    ];
    nodes.sort();
    expected.sort();
    assert_eq!(nodes, expected);

    assert_eq!(saved.model_option("sl_w").unwrap(), boxed(&["True"]).as_slice());
    assert_eq!(saved.model_option("likelihoods").unwrap().len(), 2);

    assert_eq!(saved.train_option("maxiter"), Some(100.0));
    assert_eq!(saved.train_option("tolerance"), Some(0.01));
    assert_eq!(saved.train_option("stochastic_batch_size"), Some(0.5));
    assert_eq!(saved.train_option("verbose"), Some(0.0));
    assert_eq!(saved.train_option("schedule"), None);
    assert_eq!(saved.train_option("convergence_mode"), None);

    let stats = saved.training_stats();
    assert_eq!(stats.number_factors, vec![1]);
    assert_eq!(stats.time, vec![0.25]);
    assert_eq!(stats.elbo.len(), 1);

    std::fs::remove_file(file)?;
    Ok(())
}

#[test]
fn staged_tree_layout() -> anyhow::Result<()> {
    let fx = two_view_model(true)?;
    let (mo, to) = (model_options(), train_options());

    let options = SaveOptions {
        compression_level: 4,
    };
    let mut writer = ModelWriter::new(&fx.model, inputs(&fx, &mo, &to), &options)?;
    writer.save_all(&"Z, W".parse::<NodeSelection>()?)?;
    let store = writer.into_store();

    assert_eq!(
        store.children(""),
        vec![
            "data",
            "features",
            "samples",
            "expectations",
            "model_options",
            "training_stats",
            "training_opts"
        ]
    );
    assert_eq!(store.children("expectations"), vec!["Z", "W"]);
    assert_eq!(store.children("data/view1"), vec!["a", "b"]);
    assert_eq!(store.compression("data/view0/a"), Some(4));
    assert_eq!(store.compression("samples/a"), None);
    assert_eq!(
        store.names_attr("model_options").unwrap(),
        boxed(&["likelihoods", "sl_z", "sl_w"]).as_slice()
    );
    assert_eq!(store.names_attr("training_opts").unwrap().len(), 5);
    Ok(())
}

#[test]
fn group_length_mismatch_writes_nothing() -> anyhow::Result<()> {
    let mut fx = two_view_model(true)?;
    fx.samples_groups.pop();
    let (mo, to) = (model_options(), train_options());

    let file = create_temp_dir_file(".h5")?;
    let file = file.to_str().unwrap();

    let err = save_model(
        &fx.model,
        inputs(&fx, &mo, &to),
        &SaveOptions::default(),
        &NodeSelection::All,
        file,
    )
    .unwrap_err();

    assert!(matches!(
        model_error(&err),
        Some(ModelError::GroupLengthMismatch {
            groups: 4,
            samples: 5
        })
    ));
    assert!(!std::path::Path::new(file).exists());
    Ok(())
}

#[test]
fn untrained_model_is_rejected() -> anyhow::Result<()> {
    let fx = two_view_model(false)?;
    let (mo, to) = (model_options(), train_options());

    let err = ModelWriter::new(&fx.model, inputs(&fx, &mo, &to), &SaveOptions::default())
        .err()
        .unwrap();
    assert!(matches!(model_error(&err), Some(ModelError::NotTrained)));
    Ok(())
}

#[test]
fn bad_compression_and_names_are_rejected() -> anyhow::Result<()> {
    let fx = two_view_model(true)?;
    let (mo, to) = (model_options(), train_options());

    let options = SaveOptions {
        compression_level: 0,
    };
    let err = ModelWriter::new(&fx.model, inputs(&fx, &mo, &to), &options)
        .err()
        .unwrap();
    assert!(matches!(
        model_error(&err),
        Some(ModelError::InvalidCompression(0))
    ));

    let mut names = fx.names.clone();
    names.features[1].pop();
    let bad = SaveInputs {
        names: &names,
        ..inputs(&fx, &mo, &to)
    };
    let err = ModelWriter::new(&fx.model, bad, &SaveOptions::default())
        .err()
        .unwrap();
    assert!(matches!(
        model_error(&err),
        Some(ModelError::DimensionMismatch { .. })
    ));
    Ok(())
}

#[test]
fn unrecognised_node_selection() {
    let err = "Z,Gamma".parse::<NodeSelection>().unwrap_err();
    assert!(matches!(err, ModelError::UnrecognisedNode(ref x) if x == "Gamma"));

    assert_eq!("all".parse::<NodeSelection>().unwrap(), NodeSelection::All);
    assert_eq!(
        NodeSelection::from_names(&["Tau", "Y"]).unwrap(),
        NodeSelection::Only(vec![NodeName::Tau, NodeName::Y])
    );
}

#[test]
#[allow(deprecated)]
fn save_parameters_writes_nothing() -> anyhow::Result<()> {
    let fx = two_view_model(true)?;
    let (mo, to) = (model_options(), train_options());

    let mut writer = ModelWriter::new(&fx.model, inputs(&fx, &mo, &to), &SaveOptions::default())?;
    writer.save_parameters(&NodeSelection::All)?;
    assert!(writer.store().children("").is_empty());
    Ok(())
}

#[test]
fn repeated_node_is_written_once() -> anyhow::Result<()> {
    let fx = two_view_model(true)?;
    let (mo, to) = (model_options(), train_options());

    let mut writer = ModelWriter::new(&fx.model, inputs(&fx, &mo, &to), &SaveOptions::default())?;
    writer.save_expectations(&"Z,W,Z".parse::<NodeSelection>()?)?;
    assert_eq!(writer.store().children("expectations"), vec!["Z", "W"]);
    assert_eq!(writer.store().children("expectations/Z"), vec!["a", "b"]);
    Ok(())
}

#[test]
fn failed_write_keeps_the_previous_file() -> anyhow::Result<()> {
    let fx = two_view_model(true)?;
    let (mo, to) = (model_options(), train_options());

    let file = create_temp_dir_file(".h5")?;
    let file = file.to_str().unwrap();

    save_model(
        &fx.model,
        inputs(&fx, &mo, &to),
        &SaveOptions::default(),
        &NodeSelection::All,
        file,
    )?;

    // passes every shape check but cannot be encoded as ascii
    let mut names = fx.names.clone();
    names.samples[0] = "sämple".into();
    let bad = SaveInputs {
        names: &names,
        ..inputs(&fx, &mo, &to)
    };
    assert!(save_model(
        &fx.model,
        bad,
        &SaveOptions::default(),
        &NodeSelection::All,
        file
    )
    .is_err());

    let saved = PersistedModel::load_hdf5(file)?;
    assert_eq!(saved.samples("b").unwrap()[0].as_ref(), "s0");

    let dir = std::path::Path::new(file).parent().unwrap();
    assert_eq!(std::fs::read_dir(dir)?.count(), 1);

    std::fs::remove_file(file)?;
    Ok(())
}
