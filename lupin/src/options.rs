//! Configuration values threaded through the computation and the
//! persisted option tables.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Training options as supplied by the training program: a JSON
/// object with numeric entries and at most one level of nesting.
pub type TrainOptions = Map<String, Value>;

/// Training options that never reach the numeric table
pub const EXCLUDED_TRAIN_OPTIONS: [&str; 2] = ["schedule", "convergence_mode"];

/// Separator between a nested option and its parent key
pub const NESTED_KEY_SEP: &str = "_";

/// Options for the array computation itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeOptions {
    /// request an accelerated array backend; accepted for
    /// compatibility, every computation runs on the CPU
    #[serde(default)]
    pub gpu_mode: bool,
}

/// The subset of model options kept in the persisted container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// likelihood per view, e.g. `gaussian`
    pub likelihoods: Vec<String>,
    /// spike-and-slab prior on the factors
    pub sl_z: bool,
    /// spike-and-slab prior on the loadings
    pub sl_w: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            likelihoods: vec![],
            sl_z: false,
            sl_w: true,
        }
    }
}

impl ModelOptions {
    /// Field names with their byte-string representation. Booleans
    /// are spelled `True`/`False` so that existing readers of the
    /// container keep working.
    pub fn persisted_fields(&self) -> Vec<(&'static str, Vec<Box<str>>)> {
        let spell = |b: bool| -> Box<str> { if b { "True".into() } else { "False".into() } };
        vec![
            (
                "likelihoods",
                self.likelihoods
                    .iter()
                    .map(|x| x.clone().into_boxed_str())
                    .collect(),
            ),
            ("sl_z", vec![spell(self.sl_z)]),
            ("sl_w", vec![spell(self.sl_w)]),
        ]
    }
}

/// Flatten the training options into a numeric table.
///
/// A nested object `{"a": {"b": 1}}` becomes `a_b` and the parent
/// key is removed; `schedule` and `convergence_mode` are removed;
/// then only numeric-coercible values survive.
pub fn flatten_train_options(opts: &TrainOptions) -> Vec<(Box<str>, f64)> {
    let mut flat: Vec<(String, &Value)> = Vec::with_capacity(opts.len());
    let mut nested: Vec<(String, &Value)> = vec![];

    for (k, v) in opts.iter() {
        match v {
            Value::Object(children) => {
                for (k1, v1) in children.iter() {
                    nested.push((format!("{}{}{}", k, NESTED_KEY_SEP, k1), v1));
                }
            }
            _ => flat.push((k.clone(), v)),
        }
    }

    for (k, v) in nested {
        if let Some(slot) = flat.iter_mut().find(|(k0, _)| *k0 == k) {
            slot.1 = v;
        } else {
            flat.push((k, v));
        }
    }

    flat.into_iter()
        .filter(|(k, _)| !EXCLUDED_TRAIN_OPTIONS.contains(&k.as_str()))
        .filter_map(|(k, v)| match numeric_value(v) {
            Some(x) => Some((k.into_boxed_str(), x)),
            None => {
                warn!("dropping non-numeric training option {} = {}", k, v);
                None
            }
        })
        .collect()
}

fn numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(x) => x.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_options(v: Value) -> TrainOptions {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn nested_options_are_flattened() {
        let opts = as_options(json!({"stochastic": {"batch_size": 50, "lr": 0.1}}));
        let flat = flatten_train_options(&opts);

        assert_eq!(
            flat,
            vec![
                ("stochastic_batch_size".into(), 50.0),
                ("stochastic_lr".into(), 0.1)
            ]
        );
        assert!(flat.iter().all(|(k, _)| k.as_ref() != "stochastic"));
    }

    #[test]
    fn string_options_are_omitted() {
        let opts = as_options(json!({
            "maxiter": 1000,
            "schedule": ["Y", "W", "Z", "Tau"],
            "convergence_mode": "fast",
            "verbose": false,
            "tolerance": "0.01",
            "label": "not a number"
        }));
        let flat = flatten_train_options(&opts);

        let names: Vec<&str> = flat.iter().map(|(k, _)| k.as_ref()).collect();
        assert_eq!(names, vec!["maxiter", "verbose", "tolerance"]);
        assert_eq!(flat[1].1, 0.0);
        assert_eq!(flat[2].1, 0.01);
    }

    #[test]
    fn model_options_spell_booleans() {
        let opts = ModelOptions {
            likelihoods: vec!["gaussian".into(), "bernoulli".into()],
            sl_z: false,
            sl_w: true,
        };
        let fields = opts.persisted_fields();
        assert_eq!(fields[0].1.len(), 2);
        assert_eq!(fields[1].1[0].as_ref(), "False");
        assert_eq!(fields[2].1[0].as_ref(), "True");
    }
}
