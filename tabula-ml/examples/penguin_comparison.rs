//! Compare classifiers on a synthetic penguin dataset, then cluster it without labels.
//!
//! ```text
//! cargo run -p tabula-ml --example penguin_comparison [-- --json-logs] [--seed N] [config.toml]
//! ```

use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tabula_ml::cluster::{ClusterAlgorithm, cross_tabulate};
use tabula_ml::data::{Dataset, Value};
use tabula_ml::eval::interpret_kappa;
use tabula_ml::model::{Algorithm, ModelConfig};
use tabula_ml::resample::ResamplePlan;
use tabula_ml::{ConfigOverrides, Pipeline, load_config};

const SPECIES: [(&str, f64, f64, f64, &str); 3] = [
    // species, bill length, bill depth, flipper length, usual island
    ("Adelie", 38.8, 18.3, 190.0, "Torgersen"),
    ("Chinstrap", 48.8, 18.4, 196.0, "Dream"),
    ("Gentoo", 47.5, 15.0, 217.0, "Biscoe"),
];
const ISLANDS: [&str; 3] = ["Biscoe", "Dream", "Torgersen"];

/// Deterministic pseudo-noise in [-1, 1].
fn wobble(i: usize, salt: f64) -> f64 {
    ((i as f64 + 1.0) * salt).sin()
}

fn penguins(per_species: usize) -> anyhow::Result<Dataset> {
    let mut rows = Vec::with_capacity(per_species * SPECIES.len());
    for (s, &(name, bill, depth, flipper, island)) in SPECIES.iter().enumerate() {
        for i in 0..per_species {
            let n = s * per_species + i;
            // Most birds sit on their usual island; a few wander.
            let island = if n % 7 == 0 { ISLANDS[n % 3] } else { island };
            let bill = if n % 23 == 0 {
                Value::Missing
            } else {
                Value::from(bill + 2.5 * wobble(n, 1.31))
            };
            rows.push(vec![
                bill,
                Value::from(depth + 1.1 * wobble(n, 2.17)),
                Value::from(flipper + 6.0 * wobble(n, 0.73)),
                Value::from(island),
                Value::from(name),
            ]);
        }
    }
    Ok(Dataset::new(
        vec![
            "bill_length_mm".into(),
            "bill_depth_mm".into(),
            "flipper_length_mm".into(),
            "island".into(),
            "species".into(),
        ],
        rows,
    )?)
}

fn main() -> anyhow::Result<()> {
    let mut json_logs = false;
    let mut config_path = None;
    let mut overrides = ConfigOverrides::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json-logs" => json_logs = true,
            "--seed" => {
                let seed: u64 = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--seed needs a value"))?
                    .parse()?;
                overrides.split.seed = Some(seed);
                overrides.resampling.seed = Some(seed);
            }
            other => config_path = Some(PathBuf::from(other)),
        }
    }

    let layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new("debug"))
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new("info"))
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();

    let config = load_config(config_path.as_deref(), Some(&overrides))?;
    let dataset = penguins(60)?;
    let pipeline = Pipeline::new(
        "species",
        &["bill_length_mm", "bill_depth_mm", "flipper_length_mm"],
        &["island"],
    )
    .with_config(config.clone());

    let models = vec![
        ModelConfig::new("majority", Algorithm::MajorityClass),
        ModelConfig::new("knn_5", Algorithm::Knn { k: 5 }),
        ModelConfig::new(
            "random_forest",
            Algorithm::RandomForest {
                n_trees: 100,
                max_depth: None,
            },
        ),
        ModelConfig::new(
            "gradient_boosting",
            Algorithm::GradientBoosting {
                n_estimators: 50,
                learning_rate: 0.1,
                max_depth: 3,
            },
        ),
    ];

    let single = pipeline.run_once(&models[2], &dataset, config.split.seed)?;
    println!("{}", serde_json::to_string_pretty(&single.metrics)?);
    println!(
        "random forest agreement: {}",
        interpret_kappa(single.kappa())
    );

    for plan in [
        ResamplePlan::vfold(&config.resampling),
        ResamplePlan::monte_carlo(&config.split, &config.resampling),
    ] {
        let comparison =
            pipeline.compare_parallel(&models, &dataset, &plan, config.resampling.seed)?;
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    }

    let species = dataset.labels("species")?;
    for algorithm in [
        ClusterAlgorithm::KMeans {
            k: 3,
            max_iterations: 100,
            n_starts: 10,
        },
        ClusterAlgorithm::Hdbscan {
            min_cluster_size: 15,
            min_samples: Some(5),
        },
    ] {
        let assignment = pipeline.cluster(&dataset, &algorithm, config.split.seed)?;
        let table = cross_tabulate(&assignment, &species)?;
        println!(
            "{} purity {:.3}\n{}",
            algorithm.name(),
            table.purity(),
            serde_json::to_string_pretty(&table)?
        );
    }

    Ok(())
}
