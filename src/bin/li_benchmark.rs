use learned_index::data_format::DenseDataset;
use learned_index::distance_measures::{DistanceEngine, DistanceMeasure};
use learned_index::routing::ModelKind;
use learned_index::utils::maybe_parallel_map;
use learned_index::search::ResultRows;
use learned_index::{LearnedIndex, LearnedIndexConfig, SearchConfig};
use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    data_json: Option<PathBuf>,
    config_json: Option<PathBuf>,
    distance: DistanceMeasure,
    model: ModelKind,
    k: usize,
    bucket_count: usize,
    n_buckets: usize,
    levels: usize,
    epochs: usize,
    learning_rate: f32,
    use_threshold: bool,
    limit_train: Option<usize>,
    limit_test: Option<usize>,
    synthetic_train: usize,
    synthetic_test: usize,
    synthetic_clusters: usize,
    dim: usize,
    seed: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            data_json: None,
            config_json: None,
            distance: DistanceMeasure::SquaredL2,
            model: ModelKind::Mlp,
            k: 10,
            bucket_count: 32,
            n_buckets: 2,
            levels: 1,
            epochs: 10,
            learning_rate: 0.1,
            use_threshold: false,
            limit_train: None,
            limit_test: None,
            synthetic_train: 10_000,
            synthetic_test: 200,
            synthetic_clusters: 32,
            dim: 32,
            seed: 42,
        }
    }
}

#[derive(Debug)]
struct BenchmarkData {
    train: Vec<Vec<f32>>,
    test: Vec<Vec<f32>>,
    gt: Vec<Vec<u32>>,
    source: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct BenchmarkReport {
    dataset: String,
    model: ModelKind,
    distance: DistanceMeasure,
    levels: usize,
    k: usize,
    bucket_count: usize,
    n_buckets: usize,
    use_threshold: bool,
    train_size: usize,
    test_size: usize,
    dimension: usize,
    searchable_buckets: usize,
    build_seconds: f64,
    search_seconds: f64,
    inference_seconds: f64,
    qps: f64,
    recall_at_k: f64,
}

#[derive(Debug, Deserialize)]
struct JsonDataset {
    train: Vec<Vec<f32>>,
    test: Vec<Vec<f32>>,
    neighbors: Vec<Vec<u32>>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = index_config(&args)?;

    let data = if let Some(path) = &args.data_json {
        load_json_dataset(path, args.k, args.limit_train, args.limit_test)?
    } else {
        generate_synthetic_dataset(&args, config.distance_measure)?
    };
    info!(source = %data.source, train = data.train.len(), test = data.test.len(), "dataset ready");

    let train = DenseDataset::from_vecs(data.train)?;
    let test = DenseDataset::from_vecs(data.test)?;

    let build_start = Instant::now();
    let mut index = LearnedIndex::new(config.clone());
    let build = index.build(&train)?;
    let build_seconds = build_start.elapsed().as_secs_f64();

    let search_config = SearchConfig::new(args.k)
        .with_n_buckets(args.n_buckets)
        .with_threshold(args.use_threshold);
    let search_start = Instant::now();
    let output = index.search(&train, &test, &test, &search_config)?;
    let search_seconds = search_start.elapsed().as_secs_f64();

    let retrieved = real_neighbors(&output.rows, config.distance_measure);
    let recall_at_k = average_recall_at_k(&retrieved, &data.gt, args.k);
    let qps = if search_seconds > 0.0 {
        test.size() as f64 / search_seconds
    } else {
        0.0
    };

    let report = BenchmarkReport {
        dataset: data.source,
        model: config.model_kind,
        distance: config.distance_measure,
        levels: config.levels,
        k: args.k,
        bucket_count: config.bucket_count,
        n_buckets: args.n_buckets,
        use_threshold: args.use_threshold,
        train_size: train.size(),
        test_size: test.size(),
        dimension: data.dimension,
        searchable_buckets: build.bucket_sizes.len(),
        build_seconds,
        search_seconds,
        inference_seconds: output.timings.inference.as_secs_f64(),
        qps,
        recall_at_k,
    };

    println!("=== Learned index benchmark report ===");
    println!("dataset: {}", report.dataset);
    println!("model: {} / levels: {}", report.model.name(), report.levels);
    println!("distance: {}", report.distance.name());
    println!(
        "train/test/dim: {}/{}/{}",
        report.train_size, report.test_size, report.dimension
    );
    println!(
        "buckets: {} ({} searchable), probed: {}",
        report.bucket_count, report.searchable_buckets, report.n_buckets
    );
    println!("build_seconds: {:.6}", report.build_seconds);
    println!("search_seconds: {:.6}", report.search_seconds);
    println!("inference_seconds: {:.6}", report.inference_seconds);
    println!("qps: {:.2}", report.qps);
    println!("recall@{}: {:.6}", report.k, report.recall_at_k);
    println!("json: {}", serde_json::to_string(&report)?);

    Ok(())
}

fn index_config(args: &Args) -> Result<LearnedIndexConfig, Box<dyn Error>> {
    if let Some(path) = &args.config_json {
        let raw = fs::read_to_string(path)?;
        return Ok(LearnedIndexConfig::from_json_str(&raw)?);
    }
    let config = LearnedIndexConfig::new()
        .with_bucket_count(args.bucket_count)
        .with_epochs(args.epochs)
        .with_learning_rate(args.learning_rate)
        .with_model_kind(args.model)
        .with_levels(args.levels)
        .with_distance_measure(args.distance)
        .with_seed(args.seed);
    config.validate()?;
    Ok(config)
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(flag) = it.next() {
        if flag == "--use-threshold" {
            args.use_threshold = true;
            continue;
        }
        let value = it.next();
        match flag.as_str() {
            "--data-json" => {
                let v = required_value(&flag, value)?;
                args.data_json = Some(PathBuf::from(v));
            }
            "--config-json" => {
                let v = required_value(&flag, value)?;
                args.config_json = Some(PathBuf::from(v));
            }
            "--distance" => {
                let v = required_value(&flag, value)?;
                args.distance = parse_distance(&v)?;
            }
            "--model" => {
                let v = required_value(&flag, value)?;
                args.model = parse_model(&v)?;
            }
            "--k" => {
                let v = required_value(&flag, value)?;
                args.k = v.parse()?;
            }
            "--bucket-count" => {
                let v = required_value(&flag, value)?;
                args.bucket_count = v.parse()?;
            }
            "--n-buckets" => {
                let v = required_value(&flag, value)?;
                args.n_buckets = v.parse()?;
            }
            "--levels" => {
                let v = required_value(&flag, value)?;
                args.levels = v.parse()?;
            }
            "--epochs" => {
                let v = required_value(&flag, value)?;
                args.epochs = v.parse()?;
            }
            "--lr" => {
                let v = required_value(&flag, value)?;
                args.learning_rate = v.parse()?;
            }
            "--limit-train" => {
                let v = required_value(&flag, value)?;
                args.limit_train = Some(v.parse()?);
            }
            "--limit-test" => {
                let v = required_value(&flag, value)?;
                args.limit_test = Some(v.parse()?);
            }
            "--synthetic-train" => {
                let v = required_value(&flag, value)?;
                args.synthetic_train = v.parse()?;
            }
            "--synthetic-test" => {
                let v = required_value(&flag, value)?;
                args.synthetic_test = v.parse()?;
            }
            "--synthetic-clusters" => {
                let v = required_value(&flag, value)?;
                args.synthetic_clusters = v.parse()?;
            }
            "--dim" => {
                let v = required_value(&flag, value)?;
                args.dim = v.parse()?;
            }
            "--seed" => {
                let v = required_value(&flag, value)?;
                args.seed = v.parse()?;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                return Err(format!("unknown argument: {flag}").into());
            }
        }
    }

    Ok(args)
}

fn required_value(flag: &str, value: Option<String>) -> Result<String, Box<dyn Error>> {
    value.ok_or_else(|| format!("missing value for {flag}").into())
}

fn parse_distance(s: &str) -> Result<DistanceMeasure, Box<dyn Error>> {
    match s {
        "squared-l2" | "squared_l2" => Ok(DistanceMeasure::SquaredL2),
        "l2" => Ok(DistanceMeasure::L2),
        "cosine" => Ok(DistanceMeasure::Cosine),
        _ => Err(format!("unsupported distance: {s}").into()),
    }
}

fn parse_model(s: &str) -> Result<ModelKind, Box<dyn Error>> {
    match s {
        "mlp" | "MLP" => Ok(ModelKind::Mlp),
        "linear" => Ok(ModelKind::Linear),
        _ => Err(format!("unsupported model: {s}").into()),
    }
}

fn print_help() {
    println!(
        "li_benchmark\n\
        ANN-Benchmarks-style runner for the learned index.\n\n\
        Usage:\n\
          cargo run --release --bin li_benchmark -- [options]\n\n\
        Options:\n\
          --data-json <path>          JSON file with train/test/neighbors arrays\n\
          --config-json <path>        index configuration JSON (overrides build flags)\n\
          --distance <name>           squared-l2|l2|cosine (default: squared-l2)\n\
          --model <name>              mlp|linear (default: mlp)\n\
          --k <int>                   neighbors to retrieve (default: 10)\n\
          --bucket-count <int>        buckets per level (default: 32)\n\
          --n-buckets <int>           buckets probed per query (default: 2)\n\
          --levels <int>              1 or 2 (default: 1)\n\
          --epochs <int>              training epochs (default: 10)\n\
          --lr <float>                learning rate (default: 0.1)\n\
          --use-threshold             prune later rounds by the running top-k\n\
          --limit-train <int>         cap train rows from input JSON\n\
          --limit-test <int>          cap test rows from input JSON\n\
          --synthetic-train <int>     train vectors for synthetic mode\n\
          --synthetic-test <int>      test vectors for synthetic mode\n\
          --synthetic-clusters <int>  gaussian blobs for synthetic mode\n\
          --dim <int>                 dimensionality for synthetic mode\n\
          --seed <int>                RNG seed\n\
          --help                      print this help\n"
    );
}

fn load_json_dataset(
    path: &PathBuf,
    k: usize,
    limit_train: Option<usize>,
    limit_test: Option<usize>,
) -> Result<BenchmarkData, Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let mut json: JsonDataset = serde_json::from_str(&raw)?;

    if let Some(n) = limit_train {
        json.train.truncate(n.min(json.train.len()));
    }
    if let Some(n) = limit_test {
        json.test.truncate(n.min(json.test.len()));
        json.neighbors.truncate(n.min(json.neighbors.len()));
    }

    if json.train.is_empty() || json.test.is_empty() || json.neighbors.is_empty() {
        return Err("dataset JSON must include non-empty train/test/neighbors".into());
    }

    for row in &json.neighbors {
        if row.len() < k {
            return Err(format!("neighbors rows must have at least {k} entries").into());
        }
    }

    let gt: Vec<Vec<u32>> = json
        .neighbors
        .into_iter()
        .take(json.test.len())
        .map(|row| row.into_iter().take(k).collect())
        .collect();

    let dim = json.train[0].len();

    Ok(BenchmarkData {
        train: json.train,
        test: json.test,
        gt,
        source: path.display().to_string(),
        dimension: dim,
    })
}

/// Gaussian blobs around uniformly drawn centers.
fn generate_synthetic_dataset(
    args: &Args,
    distance: DistanceMeasure,
) -> Result<BenchmarkData, Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let clusters = args.synthetic_clusters.max(1);
    let centers: Vec<Vec<f32>> = (0..clusters)
        .map(|_| (0..args.dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect();
    let noise = Normal::new(0.0f32, 0.1)?;

    let mut sample = |n: usize| -> Vec<Vec<f32>> {
        (0..n)
            .map(|_| {
                let center = &centers[rng.gen_range(0..clusters)];
                center.iter().map(|&c| c + noise.sample(&mut rng)).collect()
            })
            .collect()
    };
    let train = sample(args.synthetic_train);
    let test = sample(args.synthetic_test);
    let gt = exact_ground_truth(&train, &test, args.k, distance);

    Ok(BenchmarkData {
        source: format!(
            "synthetic_n{}_q{}_d{}_c{}",
            args.synthetic_train, args.synthetic_test, args.dim, clusters
        ),
        dimension: args.dim,
        train,
        test,
        gt,
    })
}

fn exact_ground_truth(
    train: &[Vec<f32>],
    queries: &[Vec<f32>],
    k: usize,
    distance: DistanceMeasure,
) -> Vec<Vec<u32>> {
    maybe_parallel_map(queries, |query| {
        let mut distances: Vec<(u32, f32)> = train
            .iter()
            .enumerate()
            .map(|(idx, point)| (idx as u32, distance.distance(query, point)))
            .collect();
        distances.sort_by_key(|&(_, d)| OrderedFloat(d));
        distances.into_iter().take(k).map(|(idx, _)| idx).collect()
    })
}

/// Neighbor ids per query, without padded or empty slots.
fn real_neighbors(rows: &ResultRows, measure: DistanceMeasure) -> Vec<Vec<u32>> {
    (0..rows.num_queries())
        .map(|q| {
            rows.results(q)
                .into_iter()
                .filter(|&(_, d)| !measure.is_sentinel(d))
                .map(|(id, _)| id)
                .collect()
        })
        .collect()
}

fn average_recall_at_k(retrieved: &[Vec<u32>], ground_truth: &[Vec<u32>], k: usize) -> f64 {
    if retrieved.is_empty() || ground_truth.is_empty() || k == 0 {
        return 0.0;
    }

    let n = retrieved.len().min(ground_truth.len());
    let mut total = 0.0f64;

    for i in 0..n {
        let mut hits = 0usize;
        for id in retrieved[i].iter().take(k) {
            if ground_truth[i].iter().take(k).any(|gt_id| gt_id == id) {
                hits += 1;
            }
        }
        total += hits as f64 / k as f64;
    }

    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::{average_recall_at_k, parse_distance, real_neighbors};
    use learned_index::distance_measures::DistanceMeasure;
    use learned_index::search::ResultRows;

    #[test]
    fn recall_at_k_basic() {
        let retrieved = vec![vec![1, 2, 3], vec![5, 7, 9]];
        let gt = vec![vec![1, 4, 3], vec![5, 6, 7]];
        let recall = average_recall_at_k(&retrieved, &gt, 3);
        assert!((recall - (2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn padded_slots_are_not_hits() {
        let rows = ResultRows::from_rows(
            &[vec![0.0, 40_000.0, f32::INFINITY], vec![0.5, f32::INFINITY, f32::INFINITY]],
            &[vec![3, 8, 8], vec![4, 4, 4]],
            3,
        )
        .unwrap();
        let retrieved = real_neighbors(&rows, DistanceMeasure::SquaredL2);
        assert_eq!(retrieved, vec![vec![3, 8], vec![4]]);

        let gt = vec![vec![3, 8, 9], vec![4, 5, 6]];
        let recall = average_recall_at_k(&retrieved, &gt, 3);
        assert!((recall - 0.5).abs() < 1e-6);
    }

    #[test]
    fn parse_distance_names() {
        assert!(parse_distance("cosine").is_ok());
        assert!(parse_distance("l1").is_err());
    }
}
