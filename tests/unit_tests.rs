//! Integration tests for the learned index public API.

use learned_index::prelude::*;
use learned_index::routing::MlpClassifier;
use rand::prelude::*;

/// Gaussian-ish blobs around `clusters` random centers.
fn clustered_dataset(n: usize, dim: usize, clusters: usize, seed: u64) -> DenseDataset {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..clusters)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect();
    let data: Vec<Vec<f32>> = (0..n)
        .map(|i| {
            let center = &centers[i % clusters];
            center
                .iter()
                .map(|&c| c + rng.gen_range(-0.05f32..0.05))
                .collect()
        })
        .collect();
    DenseDataset::from_vecs(data).unwrap()
}

fn small_config(measure: DistanceMeasure) -> LearnedIndexConfig {
    LearnedIndexConfig::new()
        .with_bucket_count(6)
        .with_epochs(10)
        .with_batch_size(32)
        .with_hidden_dim(16)
        .with_distance_measure(measure)
}

fn exact_distances(data: &DenseDataset, query: &[f32], k: usize, measure: DistanceMeasure) -> Vec<f32> {
    let mut distances: Vec<f32> = data.rows().map(|row| measure.distance(query, row)).collect();
    distances.sort_by(|a, b| a.partial_cmp(b).unwrap());
    distances.truncate(k);
    distances
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_from_partial_json() {
        let config = LearnedIndexConfig::from_json_str(
            r#"{"bucket_count": 16, "levels": 2, "model_kind": "linear", "distance_measure": "squared_l2"}"#,
        )
        .unwrap();
        assert_eq!(config.bucket_count, 16);
        assert_eq!(config.levels, 2);
        assert_eq!(config.model_kind, ModelKind::Linear);
        assert_eq!(config.distance_measure, DistanceMeasure::SquaredL2);
        assert_eq!(config.epochs, 100);
        assert_eq!(config.seed, learned_index::DEFAULT_SEED);
    }

    #[test]
    fn test_config_json_rejects_bad_levels() {
        let err = LearnedIndexConfig::from_json_str(r#"{"levels": 3}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_search_config_validation() {
        assert!(SearchConfig::new(0).validate().is_err());
        assert!(SearchConfig::new(5).with_n_buckets(0).validate().is_err());
        assert!(SearchConfig::default().validate().is_ok());
    }
}

mod partition_tests {
    use super::*;

    #[test]
    fn test_single_point_partition() {
        let data = DenseDataset::from_vecs(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        let partition = PartitionBuilder::new(7).cluster(&data, 10).unwrap();
        assert!(partition.is_degenerate());
        assert_eq!(partition.labels, vec![0]);
        assert_eq!(partition.num_buckets, 1);
    }

    #[test]
    fn test_small_input_rescales_target() {
        let data = clustered_dataset(12, 4, 3, 1);
        let partition = PartitionBuilder::new(7).cluster(&data, 100).unwrap();
        assert_eq!(partition.num_buckets, 2);
        assert!(partition.labels.iter().all(|&l| (l as usize) < partition.num_buckets));
    }

    #[test]
    fn test_partition_covers_every_point() {
        let data = clustered_dataset(200, 8, 5, 2);
        let partition = PartitionBuilder::new(7).cluster(&data, 5).unwrap();
        let members = partition.members();
        let total: usize = members.iter().map(Vec::len).sum();
        assert_eq!(total, data.size());
    }
}

mod routing_tests {
    use super::*;

    #[test]
    fn test_untrained_model_is_not_trained() {
        let model = MlpClassifier::new(ModelKind::Mlp, 4, 8, 3);
        assert!(!model.is_trained());
        let data = clustered_dataset(5, 4, 1, 3);
        let err = model.predict_proba(&data).unwrap_err();
        assert!(err.is_not_trained());
        assert!(model.predict(&data).unwrap_err().is_not_trained());
    }
}

mod search_tests {
    use super::*;
    use learned_index::search::BucketTable;
    use learned_index::UNBOUNDED_SENTINEL_DISTANCE;

    #[test]
    fn test_search_before_build() {
        let data = clustered_dataset(50, 4, 3, 4);
        let index = LearnedIndex::new(small_config(DistanceMeasure::SquaredL2));
        let err = index
            .search(&data, &data, &data, &SearchConfig::new(3))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotTrained);
    }

    #[test]
    fn test_shape_and_sortedness() {
        let data = clustered_dataset(300, 8, 6, 5);
        let queries = clustered_dataset(40, 8, 6, 6);
        for levels in [1, 2] {
            let config = small_config(DistanceMeasure::SquaredL2).with_levels(levels);
            let mut index = LearnedIndex::new(config);
            index.build(&data).unwrap();

            for (k, n_buckets) in [(1, 1), (5, 2), (12, 3)] {
                let search = SearchConfig::new(k).with_n_buckets(n_buckets);
                let out = index.search(&data, &queries, &queries, &search).unwrap();
                assert_eq!(out.num_queries(), queries.size());
                assert_eq!(out.rows.k(), k);
                for q in 0..out.num_queries() {
                    assert_eq!(out.distances(q).len(), k);
                    assert_eq!(out.neighbors(q).len(), k);
                    assert!(out.distances(q).windows(2).all(|w| w[0] <= w[1]));
                    assert!(out.distances(q).iter().all(|&d| d >= 0.0));
                }
            }
        }
    }

    #[test]
    fn test_single_probe_equivalence() {
        let data = clustered_dataset(300, 8, 6, 7);
        let queries = clustered_dataset(30, 8, 6, 8);
        for levels in [1, 2] {
            let config = small_config(DistanceMeasure::Cosine).with_levels(levels);
            let mut index = LearnedIndex::new(config);
            index.build(&data).unwrap();

            let full = index
                .search(&data, &queries, &queries, &SearchConfig::new(7))
                .unwrap();
            let single = index.search_single(&data, &queries, &queries, 7, None).unwrap();
            assert_eq!(full.rounds, 1);
            assert_eq!(full.rows, single.rows);
        }
    }

    #[test]
    fn test_padding_sentinel() {
        let data = DenseDataset::from_vecs(vec![
            vec![0.0, 0.0],
            vec![0.5, 0.0],
            vec![5.0, 5.0],
            vec![5.0, 6.0],
            vec![6.0, 5.0],
        ])
        .unwrap();
        let table = BucketTable::from_assignments(vec![0u32, 0, 1, 1, 1]);
        let queries = DenseDataset::from_vecs(vec![vec![0.1, 0.0], vec![0.4, 0.0]]).unwrap();
        let engine = DistanceMeasure::SquaredL2;
        let search = BucketProbeSearch::new(&engine, 4).unwrap();

        let out = search
            .search_single(&table, &data, &queries, &[0, 0], None)
            .unwrap();
        for q in 0..2 {
            let distances = out.rows.distances(q);
            let real = distances.iter().filter(|&&d| !engine.is_sentinel(d)).count();
            assert_eq!(real, 2);
            assert_eq!(&distances[2..], &[engine.sentinel(), engine.sentinel()]);
            let neighbors = out.rows.neighbors(q);
            assert_eq!(neighbors[2], neighbors[1]);
            assert_eq!(neighbors[3], neighbors[1]);
        }
        assert_eq!(out.rows.neighbors(0)[..2], [0, 1]);
        assert_eq!(out.rows.neighbors(1)[..2], [1, 0]);
    }

    #[test]
    fn test_crafted_merge() {
        let mut running = ResultRows::from_rows(&[vec![0.1, 0.2]], &[vec![1, 2]], 2).unwrap();
        let round = ResultRows::from_rows(&[vec![0.05, 0.3]], &[vec![3, 4]], 2).unwrap();
        running.merge(&round).unwrap();
        assert_eq!(running.distances(0), &[0.05, 0.1]);
        assert_eq!(running.neighbors(0), &[3, 1]);
    }

    #[test]
    fn test_threshold_soundness() {
        let data = clustered_dataset(400, 16, 8, 9);
        let queries = clustered_dataset(50, 16, 8, 10);
        for measure in [DistanceMeasure::SquaredL2, DistanceMeasure::L2, DistanceMeasure::Cosine] {
            for levels in [1, 2] {
                let config = small_config(measure).with_levels(levels);
                let mut index = LearnedIndex::new(config);
                index.build(&data).unwrap();

                let plain = SearchConfig::new(10).with_n_buckets(4);
                let pruned = plain.with_threshold(true);
                let a = index.search(&data, &queries, &queries, &plain).unwrap();
                let b = index.search(&data, &queries, &queries, &pruned).unwrap();
                assert_eq!(a.rows, b.rows, "measure {:?}, levels {}", measure, levels);
            }
        }
    }

    #[test]
    fn test_more_probes_never_worse() {
        let data = clustered_dataset(300, 8, 6, 11);
        let queries = clustered_dataset(30, 8, 6, 12);
        let mut index = LearnedIndex::new(small_config(DistanceMeasure::SquaredL2));
        index.build(&data).unwrap();

        let mut previous: Option<SearchOutput> = None;
        for n_buckets in 1..=4 {
            let out = index
                .search(&data, &queries, &queries, &SearchConfig::new(8).with_n_buckets(n_buckets))
                .unwrap();
            if let Some(prev) = &previous {
                for q in 0..out.num_queries() {
                    for (now, before) in out.distances(q).iter().zip(prev.distances(q)) {
                        assert!(now <= before);
                    }
                }
            }
            previous = Some(out);
        }
    }

    #[test]
    fn test_exhaustive_probe_is_exact() {
        let data = clustered_dataset(250, 8, 5, 13);
        let queries = clustered_dataset(20, 8, 5, 14);
        for levels in [1, 2] {
            let config = small_config(DistanceMeasure::SquaredL2).with_levels(levels);
            let mut index = LearnedIndex::new(config);
            index.build(&data).unwrap();

            let search = SearchConfig::new(10).with_n_buckets(10_000);
            let out = index.search(&data, &queries, &queries, &search).unwrap();
            for q in 0..queries.size() {
                let expected = exact_distances(&data, queries.row(q), 10, DistanceMeasure::SquaredL2);
                assert_eq!(out.distances(q), expected.as_slice());
            }
        }
    }

    /// Two tight groups far apart: a 2-point group at the origin and a larger
    /// group hundreds of units away, so real distances exceed 10 000.
    fn far_groups_dataset() -> DenseDataset {
        let mut rows = vec![vec![0.0, 0.0], vec![0.5, 0.0]];
        for i in 0..40 {
            let t = i as f32 * 0.25;
            rows.push(vec![300.0 + t, 200.0 - t]);
        }
        DenseDataset::from_vecs(rows).unwrap()
    }

    #[test]
    fn test_large_distances_beat_padding() {
        let data = far_groups_dataset();
        let queries = DenseDataset::from_vecs(vec![vec![0.1, 0.0], vec![0.0, 0.2]]).unwrap();
        let k = 5;
        for measure in [DistanceMeasure::SquaredL2, DistanceMeasure::L2] {
            for levels in [1, 2] {
                let config = small_config(measure).with_bucket_count(2).with_levels(levels);
                let mut index = LearnedIndex::new(config);
                index.build(&data).unwrap();

                let plain = SearchConfig::new(k).with_n_buckets(10_000);
                let a = index.search(&data, &queries, &queries, &plain).unwrap();
                let b = index
                    .search(&data, &queries, &queries, &plain.with_threshold(true))
                    .unwrap();
                assert_eq!(a.rows, b.rows, "measure {:?}, levels {}", measure, levels);

                for q in 0..queries.size() {
                    let expected = exact_distances(&data, queries.row(q), k, measure);
                    if measure == DistanceMeasure::SquaredL2 {
                        assert!(expected[k - 1] > 10_000.0);
                    }
                    assert_eq!(a.distances(q), expected.as_slice(), "measure {:?}, levels {}", measure, levels);
                    assert!(a.distances(q).iter().all(|&d| !measure.is_sentinel(d)));
                }
            }
        }
    }

    #[test]
    fn test_determinism() {
        let data = clustered_dataset(300, 8, 6, 15);
        for levels in [1, 2] {
            let config = small_config(DistanceMeasure::Cosine).with_levels(levels).with_seed(99);
            let a = LearnedIndex::new(config.clone()).build(&data).unwrap();
            let b = LearnedIndex::new(config).build(&data).unwrap();
            assert_eq!(a.labels, b.labels);
            assert_eq!(a.predictions, b.predictions);
            assert_eq!(a.sub_labels, b.sub_labels);
            assert_eq!(a.sub_predictions, b.sub_predictions);
        }
    }

    #[test]
    fn test_degenerate_dataset() {
        let data = DenseDataset::from_vecs(vec![vec![0.3, 0.4]]).unwrap();
        for levels in [1, 2] {
            let config = small_config(DistanceMeasure::SquaredL2).with_levels(levels);
            let mut index = LearnedIndex::new(config);
            let report = index.build(&data).unwrap();
            assert_eq!(report.labels, vec![0]);

            let out = index
                .search(&data, &data, &data, &SearchConfig::new(2).with_n_buckets(3))
                .unwrap();
            assert_eq!(out.distances(0), &[0.0, UNBOUNDED_SENTINEL_DISTANCE]);
            assert_eq!(out.neighbors(0), &[0, 0]);
        }
    }

    #[test]
    fn test_separate_navigation_and_search_queries() {
        let data = clustered_dataset(200, 8, 4, 16);
        let queries = clustered_dataset(10, 8, 4, 17);
        let (index, _) = LearnedIndexBuilder::new()
            .config(small_config(DistanceMeasure::SquaredL2))
            .build(&data)
            .unwrap();

        let fewer = queries.subset(&[0, 1]);
        assert!(index
            .search(&data, &queries, &fewer, &SearchConfig::new(3))
            .is_err());

        let wrong_dim = DenseDataset::from_vecs(vec![vec![0.0; 3]; 10]).unwrap();
        assert!(index
            .search(&data, &wrong_dim, &queries, &SearchConfig::new(3))
            .is_err());
    }
}
