//! Statistical properties of the sampling primitives and estimators

use approx_query_engine::config::SamplingConfig;
use approx_query_engine::execution::{sample_percent_for_error_threshold, tiered_sample, Estimator};
use approx_query_engine::query::{
    classify, AggregateFunction, ClassifierOptions, Column, MethodSelector, QueryType,
    SamplingMethod,
};
use approx_query_engine::storage::{Dataset, Record, RecordStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn store(n: usize, seed: u64) -> RecordStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = (0..n)
        .map(|i| {
            Record::new(i as i64, rng.gen_range(0.0..100.0), rng.gen_range(0..5), 1, i as i64)
        })
        .collect();
    RecordStore::from_records("sales", records)
}

#[test]
fn test_sample_size_tracks_percent_on_every_tier() {
    let config = SamplingConfig::default();
    for n in [3_000, 25_000, 80_000] {
        let dataset = store(n, n as u64);
        for percent in [0.5, 1.0, 5.0, 25.0, 50.0, 100.0] {
            let (sample, tier) = tiered_sample(&dataset, percent, &config);
            let ratio = sample.len() as f64 / n as f64;
            let expected = percent / 100.0;
            assert!(
                (ratio - expected).abs() <= expected * 0.02 + 1.0 / n as f64,
                "{n} records at {percent}% via {tier}: got {}",
                sample.len()
            );
        }
    }
}

#[test]
fn test_block_sample_size_tracks_percent() {
    let dataset = store(50_000, 9);
    for percent in [1.0, 10.0, 30.0] {
        let sample = dataset.block_sample(percent, 1000);
        let expected = (50_000.0 * percent / 100.0) as usize;
        assert_eq!(sample.len(), expected);
    }
}

#[test]
fn test_sampling_is_unbiased_on_average() {
    let dataset = store(20_000, 5);
    let truth = dataset.sum_amount();
    let estimator = Estimator::new(AggregateFunction::Sum, dataset.total_records(), 0.95);

    let runs = 40;
    let mean_estimate: f64 = (0..runs)
        .map(|_| {
            let sample = dataset.direct_access_sample(2.0);
            estimator.point(&sample.values(Column::Amount))
        })
        .sum::<f64>()
        / runs as f64;
    assert!((mean_estimate - truth).abs() / truth < 0.02);
}

#[test]
fn test_margin_shrinks_as_sample_grows() {
    let dataset = store(100_000, 17);
    let estimator = Estimator::new(AggregateFunction::Avg, dataset.total_records(), 0.95);
    let config = SamplingConfig::default();

    let margins: Vec<f64> = [1.0, 4.0, 16.0, 64.0]
        .iter()
        .map(|&percent| {
            let (sample, _) = tiered_sample(&dataset, percent, &config);
            estimator
                .estimate(&sample.values(Column::Amount))
                .margin
                .unwrap()
        })
        .collect();
    assert!(margins.windows(2).all(|w| w[0] > w[1]), "{margins:?}");
}

#[test]
fn test_threshold_to_percent_is_monotone() {
    let thresholds = [0.1, 0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 7.5, 10.0, 50.0];
    let percents: Vec<f64> = thresholds
        .iter()
        .map(|&t| sample_percent_for_error_threshold(t))
        .collect();
    assert!(percents.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_classifier_and_selector_scenarios() {
    let classification = classify(
        "SELECT APPROX(SUM(amount)) FROM sales",
        &ClassifierOptions::default(),
    )
    .unwrap();
    assert_eq!(classification.query_type, QueryType::EmbeddedApprox);
    assert_eq!(classification.cleaned_text, "SELECT SUM(amount) FROM sales");

    let selector = MethodSelector::default();
    assert_eq!(
        selector.recommend(&classification.query, Some(100_000)),
        SamplingMethod::Clt
    );
    assert_eq!(
        selector.recommend(&classification.query, Some(1_000_000)),
        SamplingMethod::Revolutionary
    );
}

#[test]
fn test_interval_width_follows_the_normal_quantile() {
    let dataset = store(20_000, 23);
    let values = dataset.direct_access_sample(10.0).values(Column::Amount);
    let margin = |confidence| {
        Estimator::new(AggregateFunction::Avg, dataset.total_records(), confidence)
            .estimate(&values)
            .margin
            .unwrap()
    };
    let base = margin(0.95);
    // confidence levels between and beyond the usual 90/95/99
    for (confidence, z) in [(0.85, 1.4395), (0.98, 2.3263), (0.999, 3.2905)] {
        let ratio = margin(confidence) / base;
        assert!((ratio - z / 1.96).abs() < 1e-3, "{confidence}: {ratio}");
    }
}
