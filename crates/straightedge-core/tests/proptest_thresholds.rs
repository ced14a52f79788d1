use proptest::prelude::*;
use straightedge_core::DetectorConfig;
use straightedge_core::alignment::evaluate;
use straightedge_core::model::PointId;
use straightedge_core::regression;

#[path = "fixtures.rs"]
mod fixtures;
use fixtures::*;

/// A line of 3..=8 points: integer-grid old and new coordinates per point.
fn arb_edit() -> impl Strategy<Value = Vec<((i32, i32), (i32, i32))>> {
    prop::collection::vec(
        ((-50..50, -50..50), (-50..50, -50..50)),
        3..=8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn detections_never_appear_when_the_threshold_rises(
        edit in arb_edit(),
        low in 0.0f64..500.0,
        delta in 0.0f64..500.0,
    ) {
        let ids: Vec<PointId> = (1..=edit.len() as u64).collect();
        let old: Vec<(PointId, f64, f64)> = ids
            .iter()
            .zip(&edit)
            .map(|(&id, ((x, y), _))| (id, f64::from(*x), f64::from(*y)))
            .collect();
        let history = first_versions(&old);
        let points = touched(
            ids.iter()
                .zip(&edit)
                .map(|(&id, (_, (x, y)))| moved(id, f64::from(*x), f64::from(*y))),
        );

        let at = |threshold: f64| {
            let config = DetectorConfig {
                min_alignment_modification_rate: threshold,
                ..DetectorConfig::default()
            };
            evaluate(1, &ids, &points, &history, &config)
                .map(|eval| eval.is_aligned())
        };

        let detected_low = at(low).expect("history is complete");
        let detected_high = at(low + delta).expect("history is complete");
        prop_assert!(detected_low || !detected_high);
    }

    #[test]
    fn residuals_are_never_negative(
        points in prop::collection::vec((-1e3f64..1e3, -1e3f64..1e3), 1..20),
    ) {
        let fit = regression::fit(&points).expect("non-empty");
        prop_assert!(fit.sum_squared_residual >= 0.0);
        prop_assert!(fit.max_squared_residual >= 0.0);
        prop_assert!(fit.max_squared_residual <= fit.sum_squared_residual + 1e-9);
    }

    #[test]
    fn fit_is_deterministic(
        points in prop::collection::vec((-1e3f64..1e3, -1e3f64..1e3), 1..20),
    ) {
        let a = regression::fit(&points).expect("non-empty");
        let b = regression::fit(&points).expect("non-empty");
        prop_assert_eq!(a, b);
    }
}
