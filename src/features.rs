use crate::models::{CycleFeatures, LabeledSample};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Time step between consecutive samples within each (cell_id, checkup_num)
/// group. The first sample of every group gets 0 so a cycle boundary never
/// inherits time from the previous cycle. Input must already be sorted by
/// time within each group; this is the caller's contract and is not
/// re-checked here.
pub fn compute_delta_time(mut rows: Vec<LabeledSample>) -> Vec<LabeledSample> {
    let mut prev: Option<(String, u32, f64)> = None;

    for row in rows.iter_mut() {
        row.delta_t_s = match &prev {
            Some((cell, checkup, time))
                if *cell == row.cell_id && *checkup == row.checkup_num =>
            {
                row.time_s - time
            }
            _ => 0.0,
        };
        prev = Some((row.cell_id.clone(), row.checkup_num, row.time_s));
    }

    rows
}

/// Rectangular (left-endpoint) integration of |current| over each time step,
/// in amp-hours. Applied to every row regardless of phase; charging current
/// accumulates magnitude too, so callers that want discharge-only capacity
/// must filter before aggregating.
pub fn integrate_discharge_capacity(mut rows: Vec<LabeledSample>) -> Vec<LabeledSample> {
    for row in rows.iter_mut() {
        row.dq_ah = row.current_a.abs() * row.delta_t_s / SECONDS_PER_HOUR;
    }
    rows
}

/// Collapse samples to one feature row per (cell_id, checkup_num): summed
/// capacity and duration, mean |current|, minimum voltage. Output rows
/// appear in first-seen group order; re-sort downstream if order matters.
pub fn aggregate_discharge_features(rows: &[LabeledSample]) -> Vec<CycleFeatures> {
    struct Acc {
        dq_sum: f64,
        dt_sum: f64,
        abs_current_sum: f64,
        min_voltage: f64,
        count: usize,
    }

    let mut order: Vec<(String, u32)> = Vec::new();
    let mut groups: std::collections::HashMap<(String, u32), Acc> =
        std::collections::HashMap::new();

    for row in rows {
        let key = (row.cell_id.clone(), row.checkup_num);
        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Acc {
                dq_sum: 0.0,
                dt_sum: 0.0,
                abs_current_sum: 0.0,
                min_voltage: f64::INFINITY,
                count: 0,
            }
        });

        acc.dq_sum += row.dq_ah;
        acc.dt_sum += row.delta_t_s;
        acc.abs_current_sum += row.current_a.abs();
        acc.min_voltage = acc.min_voltage.min(row.voltage_v);
        acc.count += 1;
    }

    order
        .into_iter()
        .map(|key| {
            let acc = &groups[&key];
            CycleFeatures {
                cell_id: key.0,
                checkup_num: key.1,
                discharge_capacity_ah: acc.dq_sum,
                duration_s: acc.dt_sum,
                mean_current_a: acc.abs_current_sum / acc.count as f64,
                min_voltage_v: acc.min_voltage,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestPhase;

    fn labeled(cell: &str, checkup: u32, time: f64, current: f64) -> LabeledSample {
        LabeledSample {
            cell_id: cell.to_string(),
            checkup_num: checkup,
            time_s: time,
            current_a: current,
            voltage_v: 3.7,
            temperature_c: None,
            test_phase: TestPhase::from_current(current),
            delta_t_s: 0.0,
            dq_ah: 0.0,
        }
    }

    fn two_checkup_cell() -> Vec<LabeledSample> {
        vec![
            labeled("cell-1", 0, 0.0, -2.0),
            labeled("cell-1", 0, 10.0, -2.0),
            labeled("cell-1", 1, 0.0, -2.0),
            labeled("cell-1", 1, 10.0, -2.0),
        ]
    }

    #[test]
    fn delta_time_resets_at_group_boundaries() {
        let rows = compute_delta_time(two_checkup_cell());
        let deltas: Vec<f64> = rows.iter().map(|r| r.delta_t_s).collect();
        assert_eq!(deltas, vec![0.0, 10.0, 0.0, 10.0]);
    }

    #[test]
    fn delta_time_resets_across_cells() {
        let rows = compute_delta_time(vec![
            labeled("a", 0, 0.0, -1.0),
            labeled("a", 0, 5.0, -1.0),
            labeled("b", 0, 100.0, -1.0),
            labeled("b", 0, 105.0, -1.0),
        ]);
        let deltas: Vec<f64> = rows.iter().map(|r| r.delta_t_s).collect();
        assert_eq!(deltas, vec![0.0, 5.0, 0.0, 5.0]);
    }

    #[test]
    fn integration_uses_left_endpoint_rule() {
        let rows = integrate_discharge_capacity(compute_delta_time(two_checkup_cell()));
        let dq: Vec<f64> = rows.iter().map(|r| r.dq_ah).collect();
        let step = 2.0 * 10.0 / 3600.0;
        assert_eq!(dq, vec![0.0, step, 0.0, step]);
    }

    #[test]
    fn aggregation_sums_capacity_per_checkup() {
        let rows = integrate_discharge_capacity(compute_delta_time(two_checkup_cell()));
        let features = aggregate_discharge_features(&rows);

        assert_eq!(features.len(), 2);
        for f in &features {
            assert!((f.discharge_capacity_ah - 2.0 * 10.0 / 3600.0).abs() < 1e-12);
            assert_eq!(f.duration_s, 10.0);
            assert_eq!(f.mean_current_a, 2.0);
            assert_eq!(f.min_voltage_v, 3.7);
        }
    }

    #[test]
    fn aggregation_preserves_first_seen_order() {
        let rows = vec![
            labeled("b", 2, 0.0, -1.0),
            labeled("a", 0, 0.0, -1.0),
            labeled("b", 2, 1.0, -1.0),
        ];
        let features = aggregate_discharge_features(&rows);
        assert_eq!(features[0].cell_id, "b");
        assert_eq!(features[0].checkup_num, 2);
        assert_eq!(features[1].cell_id, "a");
    }

    #[test]
    fn charging_current_also_accumulates_magnitude() {
        let rows = integrate_discharge_capacity(compute_delta_time(vec![
            labeled("a", 0, 0.0, 3.0),
            labeled("a", 0, 10.0, 3.0),
        ]));
        assert!((rows[1].dq_ah - 3.0 * 10.0 / 3600.0).abs() < 1e-12);
    }
}
