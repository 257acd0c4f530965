use std::collections::{HashMap, HashSet};

use crate::models::{BolCapacity, CycleFeatures, SohRecord};

/// Default SOH threshold below which a cell is considered end-of-life.
pub const DEFAULT_EOL_THRESHOLD: f64 = 0.8;

/// Beginning-of-life reference per cell: the discharge capacity of the first
/// row seen for that cell. Rows must already be ordered by checkup_num
/// ascending; with unsorted input this silently picks the wrong checkup.
pub fn compute_bol_capacity(features: &[CycleFeatures]) -> Vec<BolCapacity> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut bol = Vec::new();

    for f in features {
        if seen.insert(f.cell_id.as_str()) {
            bol.push(BolCapacity {
                cell_id: f.cell_id.clone(),
                bol_capacity_ah: f.discharge_capacity_ah,
            });
        }
    }

    bol
}

/// Left-join features against the BOL table and divide. A cell missing from
/// the BOL table gets NaN, and a zero BOL reference yields inf/NaN; both
/// propagate unguarded rather than raising, matching the join semantics.
pub fn compute_soh(features: Vec<CycleFeatures>, bol: &[BolCapacity]) -> Vec<SohRecord> {
    let by_cell: HashMap<&str, f64> = bol
        .iter()
        .map(|b| (b.cell_id.as_str(), b.bol_capacity_ah))
        .collect();

    features
        .into_iter()
        .map(|f| {
            let bol_capacity_ah = by_cell
                .get(f.cell_id.as_str())
                .copied()
                .unwrap_or(f64::NAN);
            SohRecord {
                soh: f.discharge_capacity_ah / bol_capacity_ah,
                cell_id: f.cell_id,
                checkup_num: f.checkup_num,
                discharge_capacity_ah: f.discharge_capacity_ah,
                duration_s: f.duration_s,
                mean_current_a: f.mean_current_a,
                min_voltage_v: f.min_voltage_v,
                bol_capacity_ah,
                soh_delta: 0.0,
                below_eol: false,
            }
        })
        .collect()
}

/// First difference of SOH per cell in row order. The first row of each
/// cell gets 0, the same boundary reset as the delta-time stage.
pub fn compute_soh_delta(mut records: Vec<SohRecord>) -> Vec<SohRecord> {
    let mut prev: Option<(String, f64)> = None;

    for record in records.iter_mut() {
        record.soh_delta = match &prev {
            Some((cell, soh)) if *cell == record.cell_id => record.soh - soh,
            _ => 0.0,
        };
        prev = Some((record.cell_id.clone(), record.soh));
    }

    records
}

/// Flag rows whose SOH sits below the threshold. Pure predicate, no
/// hysteresis: a cell oscillating at the threshold flips freely.
pub fn flag_eol(mut records: Vec<SohRecord>, threshold: f64) -> Vec<SohRecord> {
    for record in records.iter_mut() {
        record.below_eol = record.soh < threshold;
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(cell: &str, checkup: u32, capacity: f64) -> CycleFeatures {
        CycleFeatures {
            cell_id: cell.to_string(),
            checkup_num: checkup,
            discharge_capacity_ah: capacity,
            duration_s: 10.0,
            mean_current_a: 2.0,
            min_voltage_v: 3.2,
        }
    }

    #[test]
    fn bol_takes_first_row_per_cell() {
        let rows = vec![
            features("a", 0, 0.00556),
            features("a", 1, 0.005),
            features("b", 0, 0.010),
        ];
        let bol = compute_bol_capacity(&rows);
        assert_eq!(bol.len(), 2);
        assert_eq!(bol[0].cell_id, "a");
        assert_eq!(bol[0].bol_capacity_ah, 0.00556);
        assert_eq!(bol[1].cell_id, "b");
        assert_eq!(bol[1].bol_capacity_ah, 0.010);
    }

    #[test]
    fn soh_normalizes_against_bol() {
        let rows = vec![features("a", 0, 0.00556), features("a", 1, 0.005)];
        let bol = compute_bol_capacity(&rows);
        let records = compute_soh(rows, &bol);

        assert!((records[0].soh - 1.0).abs() < 1e-12);
        assert!((records[1].soh - 0.005 / 0.00556).abs() < 1e-12);
        assert!(records[1].soh > 0.899 && records[1].soh < 0.9);
    }

    #[test]
    fn missing_bol_cell_yields_nan() {
        let rows = vec![features("orphan", 3, 0.004)];
        let records = compute_soh(rows, &[]);
        assert!(records[0].soh.is_nan());
    }

    #[test]
    fn soh_delta_first_differences_per_cell() {
        let rows = vec![
            features("a", 0, 1.0),
            features("a", 1, 0.9),
            features("a", 2, 0.85),
        ];
        let bol = compute_bol_capacity(&rows);
        let records = compute_soh_delta(compute_soh(rows, &bol));

        let deltas: Vec<f64> = records.iter().map(|r| r.soh_delta).collect();
        assert!(deltas[0].abs() < 1e-12);
        assert!((deltas[1] + 0.1).abs() < 1e-12);
        assert!((deltas[2] + 0.05).abs() < 1e-12);
    }

    #[test]
    fn soh_delta_resets_at_cell_boundary() {
        let rows = vec![
            features("a", 0, 1.0),
            features("a", 1, 0.8),
            features("b", 0, 2.0),
            features("b", 1, 1.5),
        ];
        let bol = compute_bol_capacity(&rows);
        let records = compute_soh_delta(compute_soh(rows, &bol));
        assert_eq!(records[2].soh_delta, 0.0);
        assert!((records[3].soh_delta + 0.25).abs() < 1e-12);
    }

    #[test]
    fn eol_flags_strictly_below_threshold() {
        let rows = vec![
            features("a", 0, 1.0),
            features("a", 1, 0.75),
            features("a", 2, 0.85),
        ];
        let bol = compute_bol_capacity(&rows);
        let records = flag_eol(compute_soh(rows, &bol), DEFAULT_EOL_THRESHOLD);

        let flags: Vec<bool> = records.iter().map(|r| r.below_eol).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn threshold_boundary_is_not_eol() {
        let rows = vec![features("a", 0, 1.0), features("a", 1, 0.8)];
        let bol = compute_bol_capacity(&rows);
        let records = flag_eol(compute_soh(rows, &bol), DEFAULT_EOL_THRESHOLD);
        assert!(!records[1].below_eol);
    }

    #[test]
    fn zero_bol_propagates_unguarded() {
        let rows = vec![features("dead", 0, 0.0), features("dead", 1, 0.001)];
        let bol = compute_bol_capacity(&rows);
        let records = compute_soh(rows, &bol);
        assert!(records[0].soh.is_nan());
        assert!(records[1].soh.is_infinite());
    }
}
