use crate::features;
use crate::models::{Measurement, SohRecord};
use crate::preprocessing;
use crate::soh;

/// Run the full batch chain: sort, label, per-sample features, cycle
/// aggregation, BOL normalization, SOH delta and EOL flagging. Output rows
/// are ordered by (cell_id, checkup_num), which the BOL stage relies on.
pub fn run(measurements: Vec<Measurement>, eol_threshold: f64) -> Vec<SohRecord> {
    let sorted = preprocessing::sort_timeseries(measurements);
    let labeled = preprocessing::assign_test_phase(sorted);
    let labeled = features::compute_delta_time(labeled);
    let labeled = features::integrate_discharge_capacity(labeled);

    let mut cycles = features::aggregate_discharge_features(&labeled);
    // Aggregation promises first-seen order only; BOL needs checkup order.
    cycles.sort_by(|a, b| {
        a.cell_id
            .cmp(&b.cell_id)
            .then(a.checkup_num.cmp(&b.checkup_num))
    });

    let bol = soh::compute_bol_capacity(&cycles);
    let records = soh::compute_soh(cycles, &bol);
    let records = soh::compute_soh_delta(records);
    soh::flag_eol(records, eol_threshold)
}

/// Training matrix for the regressors: checkup index as the single feature,
/// SOH as the target. Rows whose SOH is not finite (zero-BOL cells, cells
/// missing a BOL reference) are excluded so one degenerate cell cannot
/// poison the fit.
pub fn training_data(records: &[SohRecord]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x = Vec::new();
    let mut y = Vec::new();

    for record in records {
        if record.soh.is_finite() {
            x.push(vec![record.checkup_num as f64]);
            y.push(record.soh);
        }
    }

    (x, y)
}
