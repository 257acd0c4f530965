use crate::error::SchemaError;
use crate::models::{LabeledSample, Measurement, TestPhase};

/// Columns every measurement table must carry. `temperature_c` is optional
/// and deliberately not listed.
pub const REQUIRED_COLUMNS: [&str; 5] =
    ["cell_id", "checkup_num", "time_s", "current_a", "voltage_v"];

/// Check that `required` is a subset of `headers`. Fails with every missing
/// column name at once, before any computation touches the rows.
pub fn validate_schema(headers: &[String], required: &[&str]) -> Result<(), SchemaError> {
    let mut missing: Vec<String> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        missing.sort();
        Err(SchemaError { missing })
    }
}

/// Order samples by (cell_id, checkup_num, time_s) ascending. Stable, so
/// applying it to already-sorted data is a no-op on content.
pub fn sort_timeseries(mut rows: Vec<Measurement>) -> Vec<Measurement> {
    rows.sort_by(|a, b| {
        a.cell_id
            .cmp(&b.cell_id)
            .then(a.checkup_num.cmp(&b.checkup_num))
            .then(a.time_s.total_cmp(&b.time_s))
    });
    rows
}

/// Label each sample charge/discharge from the current sign. Zero current
/// is charge. Delta-time and capacity columns start at zero and are filled
/// by the feature stages.
pub fn assign_test_phase(rows: Vec<Measurement>) -> Vec<LabeledSample> {
    rows.into_iter()
        .map(|m| LabeledSample {
            test_phase: TestPhase::from_current(m.current_a),
            cell_id: m.cell_id,
            checkup_num: m.checkup_num,
            time_s: m.time_s,
            current_a: m.current_a,
            voltage_v: m.voltage_v,
            temperature_c: m.temperature_c,
            delta_t_s: 0.0,
            dq_ah: 0.0,
        })
        .collect()
}
