use serde::{Deserialize, Serialize};

/// Charge/discharge label assigned from the sign of the measured current.
/// Zero current counts as charge: a resting cell is not discharging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    Charge,
    Discharge,
}

impl TestPhase {
    pub fn from_current(current_a: f64) -> Self {
        if current_a < 0.0 {
            TestPhase::Discharge
        } else {
            TestPhase::Charge
        }
    }
}

/// One sensor sample as read from the input CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub cell_id: String,
    pub checkup_num: u32,
    pub time_s: f64,
    pub current_a: f64,
    pub voltage_v: f64,
    #[serde(default)]
    pub temperature_c: Option<f64>,
}

/// Working row through the feature-engineering stages: the raw sample plus
/// the phase label, the per-group time step, and the integrated capacity
/// increment for that step.
#[derive(Debug, Clone, Serialize)]
pub struct LabeledSample {
    pub cell_id: String,
    pub checkup_num: u32,
    pub time_s: f64,
    pub current_a: f64,
    pub voltage_v: f64,
    pub temperature_c: Option<f64>,
    pub test_phase: TestPhase,
    pub delta_t_s: f64,
    pub dq_ah: f64,
}

/// Cycle-level features, one row per (cell_id, checkup_num).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleFeatures {
    pub cell_id: String,
    pub checkup_num: u32,
    pub discharge_capacity_ah: f64,
    pub duration_s: f64,
    pub mean_current_a: f64,
    pub min_voltage_v: f64,
}

/// Beginning-of-life reference capacity for one cell, taken from its first
/// checkup and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BolCapacity {
    pub cell_id: String,
    pub bol_capacity_ah: f64,
}

/// Cycle features extended with the SOH columns. `soh` is not clamped; a
/// zero BOL reference propagates as inf/NaN rather than raising.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SohRecord {
    pub cell_id: String,
    pub checkup_num: u32,
    pub discharge_capacity_ah: f64,
    pub duration_s: f64,
    pub mean_current_a: f64,
    pub min_voltage_v: f64,
    pub bol_capacity_ah: f64,
    pub soh: f64,
    pub soh_delta: f64,
    pub below_eol: bool,
}

/// Per-cell rollup used by the fleet report: latest checkup state plus the
/// total SOH fade since beginning of life.
#[derive(Debug, Clone)]
pub struct CellSummary {
    pub cell_id: String,
    pub checkups: usize,
    pub latest_checkup: u32,
    pub latest_soh: f64,
    pub total_fade: f64,
    pub mean_soh_delta: f64,
    pub below_eol: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_current_is_charge() {
        assert_eq!(TestPhase::from_current(0.0), TestPhase::Charge);
        assert_eq!(TestPhase::from_current(1.5), TestPhase::Charge);
        assert_eq!(TestPhase::from_current(-0.001), TestPhase::Discharge);
    }
}
