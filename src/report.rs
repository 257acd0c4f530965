use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CellSummary, SohRecord};

/// Roll SOH rows up to one summary per cell. Records must be ordered by
/// (cell_id, checkup_num) as produced by the pipeline; the last row per
/// cell is taken as its latest state. Output is sorted worst SOH first.
pub fn summarize_cells(records: &[SohRecord]) -> Vec<CellSummary> {
    let mut summaries: Vec<CellSummary> = Vec::new();

    for record in records {
        match summaries.last_mut() {
            Some(summary) if summary.cell_id == record.cell_id => {
                summary.checkups += 1;
                summary.latest_checkup = record.checkup_num;
                summary.latest_soh = record.soh;
                summary.total_fade = 1.0 - record.soh;
                summary.below_eol = record.below_eol;
                summary.mean_soh_delta += record.soh_delta;
            }
            _ => summaries.push(CellSummary {
                cell_id: record.cell_id.clone(),
                checkups: 1,
                latest_checkup: record.checkup_num,
                latest_soh: record.soh,
                total_fade: 1.0 - record.soh,
                mean_soh_delta: 0.0,
                below_eol: record.below_eol,
            }),
        }
    }

    for summary in summaries.iter_mut() {
        if summary.checkups > 1 {
            summary.mean_soh_delta /= (summary.checkups - 1) as f64;
        }
    }

    summaries.sort_by(|a, b| a.latest_soh.total_cmp(&b.latest_soh));
    summaries
}

pub fn build_report(
    records: &[SohRecord],
    eol_threshold: f64,
    generated_on: NaiveDate,
) -> String {
    let summaries = summarize_cells(records);

    let mut output = String::new();
    let _ = writeln!(output, "# Battery Fleet Health Report");
    let _ = writeln!(
        output,
        "Generated on {} (EOL threshold {:.0}% SOH)",
        generated_on,
        eol_threshold * 100.0
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Fleet Summary");

    if summaries.is_empty() {
        let _ = writeln!(output, "No checkup data available.");
        return output;
    }

    let below: Vec<&CellSummary> = summaries.iter().filter(|s| s.below_eol).collect();
    let _ = writeln!(output, "- Cells tracked: {}", summaries.len());
    let _ = writeln!(output, "- Checkups analyzed: {}", records.len());
    let _ = writeln!(output, "- Cells below EOL: {}", below.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cells Below EOL");

    if below.is_empty() {
        let _ = writeln!(output, "No cells below the EOL threshold.");
    } else {
        for summary in &below {
            let _ = writeln!(
                output,
                "- {} at {:.1}% SOH after {} checkups (faded {:.1} points)",
                summary.cell_id,
                summary.latest_soh * 100.0,
                summary.checkups,
                summary.total_fade * 100.0
            );
        }
    }

    let mut degrading: Vec<&CellSummary> = summaries
        .iter()
        .filter(|s| s.mean_soh_delta.is_finite() && s.checkups > 1)
        .collect();
    degrading.sort_by(|a, b| a.mean_soh_delta.total_cmp(&b.mean_soh_delta));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Fastest Degrading Cells");

    if degrading.is_empty() {
        let _ = writeln!(output, "Not enough checkups to estimate degradation rates.");
    } else {
        for summary in degrading.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} losing {:.2} SOH points per checkup (latest checkup {})",
                summary.cell_id,
                -summary.mean_soh_delta * 100.0,
                summary.latest_checkup
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Checkup Per Cell");
    for summary in &summaries {
        let _ = writeln!(
            output,
            "- {}: checkup {} at {:.1}% SOH{}",
            summary.cell_id,
            summary.latest_checkup,
            summary.latest_soh * 100.0,
            if summary.below_eol { " (below EOL)" } else { "" }
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cell: &str, checkup: u32, soh: f64, delta: f64, below: bool) -> SohRecord {
        SohRecord {
            cell_id: cell.to_string(),
            checkup_num: checkup,
            discharge_capacity_ah: soh * 2.0,
            duration_s: 3600.0,
            mean_current_a: 2.0,
            min_voltage_v: 3.1,
            bol_capacity_ah: 2.0,
            soh,
            soh_delta: delta,
            below_eol: below,
        }
    }

    fn fleet() -> Vec<SohRecord> {
        vec![
            record("cell-1", 0, 1.0, 0.0, false),
            record("cell-1", 1, 0.95, -0.05, false),
            record("cell-2", 0, 1.0, 0.0, false),
            record("cell-2", 1, 0.75, -0.25, true),
        ]
    }

    #[test]
    fn summaries_take_latest_row_per_cell() {
        let summaries = summarize_cells(&fleet());
        assert_eq!(summaries.len(), 2);

        // Sorted worst first.
        assert_eq!(summaries[0].cell_id, "cell-2");
        assert_eq!(summaries[0].latest_soh, 0.75);
        assert!(summaries[0].below_eol);
        assert_eq!(summaries[0].checkups, 2);

        assert_eq!(summaries[1].cell_id, "cell-1");
        assert!((summaries[1].total_fade - 0.05).abs() < 1e-12);
    }

    #[test]
    fn mean_delta_averages_over_transitions() {
        let records = vec![
            record("a", 0, 1.0, 0.0, false),
            record("a", 1, 0.9, -0.1, false),
            record("a", 2, 0.85, -0.05, false),
        ];
        let summaries = summarize_cells(&records);
        assert!((summaries[0].mean_soh_delta + 0.075).abs() < 1e-12);
    }

    #[test]
    fn report_lists_eol_cells() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        let report = build_report(&fleet(), 0.8, date);

        assert!(report.contains("# Battery Fleet Health Report"));
        assert!(report.contains("Cells below EOL: 1"));
        assert!(report.contains("cell-2 at 75.0% SOH"));
        assert!(report.contains("Fastest Degrading Cells"));
        assert!(report.contains("2026-08-30"));
    }

    #[test]
    fn report_handles_empty_input() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let report = build_report(&[], 0.8, date);
        assert!(report.contains("No checkup data available."));
    }
}
