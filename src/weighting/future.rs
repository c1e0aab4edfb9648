//! Weights for a cohort as if it were observed in a later year

use super::projection::ProjectionTable;
use super::reweight::{Calibration, Reweighter};
use crate::error::Result;
use crate::panel::Panel;
use std::collections::BTreeMap;

/// Reweight a copy of a single-wave `panel` against the `target_year` projections
///
/// Attributes are left as they are; only the stratification year moves.
/// Returns pidp -> calibrated weight, with 0.0 for anyone the calibration
/// excluded.
pub fn project_weights(
    panel: &Panel,
    projections: &ProjectionTable,
    calibration: &Calibration,
    target_year: i32,
) -> Result<BTreeMap<i64, f64>> {
    let mut rows = panel.rows().to_vec();
    for row in rows.iter_mut() {
        row.time = target_year;
    }

    let reweighter = Reweighter::new(projections, calibration.clone());
    let (moved, report) = reweighter.reweight(panel.with_rows(rows))?;
    log::info!(
        "Projected weights for {} individuals into {} ({} excluded)",
        moved.person_count(),
        target_year,
        report.rows_excluded
    );

    Ok(moved.rows().iter().map(|r| (r.pidp, r.weight)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::test_support::schema;
    use crate::panel::{ColumnKind, Observation, Value};
    use crate::weighting::StratumKey;
    use approx::assert_relative_eq;

    #[test]
    fn test_weights_follow_target_year() {
        let rows = vec![
            Observation {
                pidp: 1,
                hidp: 1,
                time: 2013,
                weight: 1.0,
                values: vec![Value::Text("Female".into()), Value::Text("WBI".into()), Value::Int(40)],
            },
            Observation {
                pidp: 2,
                hidp: 2,
                time: 2013,
                weight: 1.0,
                values: vec![Value::Text("Male".into()), Value::Text("WBI".into()), Value::Int(40)],
            },
            Observation {
                pidp: 3,
                hidp: 3,
                time: 2013,
                weight: 1.0,
                values: vec![Value::Text("Male".into()), Value::Text("BAN".into()), Value::Int(40)],
            },
        ];
        let panel = Panel::new(
            schema(&[
                ("sex", ColumnKind::Text),
                ("ethnicity", ColumnKind::Text),
                ("age", ColumnKind::Int),
            ]),
            rows,
        );
        let table = ProjectionTable::from_counts(vec![
            (StratumKey::new("Female", "WBI", 40, 2018), 300.0),
            (StratumKey::new("Male", "WBI", 40, 2018), 100.0),
            (StratumKey::new("Male", "BAN", 40, 2013), 100.0),
        ]);

        let weights = project_weights(&panel, &table, &Calibration::default(), 2018).unwrap();
        assert_relative_eq!(weights[&1], 1.0);
        assert_relative_eq!(weights[&2], 100.0 / 300.0);
        // No 2018 projection for this stratum
        assert_relative_eq!(weights[&3], 0.0);
        // Source panel is untouched
        assert!(panel.rows().iter().all(|r| r.time == 2013));
    }
}
