//! Per-plant reporting behind `GET /reports`.
//!
//! PostgreSQL sums the exact stored decimals per plant; averages and
//! efficiency ratios are derived from those sums here and rounded to the
//! storage scale. A ratio whose expected sum is zero is `None`.

use rust_decimal::Decimal;

use crate::db::queries::PlantTotals;

pub const REPORT_SCALE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrdering {
    NameAsc,
    NameDesc,
}

impl ReportOrdering {
    /// Accepts `plant_name` or `name`, optionally prefixed with `-`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (descending, field) = match raw.trim().strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.trim()),
        };
        match (field, descending) {
            ("plant_name" | "name", false) => Some(ReportOrdering::NameAsc),
            ("plant_name" | "name", true) => Some(ReportOrdering::NameDesc),
            _ => None,
        }
    }

    pub fn is_descending(self) -> bool {
        self == ReportOrdering::NameDesc
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricReport {
    pub expected_sum: Decimal,
    pub observed_sum: Decimal,
    pub expected_avg: Decimal,
    pub observed_avg: Decimal,
    pub efficiency: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantReport {
    pub plant_name: String,
    pub energy: MetricReport,
    pub irradiation: MetricReport,
}

fn metric(expected_sum: Option<Decimal>, observed_sum: Option<Decimal>, points: i64) -> MetricReport {
    let expected_sum = expected_sum.unwrap_or_default();
    let observed_sum = observed_sum.unwrap_or_default();
    let n = Decimal::from(points.max(1));
    MetricReport {
        expected_sum: expected_sum.round_dp(REPORT_SCALE),
        observed_sum: observed_sum.round_dp(REPORT_SCALE),
        expected_avg: (expected_sum / n).round_dp(REPORT_SCALE),
        observed_avg: (observed_sum / n).round_dp(REPORT_SCALE),
        efficiency: if expected_sum.is_zero() {
            None
        } else {
            observed_sum.checked_div(expected_sum).map(|r| r.round_dp(REPORT_SCALE))
        },
    }
}

impl From<PlantTotals> for PlantReport {
    fn from(t: PlantTotals) -> Self {
        PlantReport {
            energy: metric(t.energy_expected, t.energy_observed, t.points),
            irradiation: metric(t.irradiation_expected, t.irradiation_observed, t.points),
            plant_name: t.plant_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn totals(name: &str, points: i64, sums: [&str; 4]) -> PlantTotals {
        PlantTotals {
            plant_id: Uuid::new_v4(),
            plant_name: name.to_string(),
            points,
            energy_expected: Some(dec(sums[0])),
            energy_observed: Some(dec(sums[1])),
            irradiation_expected: Some(dec(sums[2])),
            irradiation_observed: Some(dec(sums[3])),
        }
    }

    #[test]
    fn sums_averages_and_ratios() {
        let report = PlantReport::from(totals("Solar A", 2, ["40.0", "30.0", "10.0", "8.0"]));

        assert_eq!(report.plant_name, "Solar A");
        assert_eq!(report.energy.expected_sum, dec("40"));
        assert_eq!(report.energy.observed_sum, dec("30"));
        assert_eq!(report.energy.expected_avg, dec("20"));
        assert_eq!(report.energy.observed_avg, dec("15"));
        assert_eq!(report.energy.efficiency, Some(dec("0.75")));
        assert_eq!(report.irradiation.efficiency, Some(dec("0.8")));
    }

    #[test]
    fn zero_expected_sum_has_no_efficiency() {
        let report = PlantReport::from(totals("Night Shift", 2, ["0", "0", "0", "0.75"]));

        assert_eq!(report.energy.efficiency, None);
        assert_eq!(report.irradiation.efficiency, None);
        assert_eq!(report.irradiation.observed_sum, dec("0.75"));
        assert_eq!(report.irradiation.observed_avg, dec("0.375"));
    }

    #[test]
    fn ratio_comes_from_the_sums() {
        // Rows (1, 1) and (9, 4.5) sum to (10, 5.5); their per-row ratios
        // would average to 0.75.
        let report = PlantReport::from(totals("Mixed", 2, ["10", "5.5", "2", "2"]));

        assert_eq!(report.energy.efficiency, Some(dec("0.55")));
        assert_eq!(report.energy.expected_avg, dec("5"));
    }

    #[test]
    fn results_are_rounded_to_storage_scale() {
        let report = PlantReport::from(totals("Thirds", 3, ["3", "1", "3", "2"]));

        assert_eq!(report.energy.efficiency, Some(dec("0.3333333333")));
        assert_eq!(report.irradiation.efficiency, Some(dec("0.6666666667")));
        assert_eq!(report.energy.observed_avg, dec("0.3333333333"));
    }

    #[test]
    fn missing_sums_count_as_zero() {
        let mut empty = totals("Empty", 0, ["0", "0", "0", "0"]);
        empty.energy_expected = None;
        empty.energy_observed = None;

        let report = PlantReport::from(empty);

        assert_eq!(report.energy.expected_sum, Decimal::ZERO);
        assert_eq!(report.energy.expected_avg, Decimal::ZERO);
        assert_eq!(report.energy.efficiency, None);
    }

    #[test]
    fn ordering_parameter() {
        assert_eq!(ReportOrdering::parse("plant_name"), Some(ReportOrdering::NameAsc));
        assert_eq!(ReportOrdering::parse("-name"), Some(ReportOrdering::NameDesc));
        assert!(ReportOrdering::parse("-plant_name").unwrap().is_descending());
        assert_eq!(ReportOrdering::parse("energy"), None);
    }
}
