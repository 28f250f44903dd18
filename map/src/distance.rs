//! Cell-distance rules and measurement labels.

#[cfg(test)]
#[path = "distance_test.rs"]
mod distance_test;

use crate::camera::Point;
use crate::scene::DistanceRule;

/// Distance between two cell positions, in cells, under the given rule.
#[must_use]
pub fn distance_cells(rule: DistanceRule, a: Point, b: Point) -> f64 {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    match rule {
        DistanceRule::Chebyshev => dx.max(dy),
        DistanceRule::Euclidean => (dx * dx + dy * dy).sqrt(),
        DistanceRule::Alternating => {
            // Diagonal steps alternate between costing one and two cells.
            let diag = dx.min(dy);
            let straight = dx.max(dy) - diag;
            let pairs = (diag / 2.0).floor();
            straight + pairs * 3.0 + diag % 2.0
        }
    }
}

/// Format a distance in meters for the measurement label. Precision drops as
/// the distance grows; non-finite input renders as a dash.
#[must_use]
pub fn format_meters(meters: f64) -> String {
    if !meters.is_finite() {
        return "–".to_string();
    }
    if meters >= 10.0 {
        format!("{meters:.0} m")
    } else if meters >= 1.0 {
        format!("{meters:.2} m")
    } else {
        format!("{meters:.3} m")
    }
}

/// Full label for a measurement between two cells. The alternating rule is
/// called out so the reader knows the number is not straight-line.
#[must_use]
pub fn measure_label(rule: DistanceRule, a: Point, b: Point, meters_per_cell: f64) -> String {
    let meters = distance_cells(rule, a, b) * meters_per_cell;
    let base = format_meters(meters);
    match rule {
        DistanceRule::Alternating => format!("{base} (alt)"),
        _ => base,
    }
}
