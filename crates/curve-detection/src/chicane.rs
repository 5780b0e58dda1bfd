//! Chicane grouping

use crate::curve::CurveEvent;
use crate::event::Modifier;
use tracing::debug;

/// Fold runs of closely spaced, alternating-direction curves into chicanes.
///
/// Input must be in route order. A curve joins the current group when it
/// turns the other way from the previous element and starts within
/// `max_gap_m` of that element's exit. Groups of one are passed through.
pub fn group_chicanes(curves: Vec<CurveEvent>, max_gap_m: f64) -> Vec<CurveEvent> {
    let mut out = Vec::with_capacity(curves.len());
    let mut group: Vec<CurveEvent> = Vec::new();

    for curve in curves {
        let joins = group.last().is_some_and(|prev: &CurveEvent| {
            curve.direction == prev.direction.opposite()
                && curve.distance_from_start - prev.exit_distance() <= max_gap_m
        });
        if !joins {
            flush(&mut group, &mut out);
        }
        group.push(curve);
    }
    flush(&mut group, &mut out);
    out
}

fn flush(group: &mut Vec<CurveEvent>, out: &mut Vec<CurveEvent>) {
    match group.len() {
        0 => {}
        1 => out.extend(group.drain(..)),
        _ => out.push(make_chicane(std::mem::take(group))),
    }
}

fn make_chicane(children: Vec<CurveEvent>) -> CurveEvent {
    let first = &children[0];
    let last = &children[children.len() - 1];
    let length = last.exit_distance() - first.distance_from_start;

    debug!(
        "Grouping {} curves at {:.0} m into a chicane",
        children.len(),
        first.distance_from_start
    );

    CurveEvent {
        id: first.id,
        position: first.position,
        direction: first.direction,
        severity: children.iter().map(|c| c.severity).max().unwrap_or(first.severity),
        angle_degrees: children.iter().map(|c| c.angle_degrees).sum(),
        radius_meters: children
            .iter()
            .map(|c| c.radius_meters)
            .fold(f64::INFINITY, f64::min),
        modifier: Modifier::Caution,
        distance_from_start: first.distance_from_start,
        apex_distance: first.apex_distance,
        length_meters: length,
        is_chicane: true,
        chicane_children: children,
    }
}
