//! Detector throughput on a long synthetic mountain road

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use curve_detection::{CurveDetector, FlowEventDetector, Zone, ZoneCharacter};
use route_geometry::{destination, DistanceIndex, GeoPoint};

/// ~40 km of alternating bends sampled every 10 m
fn mountain_road() -> Vec<GeoPoint> {
    let mut points = vec![GeoPoint::new(7.0, 45.5)];
    let mut heading: f64 = 0.0;
    for i in 0..4_000 {
        let turn = match (i / 25) % 4 {
            0 => 6.0,
            2 => -9.0,
            _ => 0.0,
        };
        heading += turn;
        let last = points[points.len() - 1];
        points.push(destination(last, heading, 10.0));
    }
    points
}

fn bench_detectors(c: &mut Criterion) {
    let index = DistanceIndex::build(&mountain_road());
    let zones = vec![Zone {
        id: 1,
        character: ZoneCharacter::Technical,
        start_distance: 0.0,
        end_distance: index.total_length(),
    }];

    c.bench_function("curve_detector_40km", |b| {
        let detector = CurveDetector::default();
        b.iter(|| detector.detect(black_box(&index)))
    });

    c.bench_function("flow_detector_40km", |b| {
        let detector = FlowEventDetector::default();
        b.iter(|| detector.detect(black_box(&index), black_box(&zones)))
    });
}

criterion_group!(benches, bench_detectors);
criterion_main!(benches);
