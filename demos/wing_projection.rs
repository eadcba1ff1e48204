//! Projects a small point cloud onto a two-segment wing.
//!
//! ```text
//! cargo run --example wing_projection
//! RUST_LOG=aeroseg=debug cargo run --example wing_projection   # optimizer trace
//! ```

use aeroseg::geometry::{ComponentSegment, ProjectionOptions};
use aeroseg::math::Point3;
use aeroseg::operations::query::ProjectPoints;
use aeroseg::optimize::Algorithm;
use tracing::{info, warn};

fn main() -> aeroseg::Result<()> {
    // Default: WARN for everything, INFO for aeroseg.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
        .add_directive("wing_projection=info".parse().unwrap_or_default())
        .add_directive("aeroseg=info".parse().unwrap_or_default());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // inner segment is swept, outer segment is tapered
    let wing = ComponentSegment::new()
        .with_segment(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.5, 4.0, 0.2),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.1, 4.0, 0.2),
        )?
        .with_segment(
            Point3::new(0.5, 4.0, 0.2),
            Point3::new(1.6, 9.0, 0.6),
            Point3::new(2.1, 4.0, 0.2),
            Point3::new(2.3, 9.5, 0.6),
        )?;

    for (index, segment) in wing.segments().iter().enumerate() {
        let (eta_min, eta_max) = segment.eta_range();
        let (le_in, le_out) = segment.leading_edge_eta_range();
        info!(index, eta_min, eta_max, le_in, le_out, "segment");
    }

    let mut cloud = Vec::new();
    for i in 0..5 {
        for j in 0..3 {
            let eta = 0.1 + 0.2 * f64::from(i);
            let xsi = 0.25 * f64::from(j + 1);
            match wing.point(eta, xsi) {
                Ok(p) => cloud.push(p + wing.normal(eta, xsi)? * 0.05),
                Err(err) => warn!(eta, xsi, %err, "coordinate not on the wing"),
            }
        }
    }

    let options = ProjectionOptions::default().with_algorithm(Algorithm::Newton);
    let results = ProjectPoints::new(cloud).with_options(options).execute(&wing);
    for result in results {
        match result {
            Ok(hit) => info!(
                segment = hit.segment,
                eta = hit.eta,
                xsi = hit.xsi,
                distance = hit.distance,
                iterations = hit.iterations,
                "projected"
            ),
            Err(err) => warn!(%err, "projection failed"),
        }
    }

    Ok(())
}
