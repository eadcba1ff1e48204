mod project_points;

pub use project_points::ProjectPoints;
