//! Orthogonal projection of points onto surfaces and onto the faces of a shape.

pub mod config;
pub mod point_on_faces;
pub mod surface_projector;

pub use config::ProjectionConfig;
pub use point_on_faces::PointOnFacesProjection;
pub use surface_projector::{Extremum, SurfaceProjector};
