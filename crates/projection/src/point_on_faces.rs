use part_kernel::geometry::point::Point3d;
use part_kernel::geometry::surfaces::UvBounds;
use part_kernel::geometry::vector::Vec3;
use part_kernel::{FaceId, Shape};
use tracing::{debug, instrument, warn};

use crate::config::ProjectionConfig;
use crate::surface_projector::SurfaceProjector;

#[derive(Debug, Clone)]
struct FaceProjector {
    projector: SurfaceProjector,
    face: FaceId,
    same_sense: bool,
}

impl FaceProjector {
    /// Distance used to rank candidates; failed runs never win over a real result.
    fn rank(&self) -> f64 {
        if self.projector.is_done() {
            self.projector.lower_distance().unwrap_or(f64::MAX)
        } else {
            f64::MAX
        }
    }
}

/// Projection of points onto the nearest of a set of faces.
///
/// Every query runs one projector per face and keeps the closest result.
/// Each face is projected onto its whole underlying surface unless the
/// config restricts it to the face's parameter box. There is no spatial
/// index, so a query costs one surface projection per face.
#[derive(Debug, Clone, Default)]
pub struct PointOnFacesProjection {
    projectors: Vec<FaceProjector>,
    solution: Option<usize>,
    config: ProjectionConfig,
}

impl PointOnFacesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ProjectionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Construct and [`prepare`](Self::prepare) in one step.
    pub fn with_shape(shape: &Shape) -> Self {
        let mut projection = Self::new();
        projection.prepare(shape);
        projection
    }

    /// Rebuild the projectors, one per face of `shape` in explorer order.
    #[instrument(skip(self, shape), fields(faces = shape.face_count()))]
    pub fn prepare(&mut self, shape: &Shape) {
        self.release();
        for face_id in shape.faces() {
            let Some(face) = shape.face(face_id) else {
                continue;
            };
            let bounds = shape.face_uv_bounds(face_id).unwrap_or_else(|| {
                if self.config.restrict_to_face_bounds {
                    warn!(?face_id, "face has no parameter bounds; it will never be selected");
                } else {
                    debug!(?face_id, "face has no parameter bounds; seeding over the natural domain");
                }
                UvBounds::empty()
            });
            self.projectors.push(FaceProjector {
                projector: SurfaceProjector::new(face.surface.clone(), bounds, self.config),
                face: face_id,
                same_sense: face.same_sense,
            });
        }
        debug!(projectors = self.projectors.len(), "projection prepared");
    }

    /// Drop every projector and the current solution.
    pub fn release(&mut self) {
        self.projectors.clear();
        self.solution = None;
    }

    pub fn projector_count(&self) -> usize {
        self.projectors.len()
    }

    /// Project `point` onto every face and select the nearest result.
    /// Ties go to the face met first.
    #[instrument(level = "debug", skip(self, point), fields(point = ?[point.x, point.y, point.z]))]
    pub fn compute(&mut self, point: &Point3d) -> &mut Self {
        for face_projector in &mut self.projectors {
            face_projector.projector.perform(point);
        }
        self.solution = self
            .projectors
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.rank().total_cmp(&b.rank()))
            .map(|(index, _)| index);
        debug_assert!(
            self.solution.is_some() || self.projectors.is_empty(),
            "a non-empty projector set always has a minimum"
        );
        if let Some(index) = self.solution {
            debug!(index, distance = self.projectors[index].rank(), "selected face");
        }
        self
    }

    fn selected(&self) -> Option<&FaceProjector> {
        self.solution.and_then(|index| self.projectors.get(index))
    }

    fn solved(&self) -> Option<&FaceProjector> {
        self.selected().filter(|fp| fp.projector.is_done() && fp.projector.nb_points() > 0)
    }

    /// The selected face converged to at least one point.
    pub fn is_done(&self) -> bool {
        self.solved().is_some()
    }

    /// Face of the solution, or the null face id.
    pub fn solution_face(&self) -> FaceId {
        self.solved().map(|fp| fp.face).unwrap_or_default()
    }

    /// Nearest point, or the origin.
    pub fn solution_point(&self) -> Point3d {
        self.solved()
            .and_then(|fp| fp.projector.nearest_point())
            .unwrap_or(Point3d::ORIGIN)
    }

    /// Surface parameters of the nearest point, or `(0, 0)`.
    pub fn solution_uv(&self) -> (f64, f64) {
        self.solved()
            .and_then(|fp| fp.projector.lower_distance_parameters())
            .unwrap_or((0.0, 0.0))
    }

    /// Face normal at the nearest point, or +Z.
    pub fn solution_normal(&self) -> Vec3 {
        let Some(fp) = self.solved() else {
            return Vec3::Z;
        };
        let Some((u, v)) = fp.projector.lower_distance_parameters() else {
            return Vec3::Z;
        };
        let n = fp.projector.surface().normal_at(u, v);
        if fp.same_sense {
            n
        } else {
            -n
        }
    }

    /// Distance from the last query point to the solution.
    pub fn solution_distance(&self) -> Option<f64> {
        self.solved().and_then(|fp| fp.projector.lower_distance())
    }
}
