use serde::{Deserialize, Serialize};

/// Tuning for the per-surface extremum search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Seed grid resolution in each parameter direction.
    pub seed_divisions: usize,
    /// Number of best seeds refined by Newton iterations.
    pub max_seeds: usize,
    pub max_iterations: usize,
    /// A refinement stops once its parameter step is shorter than this.
    pub parametric_tolerance: f64,
    /// Largest cosine between the residual and a tangent that still counts
    /// as orthogonal.
    pub angular_tolerance: f64,
    /// Extrema closer than this in space are merged.
    pub merge_tolerance: f64,
    /// Search only the face's UV bounding box instead of the whole surface.
    /// Unbounded faces then never produce a result.
    #[serde(default)]
    pub restrict_to_face_bounds: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            seed_divisions: 8,
            max_seeds: 4,
            max_iterations: 100,
            parametric_tolerance: 1e-10,
            angular_tolerance: 1e-9,
            merge_tolerance: 1e-7,
            restrict_to_face_bounds: false,
        }
    }
}

impl ProjectionConfig {
    /// Default tuning, searching each face's UV box only.
    pub fn face_bounded() -> Self {
        Self {
            restrict_to_face_bounds: true,
            ..Self::default()
        }
    }

    /// A denser seed grid, for faces with many local minima.
    pub fn with_seed_divisions(seed_divisions: usize) -> Self {
        Self {
            seed_divisions: seed_divisions.max(1),
            max_seeds: (seed_divisions / 2).max(4),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_surface_search_is_the_default() {
        assert!(!ProjectionConfig::default().restrict_to_face_bounds);
        let bounded = ProjectionConfig::face_bounded();
        assert!(bounded.restrict_to_face_bounds);
        assert_eq!(bounded.seed_divisions, ProjectionConfig::default().seed_divisions);

        let dense = ProjectionConfig::with_seed_divisions(20);
        assert_eq!((dense.seed_divisions, dense.max_seeds), (20, 10));
        assert_eq!(ProjectionConfig::with_seed_divisions(0).seed_divisions, 1);
    }

    #[test]
    fn test_older_configs_deserialize() {
        let json = r#"{"seed_divisions":4,"max_seeds":2,"max_iterations":10,
            "parametric_tolerance":1e-8,"angular_tolerance":1e-6,"merge_tolerance":1e-5}"#;
        let config: ProjectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed_divisions, 4);
        assert!(!config.restrict_to_face_bounds);
    }
}
