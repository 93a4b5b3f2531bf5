//! Level-of-detail refinement rule.
use crate::geometry::Cube;
use constants::viewer::{
    DEFAULT_FOCUS_AND_CONTEXT_WEIGHT, DEFAULT_LOD_THRESHOLD, DEFAULT_RENDER_QUALITY,
};
use glam::DVec3;

/// Knobs deciding which nodes a view refines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodSettings {
    /// Each unit doubles the eagerness to refine.
    pub render_quality: f64,
    pub focus_center: Option<DVec3>,
    pub focus_radius: f64,
    /// Zero ignores the focus region; larger values coarsen its surroundings more.
    pub focus_weight: f64,
    /// Angular detail size above which a node is refined at quality zero.
    pub threshold: f64,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            render_quality: DEFAULT_RENDER_QUALITY,
            focus_center: None,
            focus_radius: 0.0,
            focus_weight: DEFAULT_FOCUS_AND_CONTEXT_WEIGHT,
            threshold: DEFAULT_LOD_THRESHOLD,
        }
    }
}

impl LodSettings {
    /// Attenuation in `(0, 1]`: one inside the focus sphere, falling off with distance outside it.
    pub fn focus_attenuation(&self, cube: &Cube) -> f64 {
        let Some(center) = self.focus_center else {
            return 1.0;
        };
        let distance = cube.sqr_dist(center).sqrt();
        if distance <= self.focus_radius || self.focus_weight <= 0.0 {
            return 1.0;
        }
        let falloff = self.focus_radius.max(f64::EPSILON) / distance;
        1.0 / (1.0 + self.focus_weight * (1.0 - falloff))
    }

    /// Whether a node seen from `eye` should be replaced by its children.
    pub fn should_refine(&self, cube: &Cube, detail_size: f64, eye: DVec3) -> bool {
        let distance = cube.sqr_dist(eye).sqrt().max(cube.radius * 1.0e-3).max(f64::MIN_POSITIVE);
        let angular = detail_size / distance;
        angular * self.render_quality.exp2() * self.focus_attenuation(cube) > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_quality_refines_more() {
        let cube = Cube::new(DVec3::new(100.0, 0.0, 0.0), 1.0);
        let mut lod = LodSettings::default();
        let detail = 0.05;
        let coarse = lod.should_refine(&cube, detail, DVec3::ZERO);
        lod.render_quality = 3.0;
        let fine = lod.should_refine(&cube, detail, DVec3::ZERO);
        assert!(!coarse);
        assert!(fine);
    }

    #[test]
    fn focus_region_keeps_full_weight() {
        let mut lod = LodSettings {
            focus_center: Some(DVec3::ZERO),
            focus_radius: 5.0,
            focus_weight: 1.0,
            ..Default::default()
        };
        let near = Cube::new(DVec3::new(3.0, 0.0, 0.0), 1.0);
        let far = Cube::new(DVec3::new(50.0, 0.0, 0.0), 1.0);
        assert_eq!(lod.focus_attenuation(&near), 1.0);
        assert!(lod.focus_attenuation(&far) < 1.0);
        lod.focus_weight = 0.0;
        assert_eq!(lod.focus_attenuation(&far), 1.0);
    }
}
