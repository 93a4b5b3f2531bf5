//! Point records as stored inside the octree.
use glam::{DVec3, Vec3};

/// Vector added to every stored coordinate to recover source coordinates.
pub type OffsetVector = DVec3;

/// Eight-bit RGBA colour carried by every point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Build a colour from floating-point channels in the 0-255 range, clamping out-of-range values.
    pub fn from_f32(rgb: [f32; 3]) -> Self {
        let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        Self([channel(rgb[0]), channel(rgb[1]), channel(rgb[2]), 255])
    }

    pub fn r(&self) -> u8 {
        self.0[0]
    }

    pub fn g(&self) -> u8 {
        self.0[1]
    }

    pub fn b(&self) -> u8 {
        self.0[2]
    }

    /// Rounded mean of the three colour channels, used as a LAS intensity.
    pub fn intensity(&self) -> u16 {
        (u16::from(self.0[0]) + u16::from(self.0[1]) + u16::from(self.0[2]) + 1) / 3
    }
}

/// Single point in octree coordinates (source coordinates minus the file offset).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LidarPoint {
    pub position: Vec3,
    pub color: Rgba,
}

impl LidarPoint {
    pub fn new(position: Vec3, color: Rgba) -> Self {
        Self { position, color }
    }

    /// Position widened to double precision, still in octree coordinates.
    pub fn position_f64(&self) -> DVec3 {
        self.position.as_dvec3()
    }
}

/// Point as handed from the accumulator to temporary octrees, with an optional normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamPoint {
    pub point: LidarPoint,
    pub normal: Option<Vec3>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_from_floats_clamps_channels() {
        let c = Rgba::from_f32([300.0, -4.0, 127.6]);
        assert_eq!(c, Rgba::new(255, 0, 128, 255));
    }

    #[test]
    fn intensity_is_rounded_channel_mean() {
        assert_eq!(Rgba::new(10, 20, 31, 255).intensity(), 20);
        assert_eq!(Rgba::WHITE.intensity(), 255);
    }
}
