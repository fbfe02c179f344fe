//! Light-space projection fitting shared by the shadow providers.

use glam::{Mat4, Vec3};

const FALLBACK_UP: Vec3 = Vec3::X;
const MIN_EXTENT: f32 = 1e-3;

/// Orthographic light view-projection that encloses `corners` as seen along `light_direction`.
///
/// The light looks from the centroid of the corners towards `centroid + light_direction`
/// with world Y as up. The light-space box is the axis-aligned bounds of the corners, with
/// its depth extent widened by `z_mult`: a negative bound is multiplied and a non-negative
/// one divided for the minimum, and the reverse for the maximum.
pub fn fit_light_view_projection(corners: &[Vec3; 8], light_direction: Vec3, z_mult: f32) -> Mat4 {
    let centroid = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let direction = light_direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        return Mat4::IDENTITY;
    }
    let up = if direction.cross(Vec3::Y).length_squared() < 1e-6 { FALLBACK_UP } else { Vec3::Y };
    let view = Mat4::look_at_rh(centroid, centroid + direction, up);

    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for corner in corners {
        let light_space = view.transform_point3(*corner);
        min = min.min(light_space);
        max = max.max(light_space);
    }

    // A flat slab seen edge-on collapses one axis; keep the projection invertible.
    let (min, max) = widen_flat_axes(min, max);

    let z_mult = if z_mult > 0.0 { z_mult } else { 1.0 };
    let min_z = if min.z < 0.0 { min.z * z_mult } else { min.z / z_mult };
    let max_z = if max.z < 0.0 { max.z / z_mult } else { max.z * z_mult };

    Mat4::orthographic_rh(min.x, max.x, min.y, max.y, min_z, max_z) * view
}

fn widen_flat_axes(min: Vec3, max: Vec3) -> (Vec3, Vec3) {
    let flat = (max - min).cmplt(Vec3::splat(MIN_EXTENT));
    let pad = Vec3::select(flat, Vec3::splat(MIN_EXTENT * 0.5), Vec3::ZERO);
    (min - pad, max + pad)
}

/// Depth fractions `[near, far]` of each cascade under the power-law split scheme.
///
/// Split `i` of `count` covers `pct * (i / (count - 1))^e .. pct * ((i + 1) / (count - 1))^e`.
/// A single cascade covers `0 .. pct`.
pub fn cascade_depth_ranges(count: usize, depth_percentage: f32, exponent: f32) -> Vec<(f32, f32)> {
    let pct = depth_percentage.clamp(0.0, 1.0);
    if count <= 1 {
        return vec![(0.0, pct); count];
    }
    let denom = (count - 1) as f32;
    let split = |i: usize| pct * (i as f32 / denom).powf(exponent);
    (0..count).map(|i| (split(i), split(i + 1))).collect()
}

/// Pixel rectangle of one cascade inside the shadow atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasViewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Quadrant of a `resolution`-sized atlas split into four cascades: 0 at the origin,
/// 1 below it, 2 to its right and 3 diagonally opposite.
pub fn cascade_viewport(index: usize, resolution: u32) -> AtlasViewport {
    let width = resolution / 2;
    let height = resolution / 2;
    let x = if index >= 2 { width } else { 0 };
    let y = if index % 2 != 0 { height } else { 0 };
    AtlasViewport { x, y, width, height }
}

/// Remembers the most recent frustum corners so a fit can be frozen in place.
///
/// Freezing only has an effect once at least one unfrozen fit has been computed.
#[derive(Debug, Clone, Default)]
pub struct FrustumFreeze {
    last: Option<Vec<[Vec3; 8]>>,
}

impl FrustumFreeze {
    pub fn resolve(&mut self, follow_camera: bool, current: Vec<[Vec3; 8]>) -> Vec<[Vec3; 8]> {
        if !follow_camera {
            if let Some(last) = self.last.as_ref().filter(|last| last.len() == current.len()) {
                return last.clone();
            }
        }
        self.last = Some(current.clone());
        current
    }

    pub fn is_primed(&self) -> bool {
        self.last.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera3d::Camera;
    use glam::Vec4;

    fn unit_cube_corners(offset: Vec3) -> [Vec3; 8] {
        let mut corners = [Vec3::ZERO; 8];
        let mut idx = 0;
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    corners[idx] = Vec3::new(x, y, z) + offset;
                    idx += 1;
                }
            }
        }
        corners
    }

    #[test]
    fn fitted_projection_contains_all_corners() {
        let corners = unit_cube_corners(Vec3::new(4.0, -2.0, 7.0));
        let direction = Vec3::new(0.5, -0.2, -1.0).normalize();
        let vp = fit_light_view_projection(&corners, direction, 3.5);
        for corner in corners {
            let clip = vp * corner.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x >= -1.0 - 1e-4 && ndc.x <= 1.0 + 1e-4, "{ndc:?}");
            assert!(ndc.y >= -1.0 - 1e-4 && ndc.y <= 1.0 + 1e-4, "{ndc:?}");
            assert!(ndc.z >= -1e-4 && ndc.z <= 1.0 + 1e-4, "{ndc:?}");
        }
    }

    #[test]
    fn box_edges_touch_the_xy_bounds() {
        let corners = unit_cube_corners(Vec3::ZERO);
        let vp = fit_light_view_projection(&corners, Vec3::new(0.0, 0.0, -1.0), 2.0);
        let xs: Vec<f32> = corners.iter().map(|c| vp.project_point3(*c).x).collect();
        let min_x = xs.iter().cloned().fold(f32::MAX, f32::min);
        let max_x = xs.iter().cloned().fold(f32::MIN, f32::max);
        assert!((min_x + 1.0).abs() < 1e-4);
        assert!((max_x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn z_padding_follows_sign_convention() {
        // Light looking down -Z from the centroid at the origin: light-space z spans [-1, 1].
        let corners = unit_cube_corners(Vec3::ZERO);
        let z_mult = 4.0;
        let vp = fit_light_view_projection(&corners, Vec3::NEG_Z, z_mult);
        let expected = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, -4.0, 4.0)
            * Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        assert!(vp.abs_diff_eq(expected, 1e-5), "{vp:?}");

        // The eye sits on the centroid, so translating the corners moves the eye with them.
        let shifted = unit_cube_corners(Vec3::new(0.0, 0.0, 2.0));
        let centroid_view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, 1.0), Vec3::Y);
        let vp = fit_light_view_projection(&shifted, Vec3::NEG_Z, z_mult);
        let expected = Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, -4.0, 4.0) * centroid_view;
        assert!(vp.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn z_mult_widens_the_depth_slab() {
        let corners = unit_cube_corners(Vec3::ZERO);
        let direction = Vec3::NEG_Z;
        let tight = fit_light_view_projection(&corners, direction, 1.0);
        let padded = fit_light_view_projection(&corners, direction, 2.0);
        let point = Vec4::new(0.0, 0.0, -1.5, 1.0);
        let tight_z = (tight * point).z;
        let padded_z = (padded * point).z;
        assert!(tight_z < 0.0 || tight_z > 1.0, "outside the tight slab");
        assert!((0.0..=1.0).contains(&padded_z), "inside the padded slab");
    }

    #[test]
    fn vertical_light_does_not_produce_nan() {
        let corners = unit_cube_corners(Vec3::new(0.0, 5.0, 0.0));
        let vp = fit_light_view_projection(&corners, Vec3::NEG_Y, 3.5);
        assert!(vp.is_finite());
    }

    #[test]
    fn flat_slab_edge_on_stays_finite() {
        let corners = unit_cube_corners(Vec3::ZERO).map(|c| Vec3::new(c.x, 0.0, c.z));
        let vp = fit_light_view_projection(&corners, Vec3::X, 3.5);
        assert!(vp.is_finite(), "{vp:?}");
    }

    #[test]
    fn default_cascades_under_a_vertical_light_are_finite() {
        let camera = Camera::new(36.0_f32.to_radians(), 16.0 / 9.0, 0.5, 500.0);
        let ranges = cascade_depth_ranges(4, 1.0, 2.5);
        let mut far_depths = Vec::new();
        for (near_t, far_t) in ranges {
            let corners = camera.world_space_corners(near_t, far_t);
            assert!(fit_light_view_projection(&corners, Vec3::NEG_Y, 10.0).is_finite(), "({near_t}, {far_t})");
            far_depths.push(corners[1].z);
        }
        assert!(far_depths[3] < far_depths[2] - 100.0, "last cascade has depth: {far_depths:?}");
    }

    #[test]
    fn zero_direction_falls_back_to_identity() {
        let corners = unit_cube_corners(Vec3::ZERO);
        assert_eq!(fit_light_view_projection(&corners, Vec3::ZERO, 3.5), Mat4::IDENTITY);
    }

    #[test]
    fn cascade_lengths_grow_with_index() {
        for count in [2usize, 3, 4, 6] {
            for exponent in [1.5f32, 2.5, 4.0] {
                let ranges = cascade_depth_ranges(count, 0.8, exponent);
                assert_eq!(ranges.len(), count);
                assert_eq!(ranges[0].0, 0.0);
                for pair in ranges.windows(2) {
                    assert!((pair[0].1 - pair[1].0).abs() < 1e-6, "contiguous");
                    let first = pair[0].1 - pair[0].0;
                    let second = pair[1].1 - pair[1].0;
                    assert!(second >= first, "{count} cascades, e={exponent}: {ranges:?}");
                }
            }
        }
    }

    #[test]
    fn default_scheme_matches_power_law() {
        let ranges = cascade_depth_ranges(4, 1.0, 2.5);
        let third = (1.0f32 / 3.0).powf(2.5);
        let two_thirds = (2.0f32 / 3.0).powf(2.5);
        assert!((ranges[0].1 - third).abs() < 1e-6);
        assert!((ranges[1].1 - two_thirds).abs() < 1e-6);
        assert!((ranges[2].1 - 1.0).abs() < 1e-6);
        // The last split extends past the shadowed range, as the scheme prescribes.
        assert!(ranges[3].1 > 1.0);
    }

    #[test]
    fn single_cascade_covers_the_shadowed_range() {
        assert_eq!(cascade_depth_ranges(1, 0.5, 2.5), vec![(0.0, 0.5)]);
        assert!(cascade_depth_ranges(0, 0.5, 2.5).is_empty());
    }

    #[test]
    fn atlas_quadrants() {
        assert_eq!(cascade_viewport(0, 2048), AtlasViewport { x: 0, y: 0, width: 1024, height: 1024 });
        assert_eq!(cascade_viewport(1, 2048), AtlasViewport { x: 0, y: 1024, width: 1024, height: 1024 });
        assert_eq!(cascade_viewport(2, 2048), AtlasViewport { x: 1024, y: 0, width: 1024, height: 1024 });
        assert_eq!(cascade_viewport(3, 2048), AtlasViewport { x: 1024, y: 1024, width: 1024, height: 1024 });
    }

    #[test]
    fn freeze_needs_a_prior_fit() {
        let mut freeze = FrustumFreeze::default();
        let a = vec![unit_cube_corners(Vec3::ZERO)];
        let b = vec![unit_cube_corners(Vec3::ONE)];
        assert_eq!(freeze.resolve(false, a.clone()), a, "nothing to freeze yet");
        assert!(freeze.is_primed());
        assert_eq!(freeze.resolve(false, b.clone()), a, "frozen");
        assert_eq!(freeze.resolve(true, b.clone()), b, "following again");
        assert_eq!(freeze.resolve(false, a.clone()), b);
    }
}
