use glam::{Mat4, Vec3, Vec4};

/// Depth range convention of the projection matrix.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ClipDepth {
    /// OpenGL style, -w..w.
    NegativeOneToOne,
    #[default]
    ZeroToOne,
    /// Zero-to-one with near mapped to 1.
    ReversedZeroToOne,
}

/// Frustum planes of a view-projection matrix (Gribb-Hartmann), normalized,
/// facing inward. Order: left, right, bottom, top, near, far.
pub fn extract_planes(view_projection: Mat4, depth: ClipDepth) -> [Vec4; 6] {
    let r0 = view_projection.row(0);
    let r1 = view_projection.row(1);
    let r2 = view_projection.row(2);
    let r3 = view_projection.row(3);

    let (near, far) = match depth {
        ClipDepth::NegativeOneToOne => (r3 + r2, r3 - r2),
        ClipDepth::ZeroToOne => (r2, r3 - r2),
        ClipDepth::ReversedZeroToOne => (r3 - r2, r2),
    };

    [r3 + r0, r3 - r0, r3 + r1, r3 - r1, near, far].map(normalize_plane)
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let len = plane.truncate().length();
    if len > 0.0 { plane / len } else { plane }
}

/// Largest axis scale of an object-to-world transform.
pub fn object_scale(object_to_world: Mat4) -> f32 {
    object_to_world
        .x_axis
        .truncate()
        .length()
        .max(object_to_world.y_axis.truncate().length())
        .max(object_to_world.z_axis.truncate().length())
}

/// Object-space sphere against world-space planes.
pub fn sphere_visible(planes: &[Vec4; 6], object_to_world: Mat4, scale: f32, center: Vec3, radius: f32) -> bool {
    let c = object_to_world.transform_point3(center);
    let r = radius * scale;
    planes.iter().all(|p| p.truncate().dot(c) + p.w >= -r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Mat4 {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        proj * view
    }

    #[test]
    fn sphere_in_front_is_visible() {
        let planes = extract_planes(camera(), ClipDepth::ZeroToOne);
        assert!(sphere_visible(&planes, Mat4::IDENTITY, 1.0, Vec3::ZERO, 1.0));
    }

    #[test]
    fn sphere_behind_is_culled() {
        let planes = extract_planes(camera(), ClipDepth::ZeroToOne);
        assert!(!sphere_visible(&planes, Mat4::IDENTITY, 1.0, Vec3::new(0.0, 0.0, 20.0), 1.0));
    }

    #[test]
    fn sphere_beyond_far_plane_is_culled() {
        let planes = extract_planes(camera(), ClipDepth::ZeroToOne);
        assert!(!sphere_visible(&planes, Mat4::IDENTITY, 1.0, Vec3::new(0.0, 0.0, -200.0), 1.0));
    }

    #[test]
    fn sphere_touching_a_side_plane_is_visible() {
        let planes = extract_planes(camera(), ClipDepth::ZeroToOne);
        // centre just outside the left plane, radius reaching back in
        let x = -10.0 * 30f32.to_radians().tan() - 0.5;
        assert!(sphere_visible(&planes, Mat4::IDENTITY, 1.0, Vec3::new(x, 0.0, 0.0), 1.0));
        assert!(!sphere_visible(&planes, Mat4::IDENTITY, 1.0, Vec3::new(x, 0.0, 0.0), 0.1));
    }

    #[test]
    fn object_transform_moves_and_scales_spheres() {
        let planes = extract_planes(camera(), ClipDepth::ZeroToOne);
        let moved = Mat4::from_translation(Vec3::new(0.0, 0.0, 30.0));
        assert!(!sphere_visible(&planes, moved, 1.0, Vec3::ZERO, 1.0));

        let scaled = Mat4::from_scale(Vec3::new(1.0, 3.0, 2.0));
        assert_eq!(object_scale(scaled), 3.0);
    }

    #[test]
    fn clip_conventions_share_side_planes() {
        let gl = extract_planes(camera(), ClipDepth::NegativeOneToOne);
        let dx = extract_planes(camera(), ClipDepth::ZeroToOne);
        let reversed = extract_planes(camera(), ClipDepth::ReversedZeroToOne);
        assert_eq!(gl[..4], dx[..4]);
        assert_eq!(reversed[4], dx[5]);
        assert_eq!(reversed[5], dx[4]);
    }
}
