use glam::Vec3;

/// Fits a sphere around a set of spheres.
///
/// Ritter-style: seed with the pair of spheres that is furthest apart along
/// one axis, then grow to take in every remaining sphere. The result is not
/// minimal but always encloses all inputs.
pub fn merge_spheres(spheres: &[(Vec3, f32)]) -> (Vec3, f32) {
    let Some(&first) = spheres.first() else {
        return (Vec3::ZERO, 0.0);
    };

    // extremal spheres along each axis, measured at their surface
    let mut smin = [first; 3];
    let mut smax = [first; 3];
    for &(c, r) in spheres {
        for axis in 0..3 {
            if c[axis] - r < smin[axis].0[axis] - smin[axis].1 {
                smin[axis] = (c, r);
            }
            if c[axis] + r > smax[axis].0[axis] + smax[axis].1 {
                smax[axis] = (c, r);
            }
        }
    }

    let mut paxis = 0;
    let mut paxisd = f32::MIN;
    for axis in 0..3 {
        let d = (smax[axis].0[axis] + smax[axis].1) - (smin[axis].0[axis] - smin[axis].1);
        if d > paxisd {
            paxisd = d;
            paxis = axis;
        }
    }

    let (mut center, mut radius) = smin[paxis];
    for &sphere in spheres.iter().chain(std::iter::once(&smax[paxis])) {
        (center, radius) = grow(center, radius, sphere);
    }

    // absorb rounding so every input is contained
    for &(c, r) in spheres {
        radius = radius.max(c.distance(center) + r);
    }

    (center, radius)
}

fn grow(center: Vec3, radius: f32, (c, r): (Vec3, f32)) -> (Vec3, f32) {
    let d = c.distance(center);
    if d + r <= radius {
        return (center, radius);
    }
    if d + radius <= r {
        return (c, r);
    }
    let new_radius = (radius + d + r) * 0.5;
    let center = center + (c - center) * ((new_radius - radius) / d);
    (center, new_radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn contains(outer: (Vec3, f32), inner: (Vec3, f32)) -> bool {
        outer.0.distance(inner.0) + inner.1 <= outer.1 * (1.0 + 1e-5) + 1e-5
    }

    #[test]
    fn encloses_random_spheres() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.gen_range(1..40);
            let spheres: Vec<(Vec3, f32)> = (0..n)
                .map(|_| {
                    let c = Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
                    (c, rng.gen_range(0.0..3.0))
                })
                .collect();
            let merged = merge_spheres(&spheres);
            for s in &spheres {
                assert!(contains(merged, *s), "{:?} does not contain {:?}", merged, s);
            }
        }
    }

    #[test]
    fn single_sphere_is_returned_as_is() {
        let s = (Vec3::new(1.0, 2.0, 3.0), 0.5);
        let (c, r) = merge_spheres(&[s]);
        assert!(c.distance(s.0) < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nested_sphere_keeps_the_outer_one() {
        let outer = (Vec3::ZERO, 10.0);
        let inner = (Vec3::new(1.0, 0.0, 0.0), 1.0);
        let (c, r) = merge_spheres(&[inner, outer]);
        assert!(c.distance(Vec3::ZERO) < 1e-5);
        assert!((r - 10.0).abs() < 1e-5);
    }

    #[test]
    fn two_disjoint_spheres_span_both() {
        let (c, r) = merge_spheres(&[(Vec3::new(-5.0, 0.0, 0.0), 1.0), (Vec3::new(5.0, 0.0, 0.0), 1.0)]);
        assert!(c.distance(Vec3::ZERO) < 1e-5);
        assert!((r - 6.0).abs() < 1e-5);
    }
}
