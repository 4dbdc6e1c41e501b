//! Monte-Carlo light transport on the host.
//!
//! Brute-force over every triangle per ray, no acceleration structure.
//! Flat mode returns the albedo of the first surface; path-traced mode follows
//! diffuse bounces up to [`MAX_DEPTH`].

use rand::Rng;

use crate::geom::{rand_unit_vec, ray_intersect, Hit, Ray};
use crate::scene::{vec3_to_rgba, Rgba, Scene};
use crate::util::{Real, Vec3, PI};

/// Bounces after which the estimator returns zero.
pub const MAX_DEPTH: u32 = 5;

/// Nearest hit along `ray` and the index of the triangle it belongs to.
///
/// On an exact distance tie the lower index wins.
pub fn nearest_hit(ray: &Ray, scene: &Scene) -> Option<(usize, Hit)> {
    let mut best: Option<(usize, Hit)> = None;
    for (idx, tri) in scene.triangles().iter().enumerate() {
        if let Some(hit) = ray_intersect(ray, tri) {
            match best {
                Some((_, b)) if b.distance <= hit.distance => {}
                _ => best = Some((idx, hit)),
            }
        }
    }
    best
}

/// Radiance arriving along `ray`.
///
/// `emittance + (albedo / π) * Li * cosθ / (1 / 2π)`, with `Li` sampled from one
/// random hemisphere direction around the normal facing the ray.
pub fn radiance<R: Rng + ?Sized>(ray: &Ray, scene: &Scene, depth: u32, rng: &mut R) -> Vec3 {
    if depth >= MAX_DEPTH {
        return Vec3::ZERO;
    }

    let Some((idx, hit)) = nearest_hit(ray, scene) else {
        return Vec3::ZERO;
    };

    let tri = &scene.triangles()[idx];
    let mat = &scene.materials()[idx];

    let mut n = tri.n;
    if n.dot(ray.dir) > 0.0 {
        n = -n;
    }

    let bounce = Ray::new(hit.point, rand_unit_vec(n, rng));
    let cos_theta = bounce.dir.dot(n);
    let brdf = mat.reflectance / PI;
    let pdf: Real = 1.0 / (2.0 * PI);

    let incoming = radiance(&bounce, scene, depth + 1, rng);
    mat.emittance + brdf * incoming * cos_theta / pdf
}

/// Reflectance of the first surface hit, black on a miss.
pub fn flat_color(ray: &Ray, scene: &Scene) -> Rgba {
    match nearest_hit(ray, scene) {
        Some((idx, _)) => vec3_to_rgba(scene.materials()[idx].reflectance),
        None => Rgba::default(),
    }
}

/// Average of `n_samples` radiance estimates, clamped and quantized.
pub fn sample_pixel<R: Rng + ?Sized>(ray: &Ray, scene: &Scene, n_samples: u32, rng: &mut R) -> Rgba {
    let n = n_samples.max(1);
    let mut sum = Vec3::ZERO;
    for _ in 0..n {
        sum += radiance(ray, scene, 0, rng);
    }
    vec3_to_rgba(sum / n as Real)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Triangle;
    use crate::scene::Material;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn facing_tri(z: f64) -> Triangle {
        Triangle::new(
            Vec3::new(-1.0, -1.0, z),
            Vec3::new(1.0, -1.0, z),
            Vec3::new(0.0, 1.0, z),
        )
    }

    #[test]
    fn test_nearest_hit_picks_closest() {
        let scene = Scene::new(
            vec![facing_tri(5.0), facing_tri(2.0), facing_tri(2.0)],
            vec![Material::default(); 3],
        )
        .unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        let (idx, hit) = nearest_hit(&ray, &scene).unwrap();
        // Tie between 1 and 2 goes to the lower index
        assert_eq!(idx, 1);
        assert!((hit.distance - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_miss_is_black() {
        let scene = Scene::new(vec![facing_tri(2.0)], vec![Material::default()]).unwrap();
        let mut rng = Pcg32::seed_from_u64(0);
        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        assert_eq!(radiance(&ray, &scene, 0, &mut rng), Vec3::ZERO);
        assert_eq!(flat_color(&ray, &scene), Rgba::default());
    }

    #[test]
    fn test_depth_cutoff() {
        let emitter = Material::new(Vec3::ZERO, Vec3::ONE);
        let scene = Scene::new(vec![facing_tri(2.0)], vec![emitter]).unwrap();
        let mut rng = Pcg32::seed_from_u64(0);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert_eq!(radiance(&ray, &scene, MAX_DEPTH, &mut rng), Vec3::ZERO);
        assert_eq!(radiance(&ray, &scene, MAX_DEPTH - 1, &mut rng), Vec3::ONE);
    }

    #[test]
    fn test_emissive_black_body() {
        let emitter = Material::new(Vec3::ZERO, Vec3::new(0.5, 0.25, 1.0));
        let scene = Scene::new(vec![facing_tri(2.0)], vec![emitter]).unwrap();
        let mut rng = Pcg32::seed_from_u64(3);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert_eq!(sample_pixel(&ray, &scene, 16, &mut rng), Rgba::new(128, 64, 255, 0));
    }

    #[test]
    fn test_no_emitters_black() {
        let white = Material::diffuse(Vec3::ONE);
        let scene = Scene::new(
            vec![facing_tri(2.0), facing_tri(-2.0)],
            vec![white, white],
        )
        .unwrap();
        let mut rng = Pcg32::seed_from_u64(9);
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert_eq!(sample_pixel(&ray, &scene, 8, &mut rng), Rgba::default());
    }

    #[test]
    fn test_flat_color_raw_reflectance() {
        let scene = Scene::new(
            vec![facing_tri(2.0)],
            vec![Material::new(Vec3::new(1.0, 0.5, 0.0), Vec3::ONE)],
        )
        .unwrap();
        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert_eq!(flat_color(&ray, &scene), Rgba::new(255, 128, 0, 0));
    }
}
