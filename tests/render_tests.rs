//! End-to-end renders through the public API.

use spath::prelude::*;

fn tri(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Triangle {
    Triangle::new(Vec3::from_array(a), Vec3::from_array(b), Vec3::from_array(c))
}

/// Red rectangle at z = 0, x in [-0.45, 0.45], y in [-0.3, 0.5].
fn red_quad() -> Scene {
    let red = Material::diffuse(Vec3::new(1.0, 0.0, 0.0));
    Scene::new(
        vec![
            tri([-0.45, -0.3, 0.0], [0.45, -0.3, 0.0], [0.45, 0.5, 0.0]),
            tri([-0.45, -0.3, 0.0], [0.45, 0.5, 0.0], [-0.45, 0.5, 0.0]),
        ],
        vec![red, red],
    )
    .expect("valid scene")
}

fn render_with(r: &mut dyn Renderer, scene: &Scene, w: usize, h: usize, samples: u32, flat: bool) -> Bitmap {
    r.resize_viewport(w, h);
    let vp = r.current_viewport();
    let mut bmp = Bitmap::default();
    if flat {
        r.render_flat(&vp, scene, samples, &mut bmp).expect("render_flat");
    } else {
        r.render(&vp, scene, samples, &mut bmp).expect("render");
    }
    bmp
}

#[test]
fn test_flat_red_quad() {
    // Camera at z = -3 with focal 2: a ray through sensor offset `o` reaches
    // z = 0 at 2.5 * o. On a 16x16 grid that puts columns 5..=10 and rows
    // 5..=9 inside the rectangle.
    let scene = red_quad();
    let mut backends: Vec<Box<dyn Renderer>> = vec![
        Box::new(CpuRenderer::new(CpuMode::Flat)),
        Box::new(CpuRenderer::with_threads(CpuMode::PathTraced, 3)),
    ];

    for r in backends.iter_mut() {
        let bmp = render_with(r.as_mut(), &scene, 16, 16, 1, true);
        assert_eq!(bmp.len(), 256);

        let mut covered = 0;
        for j in 0..16 {
            for i in 0..16 {
                let px = bmp.get(i, j).unwrap();
                if (5..=10).contains(&i) && (5..=9).contains(&j) {
                    assert_eq!(px, Rgba::new(255, 0, 0, 0), "pixel ({i}, {j})");
                    covered += 1;
                } else {
                    assert_eq!(px, Rgba::new(0, 0, 0, 0), "pixel ({i}, {j})");
                }
            }
        }
        assert_eq!(covered, 30);
    }
}

#[test]
fn test_emissive_black_body_converges() {
    let glow = Material::new(Vec3::ZERO, Vec3::new(0.2, 0.6, 1.0));
    let scene = Scene::new(
        vec![tri([-4.0, -4.0, 0.0], [4.0, -4.0, 0.0], [0.0, 4.0, 0.0])],
        vec![glow],
    )
    .expect("valid scene");

    let mut r = CpuRenderer::with_threads(CpuMode::PathTraced, 2);
    let bmp = render_with(&mut r, &scene, 8, 8, 8, false);
    for j in 2..6 {
        for i in 2..6 {
            assert_eq!(bmp.get(i, j).unwrap(), Rgba::new(51, 153, 255, 0));
        }
    }
}

#[test]
fn test_no_emitters_black() {
    let dark = demo_scene();
    let tris = dark.triangles().to_vec();
    let mats = dark
        .materials()
        .iter()
        .map(|m| Material::diffuse(m.reflectance))
        .collect();
    let scene = Scene::new(tris, mats).expect("valid scene");

    let mut r = CpuRenderer::with_threads(CpuMode::PathTraced, 4);
    let bmp = render_with(&mut r, &scene, 20, 15, 4, false);
    assert_eq!(bmp.len(), 300);
    assert!(bmp.data.iter().all(|p| *p == Rgba::default()));
}

#[test]
fn test_empty_scene_black() {
    let scene = Scene::empty();
    let mut r = CpuRenderer::with_threads(CpuMode::PathTraced, 2);
    let bmp = render_with(&mut r, &scene, 9, 5, 2, false);
    assert!(bmp.data.iter().all(|p| *p == Rgba::default()));

    let bmp = render_with(&mut r, &scene, 9, 5, 2, true);
    assert!(bmp.data.iter().all(|p| *p == Rgba::default()));
}

#[test]
fn test_demo_scene_lit() {
    let scene = demo_scene();
    let mut r = CpuRenderer::with_threads(CpuMode::PathTraced, 2);
    let bmp = render_with(&mut r, &scene, 16, 12, 4, false);
    assert!(bmp.data.iter().any(|p| p.r > 0 || p.g > 0 || p.b > 0));
    assert!(bmp.data.iter().all(|p| p.a == 0));
}

#[test]
fn test_bitmap_follows_viewport() {
    let scene = red_quad();
    let mut r = CpuRenderer::new(CpuMode::Flat);
    let bmp = render_with(&mut r, &scene, 7, 3, 1, false);
    assert_eq!((bmp.res_x, bmp.res_y, bmp.len()), (7, 3, 21));
    let bmp = render_with(&mut r, &scene, 2, 9, 1, false);
    assert_eq!((bmp.res_x, bmp.res_y, bmp.len()), (2, 9, 18));
}

#[test]
fn test_app_frame_and_png() {
    let dir = tempfile::tempdir().expect("temp dir");
    let out = dir.path().join("frame.png");

    let settings = Settings {
        width: 12,
        height: 8,
        samples: 2,
        backends: vec![BackendKind::CpuFlat, BackendKind::Cpu],
        output: out.clone(),
        ..Default::default()
    };
    let renderers = spath::app::build_renderers(&settings).expect("cpu backends");
    let mut app = AppState::new(renderers, &settings).expect("app");
    app.play_keys("wr-");
    assert_eq!(app.active_index(), 1);
    assert_eq!(app.samples(), 1);

    let scene = demo_scene();
    let mut bmp = Bitmap::default();
    app.frame(&scene, &mut bmp).expect("frame");
    bmp.save_png(&settings.output).expect("png");
    assert!(out.exists());
}
