use glam::{Mat4, Vec3};
use penumbra::camera3d::Camera;
use penumbra::mesh::{GeometryData, GpuMesh};
use penumbra::renderer::forward_pass::{DirectionalLight, ForwardFrame, ForwardRenderer, ForwardSettings};
use penumbra::renderer::renderable::Renderable;
use penumbra::renderer::shadow_provider::ShadowProvider;
use penumbra::renderer::shadow_settings::{
    ResolutionChangeListener, ShadowMode, ShadowResolution, ShadowSettings,
};
use std::sync::{Arc, Mutex};

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;
const SIZE: (u32, u32) = (64, 64);

struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

fn gpu() -> Option<Gpu> {
    pollster::block_on(async {
        let instance = wgpu::Instance::default();
        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(err) => {
                eprintln!("skipping GPU test, no adapter: {err}");
                return None;
            }
        };
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Test Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
            })
            .await
            .ok()?;
        Some(Gpu { device, queue })
    })
}

fn forward(gpu: &Gpu, mode: ShadowMode) -> ForwardRenderer {
    let settings = ForwardSettings { shadow_mode: mode, ..ForwardSettings::default() };
    ForwardRenderer::new(&gpu.device, &gpu.queue, COLOR_FORMAT, SIZE, &settings).expect("forward renderer")
}

fn color_target(gpu: &Gpu) -> wgpu::TextureView {
    gpu.device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Target"),
            size: wgpu::Extent3d { width: SIZE.0, height: SIZE.1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn scene(gpu: &Gpu) -> Vec<Renderable> {
    let cube = Arc::new(GpuMesh::upload(&gpu.device, "cube", &GeometryData::cube(1.0)));
    let ground = Arc::new(GpuMesh::upload(&gpu.device, "ground", &GeometryData::plane(1.0)));
    let mut objects = vec![Renderable::new("ground", ground)];
    objects[0].properties.set_position(Vec3::new(0.0, -2.0, 0.0));
    objects[0].properties.set_scale(Vec3::splat(100.0));
    for z in [-10.0, -20.0, -30.0] {
        let mut object = Renderable::new("cube", Arc::clone(&cube));
        object.properties.set_position(Vec3::new(0.0, 0.0, z));
        objects.push(object);
    }
    objects
}

fn camera() -> Camera {
    Camera::new(36f32.to_radians(), 1.0, 0.5, 100.0)
}

fn record_frame(
    gpu: &Gpu,
    forward: &mut ForwardRenderer,
    target: &wgpu::TextureView,
    camera: &Camera,
    renderables: &mut [Renderable],
) -> penumbra::renderer::forward_pass::FrameStats {
    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    let stats = forward
        .render(ForwardFrame {
            device: &gpu.device,
            queue: &gpu.queue,
            encoder: &mut encoder,
            target,
            camera: Some(camera),
            renderables,
        })
        .expect("record frame");
    gpu.queue.submit(Some(encoder.finish()));
    stats
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<ShadowResolution>>,
}

impl ResolutionChangeListener for Recorder {
    fn on_resolution_changed(&self, resolution: ShadowResolution) {
        self.seen.lock().expect("recorder lock").push(resolution);
    }
}

#[test]
fn resolution_change_notifies_each_listener_once() {
    let Some(gpu) = gpu() else { return };
    let mut forward = forward(&gpu, ShadowMode::Simple);
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    forward.register_resolution_listener(first.clone());
    forward.register_resolution_listener(second.clone());

    forward.set_shadow_map_resolution(&gpu.device, ShadowResolution::R4096).expect("resize shadow map");
    forward.set_shadow_map_resolution(&gpu.device, ShadowResolution::R4096).expect("same size is a no-op");

    assert_eq!(forward.shadow_settings().resolution, ShadowResolution::R4096);
    let texture = forward.shadow_map().texture().expect("shadow texture");
    assert_eq!((texture.width(), texture.height()), (4096, 4096));
    assert_eq!(*first.seen.lock().expect("lock"), vec![ShadowResolution::R4096]);
    assert_eq!(*second.seen.lock().expect("lock"), vec![ShadowResolution::R4096]);
}

#[test]
fn mode_round_trip_restores_tuning_and_settings() {
    let Some(gpu) = gpu() else { return };
    let mut forward = forward(&gpu, ShadowMode::Simple);
    forward.set_min_bias(0.002);
    forward.set_max_bias(0.004);
    forward.set_z_mult(6.0);
    forward.set_backface_culling(&gpu.device, false);
    forward.set_shadow_map_resolution(&gpu.device, ShadowResolution::R1024).expect("resize");
    let before = forward.shadow_settings();
    let simple_before = forward.shadow_tuning().simple();

    forward.set_shadow_mode(&gpu.device, &gpu.queue, ShadowMode::Cascaded).expect("to cascaded");
    assert_eq!(forward.shadow_mode(), ShadowMode::Cascaded);
    assert_eq!(forward.shadow_settings(), before);
    assert_eq!(forward.shadow_provider().bias(), (0.0005, 0.001));

    forward.set_shadow_mode(&gpu.device, &gpu.queue, ShadowMode::Simple).expect("back to simple");
    assert_eq!(forward.shadow_tuning().simple(), simple_before);
    assert_eq!(forward.shadow_provider().bias(), (0.002, 0.004));
    assert_eq!(forward.shadow_settings(), before);
    assert!(!forward.shadow_provider().is_culling_backfaces());
    assert_eq!(forward.layout_generation(), 2);

    forward.set_shadow_mode(&gpu.device, &gpu.queue, ShadowMode::Simple).expect("same mode");
    assert_eq!(forward.layout_generation(), 2, "switching to the active mode does nothing");
}

#[test]
fn cascaded_tuning_and_depth_percentage_survive_mode_round_trip() {
    let Some(gpu) = gpu() else { return };
    let mut forward = forward(&gpu, ShadowMode::Cascaded);
    forward.set_assignment_exponent(3.0);
    forward.set_z_mult(6.0);
    forward.set_min_bias(0.0015);
    forward.set_shadow_depth_percentage(0.5);

    forward.set_shadow_mode(&gpu.device, &gpu.queue, ShadowMode::Simple).expect("to simple");
    assert_eq!(forward.shadow_provider().shadow_depth_percentage(), 0.5);
    forward.set_assignment_exponent(1.5);
    forward.set_shadow_mode(&gpu.device, &gpu.queue, ShadowMode::Cascaded).expect("back to cascaded");

    let stored = forward.shadow_tuning().cascaded();
    assert_eq!(stored.assignment_exponent, 3.0);
    assert_eq!(stored.z_mult, 6.0);
    assert_eq!(stored.min_bias, 0.0015);
    assert_eq!(forward.shadow_settings().depth_percentage, 0.5);
    match forward.shadow_provider() {
        ShadowProvider::Cascaded(map) => {
            assert_eq!(map.tuning(), stored);
            let ranges = map.depth_ranges();
            let expected = 0.5 * (2.0f32 / 3.0).powf(3.0);
            assert!((ranges[1].1 - expected).abs() < 1e-6, "{ranges:?}");
        }
        ShadowProvider::Simple(_) => panic!("expected cascaded shadows"),
    }
}

#[test]
fn degenerate_light_is_rejected_without_partial_writes() {
    let Some(gpu) = gpu() else { return };
    let mut forward = forward(&gpu, ShadowMode::Simple);
    let light = DirectionalLight { direction: Vec3::new(1.0, -1.0, 0.0), ..DirectionalLight::default() };
    forward.set_directional_light(&gpu.queue, light).expect("valid light");
    let zero = DirectionalLight { direction: Vec3::ZERO, color: Vec3::X, ambient_intensity: 0.5 };
    assert!(forward.set_directional_light(&gpu.queue, zero).is_err());
    assert_eq!(forward.light(), light);
}

#[test]
fn dirty_renderables_upload_once() {
    let Some(gpu) = gpu() else { return };
    let mut forward = forward(&gpu, ShadowMode::Simple);
    let target = color_target(&gpu);
    let camera = camera();
    let mut renderables = scene(&gpu);

    let stats = record_frame(&gpu, &mut forward, &target, &camera, &mut renderables);
    assert_eq!(stats.renderable_uploads, renderables.len());
    assert_eq!(stats.draws, renderables.len());
    assert!(!stats.params_uploaded, "construction already uploaded the shadow params");

    let stats = record_frame(&gpu, &mut forward, &target, &camera, &mut renderables);
    assert_eq!(stats.renderable_uploads, 0);

    renderables[2].properties.set_color(Vec3::new(1.0, 0.0, 0.0));
    forward.set_min_bias(0.003);
    let stats = record_frame(&gpu, &mut forward, &target, &camera, &mut renderables);
    assert_eq!(stats.renderable_uploads, 1);
    assert!(stats.params_uploaded);
}

#[test]
fn frames_render_in_both_modes_without_validation_errors() {
    let Some(gpu) = gpu() else { return };
    gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

    let mut forward = forward(&gpu, ShadowMode::Simple);
    forward
        .set_directional_light(
            &gpu.queue,
            DirectionalLight { direction: Vec3::new(0.5, -0.2, -1.0), ..DirectionalLight::default() },
        )
        .expect("light");
    let target = color_target(&gpu);
    let camera = camera();
    let mut renderables = scene(&gpu);

    record_frame(&gpu, &mut forward, &target, &camera, &mut renderables);
    match forward.shadow_provider() {
        ShadowProvider::Simple(map) => assert_ne!(map.last_projection(), Mat4::IDENTITY),
        ShadowProvider::Cascaded(_) => panic!("expected simple shadows"),
    }

    forward.set_shadow_mode(&gpu.device, &gpu.queue, ShadowMode::Cascaded).expect("to cascaded");
    forward.set_debug_show_cascades(&gpu.queue, true).expect("debug tint");
    forward.set_pcf_samples(&gpu.queue, 25).expect("pcf");
    let stats = record_frame(&gpu, &mut forward, &target, &camera, &mut renderables);
    assert_eq!(stats.renderable_uploads, 0, "mode switch rebinds without re-uploading");
    assert_eq!(stats.draws, renderables.len());
    match forward.shadow_provider() {
        ShadowProvider::Cascaded(map) => {
            let projections = map.last_projections();
            assert!(projections.iter().all(|m| *m != Mat4::IDENTITY));
            assert_ne!(projections[0], projections[3]);
        }
        ShadowProvider::Simple(_) => panic!("expected cascaded shadows"),
    }

    forward.set_shadow_map_resolution(&gpu.device, ShadowResolution::R512).expect("resize");
    record_frame(&gpu, &mut forward, &target, &camera, &mut renderables);

    let error = pollster::block_on(gpu.device.pop_error_scope());
    assert!(error.is_none(), "validation error: {error:?}");
}

#[test]
fn rejects_unsupported_pcf_sample_counts() {
    let Some(gpu) = gpu() else { return };
    let mut forward = forward(&gpu, ShadowMode::Simple);
    assert!(forward.set_pcf_samples(&gpu.queue, 16).is_err());
    assert_eq!(forward.pcf_samples(), 9);
    forward.set_pcf_samples(&gpu.queue, 0).expect("zero disables filtering");
    assert_eq!(forward.pcf_samples(), 0);
}
