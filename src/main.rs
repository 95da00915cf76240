use std::rc::Rc;

use glam::{Quat, Vec3};
use indirect_batcher::renderer::{
    cube_mesh, plane_mesh, sphere_mesh, CameraUniform, GpuDevice, PbrParams,
};
use indirect_batcher::{
    BatchRenderer, GpuContext, HostDevice, Material, MaterialRef, MeshRef, ObjectHandle,
    RenderError, RenderServer, ServerSettings, ShaderHandle, Transform,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const OBJECTS: usize = 2000;
const FRAMES: usize = 8;

/// Meshes and materials shared by the demo objects.
struct Palette {
    meshes: Vec<MeshRef>,
    materials: Vec<MaterialRef>,
}

impl Palette {
    fn new(shader: ShaderHandle) -> Self {
        let meshes = vec![
            Rc::new(cube_mesh()),
            Rc::new(sphere_mesh(24, 16)),
            Rc::new(plane_mesh(1.0)),
        ];
        let materials = vec![
            Material::unlit(shader, Vec3::new(0.9, 0.3, 0.2)).into_shared(),
            Material::lambert(shader, Vec3::new(0.2, 0.7, 0.3)).into_shared(),
            Material::pbr(
                shader,
                PbrParams {
                    albedo: Vec3::new(0.8, 0.8, 0.9),
                    metallic: 0.9,
                    roughness: 0.2,
                    emissive: 0.0,
                },
            )
            .into_shared(),
        ];
        Self { meshes, materials }
    }
}

fn spawn<D: GpuDevice>(
    server: &mut RenderServer<D>,
    palette: &Palette,
    rng: &mut SmallRng,
) -> Result<Vec<ObjectHandle>, RenderError> {
    (0..OBJECTS)
        .map(|_| {
            let mesh = &palette.meshes[rng.gen_range(0..palette.meshes.len())];
            let material = &palette.materials[rng.gen_range(0..palette.materials.len())];
            let position = Vec3::new(
                rng.gen_range(-50.0..50.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-50.0..50.0),
            );
            server.create_object_with_transform(mesh, material, Transform::from_translation(position))
        })
        .collect()
}

/// Spins a few objects, swaps meshes on some and retires one per frame.
fn mutate<D: GpuDevice>(
    server: &mut RenderServer<D>,
    palette: &Palette,
    handles: &mut Vec<ObjectHandle>,
    rng: &mut SmallRng,
) -> Result<(), RenderError> {
    for _ in 0..32 {
        let handle = handles[rng.gen_range(0..handles.len())];
        server
            .objects_mut()
            .rotate(handle, Quat::from_rotation_y(rng.gen_range(0.0..1.0)))?;
    }
    for _ in 0..4 {
        let handle = handles[rng.gen_range(0..handles.len())];
        let mesh = &palette.meshes[rng.gen_range(0..palette.meshes.len())];
        server.set_mesh(handle, mesh)?;
    }
    palette.materials[0]
        .borrow_mut()
        .set_color(Vec3::new(rng.gen(), rng.gen(), rng.gen()));

    let retired = handles.swap_remove(rng.gen_range(0..handles.len()));
    server.remove_object(retired)
}

fn run_gpu(context: GpuContext, settings: ServerSettings) -> Result<(), Box<dyn std::error::Error>> {
    let format = wgpu::TextureFormat::Rgba8UnormSrgb;
    let mut renderer = BatchRenderer::new(context, settings, format, WIDTH, HEIGHT)?;
    let shader = renderer.register_default_shader();
    renderer.set_camera(&CameraUniform::look_at(
        Vec3::new(0.0, 40.0, 90.0),
        Vec3::ZERO,
        45f32.to_radians(),
        WIDTH as f32 / HEIGHT as f32,
    ));

    let target = renderer
        .context()
        .device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("OffscreenTarget"),
            size: wgpu::Extent3d {
                width: WIDTH,
                height: HEIGHT,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let palette = Palette::new(shader);
    let mut rng = SmallRng::seed_from_u64(7);
    let mut handles = spawn(renderer.server_mut(), &palette, &mut rng)?;

    for frame in 0..FRAMES {
        let stats = renderer.render(&view)?;
        log::info!("Frame {}: {:?}", frame, stats);
        mutate(renderer.server_mut(), &palette, &mut handles, &mut rng)?;
    }
    Ok(())
}

fn run_host(settings: ServerSettings) -> Result<(), RenderError> {
    let mut server = RenderServer::new(HostDevice::new(), settings)?;
    let palette = Palette::new(ShaderHandle(0));
    let mut rng = SmallRng::seed_from_u64(7);
    let mut handles = spawn(&mut server, &palette, &mut rng)?;

    for frame in 0..FRAMES {
        let stats = server.prepare()?;
        log::info!("Frame {}: {:?}", frame, stats);
        mutate(&mut server, &palette, &mut handles, &mut rng)?;
    }
    log::info!(
        "Host device: {} buffers created, {} growth copies",
        server.device().buffers_created(),
        server.device().copies()
    );
    Ok(())
}

fn main() {
    indirect_batcher::init_logging();
    let settings = ServerSettings::load();

    let result = match GpuContext::new_blocking() {
        Ok(context) => run_gpu(context, settings),
        Err(err) => {
            log::warn!("GPU unavailable ({}), running on the host device", err);
            run_host(settings).map_err(Into::into)
        }
    };

    if let Err(err) = result {
        log::error!("Application error: {}", err);
        eprintln!("Application error: {err}");
    }
}
