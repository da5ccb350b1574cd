use stagegraph::prelude::*;

fn checker(size: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            pixels.extend_from_slice(if (x / 4 + y / 4) % 2 == 0 { &a } else { &b });
        }
    }
    pixels
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let gpu = GpuContext::new_headless()?;
    let mut backend = WgpuBackend::new(
        gpu.device.clone(),
        gpu.queue.clone(),
        wgpu::TextureFormat::Rgba8Unorm,
    );

    let red = BaseTexture::new(TextureId(0), 32, 32);
    let blue = BaseTexture::new(TextureId(1), 32, 32);
    backend.upload_texture(&red, &checker(32, [230, 60, 60, 255], [120, 20, 20, 255]))?;
    backend.upload_texture(&blue, &checker(32, [60, 90, 230, 255], [20, 30, 120, 255]))?;

    let mut scene = Scene::new();
    let stage = scene.create_stage();
    for i in 0..10 {
        let base = if i % 2 == 0 { red } else { blue };
        let mode = if i >= 6 { BlendMode::Add } else { BlendMode::Normal };
        let sprite = scene.create_node_with(Box::new(
            SpriteObject::new(Texture::new(base))
                .with_anchor(0.5, 0.5)
                .with_blend_mode(mode),
        ));
        scene.add_child(stage, sprite)?;
        scene.set_position(sprite, 40.0 + i as f32 * 24.0, 120.0)?;
        scene.set_rotation(sprite, i as f32 * 9.0)?;
    }

    let settings = RendererSettings::default()
        .size(320, 240)
        .background_color([0.1, 0.1, 0.15, 1.0]);
    let mut renderer = Renderer::new(settings, backend);
    for _ in 0..3 {
        renderer.render(&mut scene, stage)?;
    }

    if let Some(target) = renderer.sink().target() {
        println!("rendered into a {}x{} offscreen target", target.width, target.height);
    }
    Ok(())
}
