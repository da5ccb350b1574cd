use stagegraph::prelude::*;
use stagegraph::renderer::GpuCommand;

fn main() -> Result<()> {
    env_logger::init();

    let mut scene = Scene::new();
    let stage = scene.create_stage();

    // A row of cards, each holding an icon that spins with its card
    let mut cards = Vec::new();
    for i in 0..8 {
        let card = scene.create_node_with(Box::new(
            SpriteObject::new(Texture::new(BaseTexture::new(TextureId(i % 3), 64, 64)))
                .with_anchor(0.5, 0.5),
        ));
        scene.add_child(stage, card)?;
        scene.set_position(card, 60.0 + i as f32 * 80.0, 300.0)?;

        let icon = scene.create_node_with(Box::new(SpriteObject::new(Texture::new(
            BaseTexture::new(TextureId(10), 16, 16),
        ))));
        scene.add_child(card, icon)?;
        scene.set_tint(icon, [1.0, 0.8, 0.2, 1.0])?;
        cards.push(card);
    }

    let mut renderer = Renderer::new(
        RendererSettings::default().background_color([0.08, 0.08, 0.12, 1.0]),
        CommandRecorder::new(4),
    );

    for frame in 0..3 {
        for (i, &card) in cards.iter().enumerate() {
            scene.set_rotation(card, (frame * 10 + i) as f32)?;
        }
        renderer.sink_mut().clear();
        renderer.render(&mut scene, stage)?;

        let uploads = renderer
            .sink()
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::UploadVertices { .. }))
            .count();
        println!(
            "frame {}: {} draw calls, {} vertex uploads",
            frame,
            renderer.sink().draw_calls().len(),
            uploads
        );
    }

    Ok(())
}
