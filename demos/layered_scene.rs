use std::any::Any;

use stagegraph::prelude::*;
use stagegraph::scene::Node;

/// Prints the node it belongs to when drawn.
struct Label(&'static str);

impl Renderable for Label {
    fn render(&mut self, _ctx: &mut RenderContext<'_>, node: &Node) {
        let view = node.view();
        println!(
            "  {:<8} z_index {:>2}  tree {:>2}  display {:>2}",
            self.0,
            view.z_index,
            view.tree_order(),
            view.display_order()
        );
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut scene = Scene::new();
    let stage = scene.create_stage();

    // Shadows of every unit draw below all units, whatever their position
    // in the tree.
    let shadows = scene.create_group(Group::new(-1, false));
    let units = scene.create_group(Group::new(0, true));

    let shadow_layer = scene.create_node_with(Box::new(Label("shadows")));
    let unit_layer = scene.create_node_with(Box::new(Label("units")));
    scene.add_child(stage, shadow_layer)?;
    scene.add_child(stage, unit_layer)?;
    let layer = scene.create_layer(shadow_layer, Some(shadows))?;
    scene.register_layer(stage, layer)?;
    let layer = scene.create_layer(unit_layer, Some(units))?;
    scene.register_layer(stage, layer)?;

    let names = ["knight", "archer", "wizard"];
    let mut bodies = Vec::new();
    for (i, name) in names.into_iter().enumerate() {
        let unit = scene.create_node();
        scene.add_child(stage, unit)?;

        let shadow = scene.create_node_with(Box::new(Label("shadow")));
        scene.add_child(unit, shadow)?;
        scene.set_parent_group(shadow, Some(shadows))?;

        let body = scene.create_node_with(Box::new(Label(name)));
        scene.add_child(unit, body)?;
        scene.set_parent_group(body, Some(units))?;
        scene.set_z_index(body, (names.len() - i) as i32)?;
        bodies.push(body);
    }

    let mut renderer = Renderer::new(RendererSettings::default(), CommandRecorder::default());
    println!("frame 0");
    renderer.render(&mut scene, stage)?;

    // Bring the knight to the front.
    scene.set_z_index(bodies[0], 10)?;
    println!("frame 1");
    renderer.render(&mut scene, stage)?;

    Ok(())
}
