use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use stagegraph::layers::View;
use stagegraph::prelude::*;
use stagegraph::scene::Node;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type DrawLog = Rc<RefCell<Vec<&'static str>>>;

/// Records its name every time it is drawn.
struct Marker {
    name: &'static str,
    log: DrawLog,
}

impl Renderable for Marker {
    fn render(&mut self, _ctx: &mut RenderContext<'_>, _node: &Node) {
        self.log.borrow_mut().push(self.name);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct Fixture {
    scene: Scene,
    stage: NodeId,
    log: DrawLog,
    renderer: Renderer,
}

impl Fixture {
    fn new() -> Self {
        init_logger();
        let mut scene = Scene::new();
        let stage = scene.create_stage();
        Self {
            scene,
            stage,
            log: DrawLog::default(),
            renderer: Renderer::new(RendererSettings::default(), CommandRecorder::default()),
        }
    }

    fn marker(&mut self, parent: NodeId, name: &'static str) -> NodeId {
        let node = self.scene.create_node_with(Box::new(Marker {
            name,
            log: self.log.clone(),
        }));
        self.scene.add_child(parent, node).unwrap();
        node
    }

    fn frame(&mut self) -> Vec<&'static str> {
        self.log.borrow_mut().clear();
        self.renderer.render(&mut self.scene, self.stage).unwrap();
        self.log.borrow().clone()
    }
}

#[test]
fn test_views_follow_z_index_not_tree() {
    let mut f = Fixture::new();
    let group = f.scene.create_group(Group::new(0, true));
    let layer_node = f.marker(f.stage, "layer");
    let layer = f.scene.create_layer(layer_node, Some(group)).unwrap();
    f.scene.register_layer(f.stage, layer).unwrap();

    let container = f.marker(f.stage, "container");
    let a = f.marker(container, "a");
    let b = f.marker(container, "b");
    let c = f.marker(container, "c");
    for (node, z) in [(a, 3), (b, 1), (c, 2)] {
        f.scene.set_parent_group(node, Some(group)).unwrap();
        f.scene.set_z_index(node, z).unwrap();
    }

    // The layer node comes first in the tree, so its views draw before the
    // container even though they are the container's children.
    assert_eq!(f.frame(), vec!["b", "c", "a", "layer", "container"]);

    f.scene.set_z_index(a, 0).unwrap();
    assert_eq!(f.frame(), vec!["a", "b", "c", "layer", "container"]);
}

#[test]
fn test_equal_keys_keep_tree_order() {
    let mut f = Fixture::new();
    let group = f.scene.create_group(Group::new(0, true));
    let names = ["n0", "n1", "n2", "n3", "n4"];
    let mut nodes = Vec::new();
    for name in names {
        let node = f.marker(f.stage, name);
        f.scene.set_parent_group(node, Some(group)).unwrap();
        nodes.push(node);
    }
    let layer_node = f.scene.create_node();
    f.scene.add_child(f.stage, layer_node).unwrap();
    let layer = f.scene.create_layer(layer_node, Some(group)).unwrap();
    f.scene.register_layer(f.stage, layer).unwrap();

    let first = f.frame();
    for _ in 0..3 {
        assert_eq!(f.frame(), first);
    }
    assert_eq!(first, names.to_vec());
}

#[test]
fn test_sort_hook_orders_by_computed_z_order() {
    let mut f = Fixture::new();
    let group = f.scene.create_group(Group::with_sort_hook(0, |view: &mut View| {
        // Later nodes in the tree get a higher z_order and so draw first.
        view.z_order = view.tree_order() as f32;
    }));
    let layer_node = f.scene.create_node();
    f.scene.add_child(f.stage, layer_node).unwrap();
    let layer = f.scene.create_layer(layer_node, Some(group)).unwrap();
    f.scene.register_layer(f.stage, layer).unwrap();

    for name in ["x", "y", "z"] {
        let node = f.marker(f.stage, name);
        f.scene.set_parent_group(node, Some(group)).unwrap();
    }
    assert_eq!(f.frame(), vec!["z", "y", "x"]);
}

#[test]
fn test_hidden_view_is_skipped() {
    let mut f = Fixture::new();
    let group = f.scene.create_group(Group::new(0, true));
    let layer_node = f.marker(f.stage, "layer");
    let layer = f.scene.create_layer(layer_node, Some(group)).unwrap();
    f.scene.register_layer(f.stage, layer).unwrap();

    let a = f.marker(f.stage, "a");
    let b = f.marker(f.stage, "b");
    f.scene.set_parent_group(a, Some(group)).unwrap();
    f.scene.set_parent_group(b, Some(group)).unwrap();
    f.scene.set_visible(a, false).unwrap();

    assert_eq!(f.frame(), vec!["b", "layer"]);
    f.scene.set_visible(a, true).unwrap();
    assert_eq!(f.frame(), vec!["a", "b", "layer"]);
}

#[test]
fn test_unregistered_layer_releases_views() {
    let mut f = Fixture::new();
    let group = f.scene.create_group(Group::new(0, true));
    let a = f.marker(f.stage, "a");
    let layer_node = f.marker(f.stage, "layer");
    let layer = f.scene.create_layer(layer_node, Some(group)).unwrap();
    f.scene.register_layer(f.stage, layer).unwrap();
    f.scene.set_parent_group(a, Some(group)).unwrap();
    f.scene.set_z_index(a, 5).unwrap();

    assert_eq!(f.frame(), vec!["a", "layer"]);
    assert_eq!(f.scene.node(a).unwrap().view().active_parent_layer(), Some(layer));

    assert!(f.scene.unregister_layer(f.stage, layer).unwrap());
    // Without an active layer the group's views draw in tree order again.
    assert_eq!(f.frame(), vec!["a", "layer"]);
    assert_eq!(f.scene.node(a).unwrap().view().active_parent_layer(), None);
}

#[test]
fn test_display_orders_match_draw_order() {
    let mut f = Fixture::new();
    let group = f.scene.create_group(Group::new(0, true));
    let layer_node = f.marker(f.stage, "layer");
    let layer = f.scene.create_layer(layer_node, Some(group)).unwrap();
    f.scene.register_layer(f.stage, layer).unwrap();
    let a = f.marker(f.stage, "a");
    let b = f.marker(f.stage, "b");
    f.scene.set_parent_group(a, Some(group)).unwrap();
    f.scene.set_parent_group(b, Some(group)).unwrap();
    f.scene.set_z_index(a, 1).unwrap();

    f.frame();
    let view = |id| f.scene.node(id).unwrap().view().clone();
    assert_eq!(view(b).layer_order(), 1);
    assert_eq!(view(a).layer_order(), 2);
    assert!(view(layer_node).display_order() < view(b).display_order());
    assert!(view(b).display_order() < view(a).display_order());
    let sorted = f.scene.layer(layer).unwrap().sorted_views().to_vec();
    assert_eq!(sorted, vec![b, a]);
}
