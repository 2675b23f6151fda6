use catalog::ContentProcessor;
use scene::SceneGraph;

/// A named group of scene content the viewer can show, hide or tear down.
pub trait Layer {
    fn key(&self) -> &str;

    fn is_visible(&self) -> bool;

    fn set_visible(&mut self, scene: &mut dyn SceneGraph, visible: bool);

    /// Destroys everything the layer put in the scene.
    fn clear(&mut self, scene: &mut dyn SceneGraph, processor: &mut ContentProcessor);
}
