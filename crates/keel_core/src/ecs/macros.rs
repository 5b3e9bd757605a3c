/// Spawn an entity from a list of component values.
///
/// Expands to an [`EntityBuilder`](crate::ecs::EntityBuilder) chain and
/// evaluates to the `Result` of `EcsScene::spawn`.
///
/// ```ignore
/// let player = spawn!(scene, Position::default(), Health(100))?;
/// ```
#[macro_export]
macro_rules! spawn {
    ($scene:expr $(, $component:expr)+ $(,)?) => {{
        let builder = $crate::ecs::EntityBuilder::new()$(.with($component))+;
        $scene.spawn(builder)
    }};
}
