// system.rs - Per-frame logic run by EcsScene::update

use crate::ecs::{Component, EcsScene, PostFrameQueue, Query, QueryFilter, QueryFn, SceneError};
use std::fmt;

/// Logic executed once per `EcsScene::update`, in registration order.
pub trait System {
    /// Name used for profiling and logs.
    fn name(&self) -> &str;

    fn execute(&mut self, scene: &mut EcsScene) -> Result<(), SceneError>;
}

/// A reusable filter bound to a per-entity callback.
///
/// Visits every entity carrying all components of `Q` plus the filter's
/// extra includes and none of its excludes. `Disabled` entities are
/// skipped unless the filter says otherwise. The callback is called as
/// `action(queue, entity, &mut c1, ..)` and can use the scene's post-frame
/// queue for structural changes.
pub struct QuerySystem<Q: Query> {
    name: String,
    filter: QueryFilter,
    action: Box<dyn QueryFn<PostFrameQueue, Q>>,
}

impl<Q: Query> QuerySystem<Q> {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: QueryFn<PostFrameQueue, Q> + 'static,
    {
        Self {
            name: name.into(),
            filter: QueryFilter::new(),
            action: Box::new(action),
        }
    }

    pub fn must_include<T: Component>(mut self) -> Self {
        self.filter.must_include::<T>();
        self
    }

    pub fn must_exclude<T: Component>(mut self) -> Self {
        self.filter.must_exclude::<T>();
        self
    }

    /// Visit `Disabled` entities as well.
    pub fn include_disabled(mut self) -> Self {
        self.filter.set_exclude_disabled(false);
        self
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut QueryFilter {
        &mut self.filter
    }
}

impl<Q: Query> System for QuerySystem<Q> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, scene: &mut EcsScene) -> Result<(), SceneError> {
        scene.run_filtered_queued::<Q, _>(&self.filter, self.action.as_mut());
        Ok(())
    }
}

impl<Q: Query> fmt::Debug for QuerySystem<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySystem")
            .field("name", &self.name)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// System backed by a closure over the whole scene.
pub struct FnSystem<F> {
    name: String,
    run: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut EcsScene) -> Result<(), SceneError>,
{
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut EcsScene) -> Result<(), SceneError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, scene: &mut EcsScene) -> Result<(), SceneError> {
        (self.run)(scene)
    }
}
