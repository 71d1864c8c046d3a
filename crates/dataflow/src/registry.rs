//! Component registry - class name -> factory

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use contracts::{
    Button, ContractError, Distance, ErrorPose, ErrorPosition, ErrorPositionList, ImageData, Matrix3x3,
    Matrix3x4, Matrix4x4, MeasurementValue, Pose, PoseList, Position, Position2D, PositionList, PositionList2,
    Rotation,
};
use ports::{ApplicationPullSink, ApplicationPushSink, ApplicationPushSource, Component, ComponentContext};

/// Builds one component from its context
pub type ComponentFactory =
    Arc<dyn Fn(&ComponentContext) -> Result<Arc<dyn Component>, ContractError> + Send + Sync>;

/// Known component classes
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every application endpoint class
    ///
    /// `ApplicationPushSink*`, `ApplicationPushSource*` and `ApplicationPullSink*`
    /// for every measurement kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_endpoints::<Pose>();
        registry.register_endpoints::<ErrorPose>();
        registry.register_endpoints::<Position>();
        registry.register_endpoints::<Position2D>();
        registry.register_endpoints::<ErrorPosition>();
        registry.register_endpoints::<Rotation>();
        registry.register_endpoints::<PositionList>();
        registry.register_endpoints::<PositionList2>();
        registry.register_endpoints::<ErrorPositionList>();
        registry.register_endpoints::<PoseList>();
        registry.register_endpoints::<Matrix3x3>();
        registry.register_endpoints::<Matrix3x4>();
        registry.register_endpoints::<Matrix4x4>();
        registry.register_endpoints::<Distance>();
        registry.register_endpoints::<Button>();
        registry.register_endpoints::<ImageData>();
        registry
    }

    /// Register the three application endpoints for `T`
    pub fn register_endpoints<T: MeasurementValue>(&mut self) {
        self.register(ApplicationPushSink::<T>::class_name(), |ctx| {
            Ok(ApplicationPushSink::<T>::new(ctx) as Arc<dyn Component>)
        });
        self.register(ApplicationPushSource::<T>::class_name(), |ctx| {
            Ok(ApplicationPushSource::<T>::new(ctx) as Arc<dyn Component>)
        });
        self.register(ApplicationPullSink::<T>::class_name(), |ctx| {
            Ok(ApplicationPullSink::<T>::new(ctx) as Arc<dyn Component>)
        });
    }

    /// Register `factory` under `class`, replacing any previous one
    pub fn register<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ComponentContext) -> Result<Arc<dyn Component>, ContractError> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
    }

    /// Whether `class` is known
    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Instantiate `class`
    pub fn create(&self, class: &str, ctx: &ComponentContext) -> Result<Arc<dyn Component>, ContractError> {
        let factory = self
            .factories
            .get(class)
            .ok_or_else(|| ContractError::UnknownClass {
                class: class.to_string(),
            })?;
        factory(ctx)
    }

    /// Registered class names, sorted
    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("classes", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher::{EventQueue, PolicyRegistry};

    fn context(name: &str) -> ComponentContext {
        ComponentContext::new(
            name.into(),
            Arc::new(EventQueue::new()),
            Arc::new(PolicyRegistry::with_defaults()),
        )
    }

    #[test]
    fn test_builtins_cover_every_kind() {
        let registry = ComponentRegistry::with_builtins();
        assert_eq!(registry.len(), 16 * 3);
        for class in [
            "ApplicationPushSinkPose",
            "ApplicationPushSourceVisionImage",
            "ApplicationPullSinkMatrix4x4",
            "ApplicationPushSinkPosition2DList",
            "ApplicationPushSourceButton",
        ] {
            assert!(registry.contains(class), "{class}");
        }
    }

    #[test]
    fn test_create_names_component_after_context() {
        let registry = ComponentRegistry::with_builtins();
        let component = registry
            .create("ApplicationPushSinkPose", &context("viewer"))
            .unwrap();
        assert_eq!(component.name(), "viewer");
        assert_eq!(component.class(), "ApplicationPushSinkPose");
        assert!(component.input("Input").is_some());
    }

    #[test]
    fn test_unknown_class() {
        let registry = ComponentRegistry::with_builtins();
        let err = registry.create("Kalman", &context("k")).err().unwrap();
        assert!(matches!(err, ContractError::UnknownClass { .. }));
    }
}
