//! Provides a tiny DI like container which keeps the process-wide components.
//!
//! The platform is essentially a typed map of `Arc<T>` singletons - the
//! config, the group registry, the HTTP pool - plus the central `is_running`
//! flag which is toggled to *false* once [Platform::terminate] is invoked.
//!
//! Components which are known to be installed can be fetched via
//! [Platform::require]. Code which might run during shutdown should prefer
//! [Platform::find] and handle the **None** gracefully, as terminating the
//! platform drops all components.
//!
//! # Examples
//! ```
//! # use std::sync::Arc;
//! # use callisto::platform::Platform;
//! struct Service {
//!     value: i32,
//! }
//!
//! let platform = Platform::new();
//! platform.register::<Service>(Arc::new(Service { value: 42 }));
//!
//! assert_eq!(platform.require::<Service>().value, 42);
//! assert_eq!(platform.is_running(), true);
//!
//! // Once terminated, all components are released so that their Drop
//! // handlers run...
//! platform.terminate();
//! assert_eq!(platform.find::<Service>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Keeps all central components of a cache node in a single place.
pub struct Platform {
    components: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new and empty platform instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            components: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    /// Registers a component under its type.
    ///
    /// Registering a second component of the same type replaces the first.
    pub fn register<T>(&self, component: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .components
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), component);
    }

    /// Tries to resolve a previously registered component.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let components = self.components.lock().unwrap();
        components
            .get(&TypeId::of::<T>())
            .and_then(|component| component.clone().downcast::<T>().ok())
    }

    /// Resolves a previously registered component.
    ///
    /// # Panics
    /// Panics if the requested component isn't available. Note that this also
    /// happens for components which were present before
    /// [terminate](Platform::terminate) was invoked, as a shutdown releases
    /// everything.
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if self.is_running() {
            match self.find::<T>() {
                Some(component) => component,
                None => panic!(
                    "A required component ({}) was not available in the platform!",
                    std::any::type_name::<T>()
                ),
            }
        } else {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            )
        }
    }

    /// Determines if the platform is still running or if
    /// [terminate](Platform::terminate) has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This will immediately release all components (so that their Drop
    /// handlers run eventually) and toggle [is_running](Platform::is_running)
    /// to **false**, which causes all event loops to drain and exit.
    pub fn terminate(&self) {
        self.components.lock().unwrap().clear();
        self.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;
    use std::sync::Arc;

    struct Component {
        value: i32,
    }

    struct UnknownComponent;

    #[test]
    fn components_can_be_registered_and_resolved() {
        let platform = Platform::new();
        platform.register::<Component>(Arc::new(Component { value: 42 }));

        assert_eq!(platform.require::<Component>().value, 42);
        assert_eq!(platform.find::<Component>().unwrap().value, 42);
        assert!(platform.find::<UnknownComponent>().is_none());
    }

    #[test]
    #[should_panic(expected = "was not available")]
    fn requiring_an_unknown_component_panics() {
        let platform = Platform::new();
        let _ = platform.require::<UnknownComponent>();
    }

    #[test]
    fn terminating_releases_all_components() {
        let platform = Platform::new();
        platform.register::<Component>(Arc::new(Component { value: 42 }));

        assert!(platform.is_running());
        platform.terminate();

        assert!(!platform.is_running());
        assert!(platform.find::<Component>().is_none());
    }
}
