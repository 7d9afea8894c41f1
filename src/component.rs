//! Objects that take part in bulk flushes

use crate::service::SaveService;
use std::sync::Arc;

/// An object that writes its state into the service and restores it from there
///
/// `save` and `load` receive the service handle and are expected to call
/// [`SaveService::save`] and [`SaveService::load`] under [`save_key`].
///
/// [`save_key`]: SaveableComponent::save_key
///
/// # Example
///
/// ```
/// use savestate::{SaveService, SaveableComponent};
/// use std::sync::Mutex;
///
/// struct Volume(Mutex<f32>);
///
/// impl SaveableComponent for Volume {
///     fn save_key(&self) -> &str {
///         "volume"
///     }
///
///     fn save(&self, service: &SaveService) {
///         service.save(self.save_key(), &*self.0.lock().unwrap());
///     }
///
///     fn load(&self, service: &SaveService) {
///         *self.0.lock().unwrap() = service.load(self.save_key(), 1.0);
///     }
/// }
/// ```
pub trait SaveableComponent: Send + Sync {
    fn save_key(&self) -> &str;

    /// Push state during every bulk flush and on unregistration
    fn auto_save(&self) -> bool {
        true
    }

    /// Pull state as soon as the component registers
    fn auto_load(&self) -> bool {
        true
    }

    fn save(&self, service: &SaveService);

    fn load(&self, service: &SaveService);
}

/// Set of registered components, deduplicated by identity
#[derive(Default)]
pub(crate) struct ComponentRegistry {
    components: Vec<Arc<dyn SaveableComponent>>,
}

fn same(a: &Arc<dyn SaveableComponent>, b: &Arc<dyn SaveableComponent>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ComponentRegistry {
    /// Returns false when the component was already registered
    pub(crate) fn insert(&mut self, component: Arc<dyn SaveableComponent>) -> bool {
        if self.components.iter().any(|c| same(c, &component)) {
            return false;
        }
        self.components.push(component);
        true
    }

    /// Returns false when the component was not registered
    pub(crate) fn remove(&mut self, component: &Arc<dyn SaveableComponent>) -> bool {
        let before = self.components.len();
        self.components.retain(|c| !same(c, component));
        self.components.len() != before
    }

    /// Components that want to be flushed, cloned out so no lock is held while they run
    pub(crate) fn auto_savers(&self) -> Vec<Arc<dyn SaveableComponent>> {
        self.components
            .iter()
            .filter(|c| c.auto_save())
            .cloned()
            .collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn SaveableComponent>> {
        std::mem::take(&mut self.components)
    }

    pub(crate) fn len(&self) -> usize {
        self.components.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        key: &'static str,
        auto_save: bool,
    }

    impl SaveableComponent for Dummy {
        fn save_key(&self) -> &str {
            self.key
        }

        fn auto_save(&self) -> bool {
            self.auto_save
        }

        fn save(&self, _service: &SaveService) {}

        fn load(&self, _service: &SaveService) {}
    }

    #[test]
    fn identity_not_key_decides_duplicates() {
        let mut registry = ComponentRegistry::default();
        let a: Arc<dyn SaveableComponent> = Arc::new(Dummy { key: "same", auto_save: true });
        let b: Arc<dyn SaveableComponent> = Arc::new(Dummy { key: "same", auto_save: false });

        assert!(registry.insert(a.clone()));
        assert!(!registry.insert(a.clone()));
        assert!(registry.insert(b.clone()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.auto_savers().len(), 1);

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.drain().len(), 1);
        assert_eq!(registry.len(), 0);
    }
}
