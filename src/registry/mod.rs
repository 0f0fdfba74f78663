//! Singleton registry.
//!
//! # Data Flow
//! ```text
//! register(name, init)  ×N   (declared order)
//!     → initialize_all()
//!         init_1(&Resolver{})            → instance_1
//!         init_2(&Resolver{1})           → instance_2
//!         ...
//!     → sealed: get(name) / get_as::<T>(name) for the process lifetime
//! ```
//!
//! # Design Decisions
//! - One explicit registry object, built by startup and shared via Arc;
//!   no global lookup
//! - Initialization order is the registration order, and it is recorded
//! - Initializers only see singletons that finished before them
//! - The first failing initializer halts everything; nothing is readable
//!   from a registry that did not seal
//! - Instances are opaque (`Any`), so new services need no registry changes

mod error;

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

pub use error::{BoxError, RegistryError, SingletonInitError};

/// An initialized, type-erased singleton.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Initializer = Box<dyn FnOnce(&Resolver<'_>) -> Result<Instance, BoxError> + Send>;

/// Read access to the singletons initialized so far, handed to initializers.
pub struct Resolver<'a> {
    instances: &'a HashMap<String, Instance>,
}

impl Resolver<'_> {
    /// Fetch an earlier singleton by name.
    pub fn get(&self, name: &str) -> Result<Instance, RegistryError> {
        self.instances
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotInitialized(name.to_string()))
    }

    /// Fetch an earlier singleton and downcast it.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        downcast(name, self.get(name)?)
    }
}

/// Process-wide table of named subsystems.
#[derive(Default)]
pub struct SingletonRegistry {
    // Initializers are only `Send`; the mutex keeps the registry `Sync`.
    pending: Mutex<Vec<(String, Initializer)>>,
    instances: HashMap<String, Instance>,
    order: Vec<String>,
    sealed: bool,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an initializer under `name`.
    pub fn register<T, E, F>(&mut self, name: impl Into<String>, init: F) -> Result<(), RegistryError>
    where
        T: Any + Send + Sync,
        E: Into<BoxError>,
        F: FnOnce(&Resolver<'_>) -> Result<T, E> + Send + 'static,
    {
        let name = name.into();
        self.check_can_register(&name)?;
        let init: Initializer = Box::new(move |resolver| {
            init(resolver)
                .map(|value| Arc::new(value) as Instance)
                .map_err(Into::into)
        });
        self.pending_mut().push((name, init));
        Ok(())
    }

    /// Queue an already-built value under `name`.
    pub fn register_instance<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        self.check_can_register(&name)?;
        let init: Initializer = Box::new(move |_| Ok(value as Instance));
        self.pending_mut().push((name, init));
        Ok(())
    }

    fn pending_mut(&mut self) -> &mut Vec<(String, Initializer)> {
        self.pending.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_can_register(&mut self, name: &str) -> Result<(), RegistryError> {
        if self.sealed {
            return Err(RegistryError::Sealed(name.to_string()));
        }
        if self.pending_mut().iter().any(|(n, _)| n == name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    /// Run every initializer in registration order.
    ///
    /// Stops at the first failure; the registry then stays unsealed and
    /// `get` keeps failing.
    pub fn initialize_all(&mut self) -> Result<(), SingletonInitError> {
        if self.sealed {
            return Err(SingletonInitError {
                name: "<registry>".to_string(),
                source: Box::new(RegistryError::Sealed("<initialize_all>".to_string())),
            });
        }

        for (name, init) in std::mem::take(self.pending_mut()) {
            let resolver = Resolver {
                instances: &self.instances,
            };
            match init(&resolver) {
                Ok(instance) => {
                    tracing::debug!(singleton = %name, "Singleton initialized");
                    self.instances.insert(name.clone(), instance);
                    self.order.push(name);
                }
                Err(source) => {
                    tracing::error!(singleton = %name, error = %source, "Singleton initialization failed");
                    return Err(SingletonInitError { name, source });
                }
            }
        }

        self.sealed = true;
        tracing::info!(singletons = ?self.order, "Singleton registry initialized");
        Ok(())
    }

    /// Whether `initialize_all` has completed.
    pub fn is_initialized(&self) -> bool {
        self.sealed
    }

    /// Look up a singleton.
    pub fn get(&self, name: &str) -> Result<Instance, RegistryError> {
        if !self.sealed {
            return Err(RegistryError::NotInitialized(name.to_string()));
        }
        self.instances
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    /// Look up a singleton and downcast it to its concrete type.
    pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        downcast(name, self.get(name)?)
    }

    /// Names in initialization order.
    pub fn names(&self) -> &[String] {
        &self.order
    }
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("initialized", &self.order)
            .field("pending", &pending_names(&self.pending))
            .field("sealed", &self.sealed)
            .finish()
    }
}

fn pending_names(pending: &Mutex<Vec<(String, Initializer)>>) -> Vec<String> {
    let pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    pending.iter().map(|(name, _)| name.clone()).collect()
}

fn downcast<T: Any + Send + Sync>(name: &str, instance: Instance) -> Result<Arc<T>, RegistryError> {
    instance
        .downcast::<T>()
        .map_err(|_| RegistryError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Mutex;

    fn recording_registry(calls: Arc<Mutex<Vec<&'static str>>>) -> SingletonRegistry {
        let mut registry = SingletonRegistry::new();
        for name in ["config", "log", "cache", "db"] {
            let calls = calls.clone();
            registry
                .register(name, move |_| {
                    calls.lock().unwrap().push(name);
                    Ok::<_, Infallible>(name.len())
                })
                .unwrap();
        }
        registry
    }

    #[test]
    fn initialization_order_is_reproducible() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        recording_registry(first.clone()).initialize_all().unwrap();
        recording_registry(second.clone()).initialize_all().unwrap();

        let first = first.lock().unwrap().clone();
        assert_eq!(first, vec!["config", "log", "cache", "db"]);
        assert_eq!(first, *second.lock().unwrap());
    }

    #[test]
    fn get_before_initialization_fails() {
        let mut registry = SingletonRegistry::new();
        registry.register_instance("config", Arc::new(1u8)).unwrap();

        assert!(matches!(
            registry.get("config"),
            Err(RegistryError::NotInitialized(_))
        ));

        registry.initialize_all().unwrap();
        assert_eq!(*registry.get_as::<u8>("config").unwrap(), 1);
    }

    #[test]
    fn get_returns_the_same_instance() {
        let mut registry = SingletonRegistry::new();
        registry
            .register("cache", |_| Ok::<_, Infallible>(Mutex::new(Vec::<u32>::new())))
            .unwrap();
        registry.initialize_all().unwrap();

        let a = registry.get_as::<Mutex<Vec<u32>>>("cache").unwrap();
        let b = registry.get_as::<Mutex<Vec<u32>>>("cache").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn later_initializers_see_earlier_ones() {
        let mut registry = SingletonRegistry::new();
        registry.register_instance("config", Arc::new(String::from("data/app.db"))).unwrap();
        registry
            .register("db", |r| {
                let path = r.get_as::<String>("config")?;
                Ok::<_, RegistryError>(format!("opened {}", path))
            })
            .unwrap();
        registry.initialize_all().unwrap();

        assert_eq!(*registry.get_as::<String>("db").unwrap(), "opened data/app.db");
    }

    #[test]
    fn initializer_cannot_see_later_singletons() {
        let mut registry = SingletonRegistry::new();
        registry
            .register("log", |r| r.get_as::<String>("config").map(|_| ()))
            .unwrap();
        registry.register_instance("config", Arc::new(String::new())).unwrap();

        let err = registry.initialize_all().unwrap_err();
        assert_eq!(err.name, "log");
    }

    #[test]
    fn failure_halts_and_keeps_registry_unreadable() {
        let ran_after = Arc::new(Mutex::new(false));
        let flag = ran_after.clone();

        let mut registry = SingletonRegistry::new();
        registry.register_instance("config", Arc::new(())).unwrap();
        registry
            .register("db", |_| Err::<(), _>("disk full"))
            .unwrap();
        registry
            .register("cron", move |_| {
                *flag.lock().unwrap() = true;
                Ok::<_, Infallible>(())
            })
            .unwrap();

        let err = registry.initialize_all().unwrap_err();
        assert_eq!(err.name, "db");
        assert!(!*ran_after.lock().unwrap());
        assert!(registry.get("config").is_err());
    }

    #[test]
    fn duplicate_and_late_registration_rejected() {
        let mut registry = SingletonRegistry::new();
        registry.register_instance("config", Arc::new(())).unwrap();
        assert!(matches!(
            registry.register_instance("config", Arc::new(())),
            Err(RegistryError::Duplicate(_))
        ));

        registry.initialize_all().unwrap();
        assert!(matches!(
            registry.register_instance("extra", Arc::new(())),
            Err(RegistryError::Sealed(_))
        ));
        assert!(registry.initialize_all().is_err());
    }

    #[test]
    fn wrong_type_and_unknown_name() {
        let mut registry = SingletonRegistry::new();
        registry.register_instance("config", Arc::new(5u32)).unwrap();
        registry.initialize_all().unwrap();

        assert!(matches!(
            registry.get_as::<String>("config"),
            Err(RegistryError::TypeMismatch { .. })
        ));
        assert!(matches!(registry.get("nope"), Err(RegistryError::Unknown(_))));
        assert_eq!(registry.names(), ["config".to_string()]);
    }
}
