//! Component registry: selects implementations by dotted configuration path.
//!
//! A path such as `"models.vision.LeNet"` splits at its final `.` into a
//! module (`models.vision`) and a name (`LeNet`). Factories are registered at
//! startup; resolution never caches, so every `build` constructs a fresh
//! instance.

use crate::config::{ComponentConfig, Kwargs};
use crate::error::ResolveError;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// Constructor for a registered component.
///
/// `A` is an argument injected by the caller alongside the configured kwargs
/// (the composed transform for datasets, `()` for everything else).
pub type Factory<A, T> = Box<dyn Fn(A, &Kwargs) -> Result<T, ResolveError> + Send + Sync>;

/// Split `"module.path.Name"` into `("module.path", "Name")`.
pub fn split_path(path: &str) -> Result<(&str, &str), ResolveError> {
    match path.rsplit_once('.') {
        Some((module, name)) if !module.is_empty() && !name.is_empty() => Ok((module, name)),
        _ => Err(ResolveError::MalformedPath {
            path: path.to_string(),
        }),
    }
}

/// Deserialize kwargs into a component's argument struct.
pub fn parse_kwargs<T: DeserializeOwned>(component: &str, kwargs: &Kwargs) -> Result<T, ResolveError> {
    serde_json::from_value(serde_json::Value::Object(kwargs.clone())).map_err(|source| {
        ResolveError::InvalidKwargs {
            component: component.to_string(),
            source,
        }
    })
}

/// Named factories grouped by module.
pub struct ComponentRegistry<A, T> {
    kind: &'static str,
    modules: HashMap<String, HashMap<String, Factory<A, T>>>,
}

impl<A, T> ComponentRegistry<A, T> {
    /// Empty registry; `kind` names the component family in log lines.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            modules: HashMap::new(),
        }
    }

    /// Register a factory under a dotted path.
    pub fn register<F>(&mut self, path: &str, factory: F) -> Result<(), ResolveError>
    where
        F: Fn(A, &Kwargs) -> Result<T, ResolveError> + Send + Sync + 'static,
    {
        let (module, name) = split_path(path)?;
        let entries = self.modules.entry(module.to_string()).or_default();
        if entries.contains_key(name) {
            return Err(ResolveError::AlreadyRegistered {
                path: path.to_string(),
            });
        }
        debug!(kind = self.kind, component = %path, "Registering component");
        entries.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    /// Look up the factory for a dotted path.
    pub fn resolve(&self, path: &str) -> Result<&Factory<A, T>, ResolveError> {
        let (module, name) = split_path(path)?;
        let entries = self
            .modules
            .get(module)
            .ok_or_else(|| ResolveError::ModuleNotFound {
                module: module.to_string(),
            })?;
        entries
            .get(name)
            .ok_or_else(|| ResolveError::AttributeNotFound {
                module: module.to_string(),
                name: name.to_string(),
            })
    }

    /// Resolve `path` and construct it with `arg` and `kwargs`.
    pub fn build_with(&self, path: &str, arg: A, kwargs: &Kwargs) -> Result<T, ResolveError> {
        let factory = self.resolve(path)?;
        debug!(kind = self.kind, component = %path, "Constructing component");
        factory(arg, kwargs)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// All registered paths, sorted.
    pub fn list_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .modules
            .iter()
            .flat_map(|(module, entries)| entries.keys().map(move |name| format!("{module}.{name}")))
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> ComponentRegistry<(), T> {
    /// Construct a component described by a `{type, kwargs}` config entry.
    pub fn build(&self, config: &ComponentConfig) -> Result<T, ResolveError> {
        self.build_with(&config.type_name, (), &config.kwargs)
    }
}
