#![forbid(unsafe_code)]

//! Component resource resolution.
//!
//! A component node names a resource id. [`resolve`] looks it up in order:
//!
//! 1. the handler's own [`Handler::resources`] map;
//! 2. the `resources` declared on the enclosing window or dialog;
//! 3. [`Handler::get_resource`], which may compute a description from the
//!    component's params;
//! 4. the thread-local [`ComponentRegistry`].
//!
//! Results are never cached: every slot rebuild resolves again.
//!
//! [`Handler::resources`]: crate::handler::Handler::resources
//! [`Handler::get_resource`]: crate::handler::Handler::get_resource

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use weft_core::{Description, Params};

use crate::error::ResourceNotFoundError;
use crate::handler::{HandlerRef, ResourceMap};

/// Resolve the component `id` for `handler`.
pub fn resolve(
    id: &str,
    params: &Params,
    handler: &HandlerRef,
    window_resources: &ResourceMap,
) -> Result<Description, ResourceNotFoundError> {
    if let Ok(handler) = handler.try_borrow() {
        if let Some(found) = handler.resources().and_then(|r| r.get(id)) {
            return Ok(found.clone());
        }
        if let Some(found) = window_resources.get(id) {
            return Ok(found.clone());
        }
        if let Some(found) = handler.get_resource(id, params) {
            return Ok(found);
        }
    } else {
        tracing::warn!(resource = id, "handler busy, skipping handler resources");
        if let Some(found) = window_resources.get(id) {
            return Ok(found.clone());
        }
    }
    ComponentRegistry::get(id).ok_or_else(|| ResourceNotFoundError { id: id.to_owned() })
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

thread_local! {
    static COMPONENTS: RefCell<AHashMap<String, Rc<Description>>> =
        RefCell::new(AHashMap::new());
}

/// Globally registered component descriptions for the current UI thread.
pub struct ComponentRegistry;

impl ComponentRegistry {
    /// Register `description` under `id`, returning the entry it replaced.
    pub fn register(id: impl Into<String>, description: Description) -> Option<Description> {
        COMPONENTS.with(|c| {
            c.borrow_mut()
                .insert(id.into(), Rc::new(description))
                .map(|old| (*old).clone())
        })
    }

    /// Register `description` for the lifetime of the returned guard.
    ///
    /// Dropping the guard restores whatever `id` mapped to before.
    #[must_use = "the registration is removed when the guard drops"]
    pub fn register_scoped(id: impl Into<String>, description: Description) -> Registration {
        let id = id.into();
        let previous = Self::register(id.clone(), description);
        Registration { id, previous }
    }

    pub fn unregister(id: &str) -> bool {
        COMPONENTS.with(|c| c.borrow_mut().remove(id).is_some())
    }

    #[must_use]
    pub fn get(id: &str) -> Option<Description> {
        COMPONENTS.with(|c| c.borrow().get(id).map(|d| (**d).clone()))
    }

    #[must_use]
    pub fn contains(id: &str) -> bool {
        COMPONENTS.with(|c| c.borrow().contains_key(id))
    }

    pub fn clear() {
        COMPONENTS.with(|c| c.borrow_mut().clear());
    }
}

/// RAII registration returned by [`ComponentRegistry::register_scoped`].
#[derive(Debug)]
pub struct Registration {
    id: String,
    previous: Option<Description>,
}

impl Registration {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                ComponentRegistry::register(self.id.clone(), previous);
            }
            None => {
                ComponentRegistry::unregister(&self.id);
            }
        }
    }
}
