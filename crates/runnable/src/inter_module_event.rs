//! §3/§4.5/§9: typed pub/sub across modules. A concrete event kind carries
//! its own `static` registry mapping subscribed module identity to a
//! handler closure — "a user-defined subclass of `InterModuleEvent<Self,
//! Args…>` carries a static registry mapping each subscribed module to its
//! per-event handler" (§4.5).
//!
//! Rust has no direct analogue of a class-template static member, so the
//! registry engine lives here as [`InterModuleEventRegistry`] and concrete
//! event kinds declare their own `static` instance of it — the same
//! "static, lock-guarded, process-wide table" shape
//! `labcore_telemetry::metrics` uses for its `lazy_static!` Prometheus
//! registries, just keyed by module identity instead of metric name.
//!
//! Keys are identity (a module's [`ItemId`]), not value, per the design
//! notes: two different modules never collide even if some future module
//! type derives `PartialEq` on its payload.

use std::{collections::HashMap, future::Future, pin::Pin};

use labcore_object::ItemId;
use parking_lot::Mutex;

/// Identity key for a subscribed module. Stable for the module's lifetime
/// (§3: `ItemID`s are never reused within one manager's lifetime).
pub type ModuleKey = ItemId;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A subscribed module's handler for one event kind: `&Self::Handler`
/// bound to the receiving module, boxed so the registry can hold handlers
/// from arbitrarily many distinct module types.
pub type Handler<Args> = Box<dyn Fn(Args) -> BoxFuture + Send + Sync>;

/// The engine behind one concrete inter-module event kind's static
/// registry. `Args` is that event kind's argument tuple/struct, required to
/// be `Clone` since `Invoke` dispatches to at most one handler but the
/// framework cannot know in advance whether a given `owner` is registered.
pub struct InterModuleEventRegistry<Args> {
    listeners: Mutex<HashMap<ModuleKey, Handler<Args>>>,
}

impl<Args> InterModuleEventRegistry<Args> {
    /// `const fn` so a concrete event kind can declare
    /// `static REGISTRY: InterModuleEventRegistry<Args> = InterModuleEventRegistry::new();`
    /// directly, the "static registry" the spec calls for.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// `Register(module, &Self::Handler)`: installs or replaces `module`'s
    /// handler for this event kind.
    pub fn register(&self, module: ModuleKey, handler: Handler<Args>) {
        self.listeners.lock().insert(module, handler);
    }

    /// `Deregister(module)`: removes `module`'s entry, if any. Idempotent.
    pub fn deregister(&self, module: ModuleKey) {
        self.listeners.lock().remove(&module);
    }

    #[must_use]
    pub fn is_registered(&self, module: ModuleKey) -> bool {
        self.listeners.lock().contains_key(&module)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<Args: Clone + Send + 'static> InterModuleEventRegistry<Args> {
    /// `Invoke(instance)`: look up the handler for `owner` and dispatch if
    /// present. A no-op if `owner` never registered (or has since
    /// deregistered) — an unregistered recipient is not an error.
    pub async fn invoke(&self, owner: ModuleKey, args: Args) {
        let future = {
            let listeners = self.listeners.lock();
            listeners.get(&owner).map(|handler| handler(args))
        };
        if let Some(future) = future {
            future.await;
        }
    }
}

impl<Args> Default for InterModuleEventRegistry<Args> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    fn registry() -> &'static InterModuleEventRegistry<i64> {
        static REGISTRY: InterModuleEventRegistry<i64> = InterModuleEventRegistry::new();
        &REGISTRY
    }

    #[tokio::test]
    async fn invoke_dispatches_to_the_registered_owner_only() {
        let registry = registry();
        let received = Arc::new(StdMutex::new(Vec::new()));

        let r2 = Arc::clone(&received);
        registry.register(
            ModuleKey::new(1),
            Box::new(move |value: i64| -> BoxFuture {
                let r2 = Arc::clone(&r2);
                Box::pin(async move { r2.lock().unwrap().push(value) })
            }),
        );

        registry.invoke(ModuleKey::new(1), 7).await;
        registry.invoke(ModuleKey::new(2), 9).await; // unregistered: no-op

        assert_eq!(*received.lock().unwrap(), vec![7]);
        registry.deregister(ModuleKey::new(1));
    }

    #[test]
    fn deregister_removes_the_listener() {
        let registry = registry();
        registry.register(
            ModuleKey::new(3),
            Box::new(|_: i64| -> BoxFuture { Box::pin(async {}) }),
        );
        assert!(registry.is_registered(ModuleKey::new(3)));
        registry.deregister(ModuleKey::new(3));
        assert!(!registry.is_registered(ModuleKey::new(3)));
    }
}
