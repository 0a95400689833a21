use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Application-wide key/value state shared by every request.
///
/// Cloning is cheap and yields a handle to the same map. All access goes through
/// one lock, which is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|value| serde_json::from_value(value).ok())
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write().insert(key.into(), value.into())
    }

    /// Atomically reads and modifies `key`. A missing key is seen as `null`.
    ///
    /// ```rust
    /// # use vireo::state::Store;
    /// let store = Store::new();
    /// store.set("hits", 0);
    /// let now = store.update("hits", |hits| {
    ///     *hits = (hits.as_i64().unwrap_or(0) + 1).into();
    ///     hits.clone()
    /// });
    /// assert_eq!(now, 1);
    /// ```
    pub fn update<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(&mut Value) -> R,
    {
        let mut map = self.write();
        f(map.entry(key.to_string()).or_insert(Value::Null))
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// A point-in-time copy of every entry.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.read().clone()
    }

    /// Copies entries from `other` whose keys are absent here; existing keys keep their value.
    pub(crate) fn merge_absent(&self, other: &Store) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let incoming = other.snapshot();
        let mut map = self.write();
        for (key, value) in incoming {
            map.entry(key).or_insert(value);
        }
    }
}

/// Named values and callables attached to every request context.
///
/// Decorations are written during the build phase only and read-only afterwards.
#[derive(Default, Debug, Clone)]
pub struct Decorations {
    data: Arc<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Decorations {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) {
        Arc::make_mut(&mut self.data).insert(name.into(), Arc::new(value));
    }

    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.data.get(name).and_then(|value| (**value).downcast_ref::<T>())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Adds decorations from `other` whose names are absent here.
    pub(crate) fn merge_absent(&mut self, other: &Decorations) {
        let data = Arc::make_mut(&mut self.data);
        for (name, value) in other.data.iter() {
            data.entry(name.clone()).or_insert_with(|| Arc::clone(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_and_typed_get() {
        let store = Store::new();
        assert_eq!(store.set("version", 1), None);
        assert_eq!(store.set("version", 2), Some(json!(1)));
        assert_eq!(store.get_as::<u32>("version"), Some(2));
        assert!(store.contains("version"));
        assert_eq!(store.remove("version"), Some(json!(2)));
        assert!(store.is_empty());
    }

    #[test]
    fn merge_keeps_existing_entries() {
        let parent = Store::new();
        parent.set("version", "parent");
        let plugin = Store::new();
        plugin.set("version", "plugin");
        plugin.set("plugin-version", 1);

        parent.merge_absent(&plugin);
        assert_eq!(parent.get("version"), Some(json!("parent")));
        assert_eq!(parent.get("plugin-version"), Some(json!(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_not_lost() {
        let store = Store::new();
        store.set("counter", 0);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        store.update("counter", |value| {
                            *value = json!(value.as_i64().unwrap_or(0) + 1);
                        });
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.get("counter"), Some(json!(1600)));
    }

    #[test]
    fn decorations_are_typed_by_name() {
        fn greet(name: &str) -> String {
            format!("hi {name}")
        }

        let mut decorations = Decorations::new();
        decorations.insert("greet", greet as fn(&str) -> String);
        decorations.insert("limit", 10usize);

        let greet = decorations.get::<fn(&str) -> String>("greet").unwrap();
        assert_eq!(greet("ann"), "hi ann");
        assert_eq!(decorations.get::<usize>("limit"), Some(&10));
        assert!(decorations.get::<String>("limit").is_none());
    }

    #[test]
    fn decoration_merge_is_first_writer_wins() {
        let mut parent = Decorations::new();
        parent.insert("name", "parent");
        let mut plugin = Decorations::new();
        plugin.insert("name", "plugin");
        plugin.insert("extra", 1u8);

        parent.merge_absent(&plugin);
        assert_eq!(parent.get::<&str>("name"), Some(&"parent"));
        assert_eq!(parent.get::<u8>("extra"), Some(&1));
    }
}
