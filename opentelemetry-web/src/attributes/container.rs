use super::iter::{Entries, Inherited};
use super::{
    AttributeChangeEvent, AttributeChangeOp, AttributeError, AttributeFilter, AttributeLimits,
    AttributeTree, Attributes, Config,
};
use crate::global::{invoke_guarded, ErrorHandlers};
use crate::{otel_debug, AttributeValue};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(0);

fn unique_name(name: &str) -> String {
    format!(
        "{name}.{}",
        NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed)
    )
}

/// What a container inherits from.
#[derive(Debug)]
pub enum AttributeSource {
    /// A plain map. It is copied into the container and never observed again.
    Attributes(Attributes),
    /// Another container. The new container keeps it alive and follows its
    /// changes.
    Container(AttributeContainer),
}

impl From<Attributes> for AttributeSource {
    fn from(attributes: Attributes) -> Self {
        AttributeSource::Attributes(attributes)
    }
}

impl From<AttributeContainer> for AttributeSource {
    fn from(container: AttributeContainer) -> Self {
        AttributeSource::Container(container)
    }
}

impl From<&AttributeContainer> for AttributeSource {
    fn from(container: &AttributeContainer) -> Self {
        AttributeSource::Container(container.clone())
    }
}

impl<K, V> FromIterator<(K, V)> for AttributeSource
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        AttributeSource::Attributes(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

type Listener = Arc<dyn Fn(&AttributeChangeEvent) + Send + Sync>;

struct ContainerState {
    local: Arc<AttributeTree>,
    deleted: Arc<HashSet<String>>,
    // values a snapshot preserved that its local tree cannot hold
    frozen: Arc<Attributes>,
    source: Option<Inherited>,
    source_listener: Option<ListenerHandle>,
    is_snapshot: bool,
    dropped: u32,
    // bumped on every change so a cache computed concurrently is not stored
    generation: u64,
    cached_size: Option<usize>,
    cached_attributes: Option<Arc<Attributes>>,
}

impl ContainerState {
    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.cached_size = None;
        self.cached_attributes = None;
    }

    /// Invalidates the caches after a local write that changed the number of
    /// visible keys by `delta`. The cached size is carried over when nothing
    /// else changed since `seen` was read.
    fn changed(&mut self, seen: u64, delta: isize) {
        let size = self.cached_size.filter(|_| self.generation == seen);
        self.invalidate();
        self.cached_size = size.and_then(|size| size.checked_add_signed(delta));
    }

    /// Whether `key` resolves through the source rather than locally.
    fn inherits(&self, key: &str) -> bool {
        !self.local.contains_key(key)
            && !self.deleted.contains(key)
            && !self.frozen.contains_key(key)
    }

    fn hide(&mut self, key: &str) {
        Arc::make_mut(&mut self.deleted).insert(key.to_string());
    }

    /// Preserves an inherited value in a snapshot. A local branch in the
    /// way does not lose it: the value is kept aside in `frozen`.
    fn capture(&mut self, key: &str, value: AttributeValue) {
        if self.local.check(key).is_err()
            || Arc::make_mut(&mut self.local)
                .insert(key, value.clone())
                .is_err()
        {
            Arc::make_mut(&mut self.frozen).insert(key.to_string(), value);
        }
    }
}

pub(super) struct ContainerInner {
    id: String,
    limits: AttributeLimits,
    handlers: Arc<dyn ErrorHandlers>,
    state: Mutex<ContainerState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

impl ContainerInner {
    fn state(&self) -> MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = state.source_listener.take() {
            listener.remove();
        }
    }
}

/// Registration returned by [`AttributeContainer::listen`].
///
/// Dropping the handle keeps the listener registered; call
/// [`ListenerHandle::remove`] to unregister it.
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    owner: Weak<ContainerInner>,
}

impl ListenerHandle {
    /// Unregisters the listener. Does nothing if the container is gone.
    pub fn remove(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.listeners().retain(|(id, _)| *id != self.id);
        }
    }
}

/// A hierarchical, observable attribute store.
///
/// Cloning is cheap and yields a handle to the same container. See the
/// [module documentation](super) for the inheritance model.
#[derive(Clone)]
pub struct AttributeContainer {
    inner: Arc<ContainerInner>,
}

impl fmt::Debug for AttributeContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeContainer")
            .field("id", &self.inner.id)
            .finish()
    }
}

/// Creates a container, optionally inheriting from a map or another container.
///
/// A map source is copied; a container source is followed live, exactly like
/// [`AttributeContainer::child`] with `is_snapshot = false`.
pub fn create_attribute_container(
    config: &Config,
    name: &str,
    inherit: Option<AttributeSource>,
) -> AttributeContainer {
    let handlers = config.resolve_error_handlers();
    match inherit {
        None => AttributeContainer::build(
            config.limits,
            handlers,
            unique_name(name),
            None,
            false,
        ),
        Some(AttributeSource::Attributes(attributes)) => {
            let tree = tree_from_map(&attributes, &*handlers);
            AttributeContainer::build(
                config.limits,
                handlers,
                unique_name(name),
                Some(Inherited::Map(Arc::new(tree))),
                false,
            )
        }
        Some(AttributeSource::Container(parent)) => {
            let id = format!("{}<=[{}]", parent.inner.id, unique_name(name));
            AttributeContainer::build(
                config.limits,
                handlers,
                id,
                Some(Inherited::Container(parent)),
                false,
            )
        }
    }
}

/// Creates a container whose inherited view is frozen at creation time.
///
/// Later changes to a container source are not visible through the snapshot.
/// A map source is copied and therefore already frozen.
pub fn create_attribute_snapshot(
    config: &Config,
    name: &str,
    source: AttributeSource,
) -> AttributeContainer {
    let handlers = config.resolve_error_handlers();
    match source {
        AttributeSource::Attributes(attributes) => {
            let tree = tree_from_map(&attributes, &*handlers);
            AttributeContainer::build(
                config.limits,
                handlers,
                unique_name(name),
                Some(Inherited::Map(Arc::new(tree))),
                true,
            )
        }
        AttributeSource::Container(parent) => {
            let id = format!("{}<-@[{}]", parent.inner.id, unique_name(name));
            AttributeContainer::build(
                config.limits,
                handlers,
                id,
                Some(Inherited::Container(parent)),
                true,
            )
        }
    }
}

fn tree_from_map(attributes: &Attributes, handlers: &dyn ErrorHandlers) -> AttributeTree {
    let mut tree = AttributeTree::new();
    for (key, value) in attributes {
        if let Err(err) = tree.insert(key, value.clone()) {
            handlers.attrib_error(&err.to_string(), key, Some(value));
        }
    }
    tree
}

impl AttributeContainer {
    fn build(
        limits: AttributeLimits,
        handlers: Arc<dyn ErrorHandlers>,
        id: String,
        source: Option<Inherited>,
        is_snapshot: bool,
    ) -> Self {
        let parent = match &source {
            Some(Inherited::Container(parent)) => Some(parent.clone()),
            _ => None,
        };
        let container = AttributeContainer {
            inner: Arc::new(ContainerInner {
                id,
                limits,
                handlers,
                state: Mutex::new(ContainerState {
                    local: Arc::new(AttributeTree::new()),
                    deleted: Arc::default(),
                    frozen: Arc::default(),
                    source,
                    source_listener: None,
                    is_snapshot,
                    dropped: 0,
                    generation: 0,
                    cached_size: None,
                    cached_attributes: None,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        };

        if let Some(parent) = parent {
            let child = Arc::downgrade(&container.inner);
            let handle = parent.add_listener(Arc::new(move |event: &AttributeChangeEvent| {
                if let Some(inner) = child.upgrade() {
                    AttributeContainer { inner }.on_source_change(event);
                }
            }));
            container.inner.state().source_listener = Some(handle);
        }

        otel_debug!(
            name: "AttributeContainer.Created",
            id = container.inner.id.clone(),
            snapshot = is_snapshot
        );
        container
    }

    /// Unique identifier. Children embed their parent's id, so the id
    /// describes the lineage: `parent<=[child.N]` for live children and
    /// `parent<-@[child.N]` for snapshots.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Number of `set` calls rejected by the attribute count limit.
    pub fn dropped_attributes(&self) -> u32 {
        self.inner.state().dropped
    }

    /// Number of distinct keys visible through this container.
    pub fn size(&self) -> usize {
        let generation = {
            let state = self.inner.state();
            if let Some(size) = state.cached_size {
                return size;
            }
            state.generation
        };
        let size = self.entries().count();
        let mut state = self.inner.state();
        if state.generation == generation {
            state.cached_size = Some(size);
        }
        size
    }

    /// All visible attributes, flattened to dotted keys.
    ///
    /// The result is cached until the next change to this container or one
    /// of its ancestors.
    pub fn attributes(&self) -> Arc<Attributes> {
        let generation = {
            let state = self.inner.state();
            if let Some(attributes) = &state.cached_attributes {
                return attributes.clone();
            }
            state.generation
        };
        let attributes: Arc<Attributes> =
            Arc::new(self.entries().map(|(k, v, _)| (k, v)).collect());
        let mut state = self.inner.state();
        if state.generation == generation {
            state.cached_attributes = Some(attributes.clone());
        }
        attributes
    }

    /// Resolves `key`: the local value, else the inherited one unless the key
    /// was deleted here.
    pub fn get(&self, key: &str) -> Option<AttributeValue> {
        let source = {
            let state = self.inner.state();
            if let Some(value) = state.local.get(key) {
                return Some(value.clone());
            }
            if state.deleted.contains(key) {
                return None;
            }
            if let Some(value) = state.frozen.get(key) {
                return Some(value.clone());
            }
            state.source.clone()?
        };
        source.get(key)
    }

    /// Whether `key` resolves to a value.
    pub fn has(&self, key: &str) -> bool {
        self.has_with(key, AttributeFilter::Any)
    }

    /// Whether `key` is present in the part of the container selected by
    /// `filter`.
    pub fn has_with(&self, key: &str, filter: AttributeFilter) -> bool {
        let source = {
            let state = self.inner.state();
            match filter {
                AttributeFilter::Local => return state.local.contains_key(key),
                AttributeFilter::LocalOrDeleted => {
                    return state.local.contains_key(key) || state.deleted.contains(key)
                }
                AttributeFilter::Any => {
                    if state.local.contains_key(key) {
                        return true;
                    }
                    if state.deleted.contains(key) {
                        return false;
                    }
                    if state.frozen.contains_key(key) {
                        return true;
                    }
                }
                AttributeFilter::Inherited => {
                    if state.frozen.contains_key(key) {
                        return true;
                    }
                }
            }
            state.source.clone()
        };
        source.is_some_and(|source| source.has(key))
    }

    /// Stores `value` at `key`, returning `false` if it was rejected.
    ///
    /// Strings longer than the configured value length limit are truncated.
    /// Rejections (malformed key, leaf/branch conflict, count limit) are
    /// reported through the configured [`ErrorHandlers`].
    pub fn set(&self, key: &str, value: impl Into<AttributeValue>) -> bool {
        let mut value = value.into();
        if let Some(max_len) = self.inner.limits.attribute_value_length_limit {
            value = value.truncated(max_len as usize);
        }
        let generation = self.inner.state().generation;
        let previous = self.get(key);
        let visible = if previous.is_none() {
            self.size()
        } else {
            0
        };

        let result = {
            let mut state = self.inner.state();
            match state.local.check(key) {
                Err(err) => Err(err),
                Ok(_) if previous.is_none()
                    && visible >= self.inner.limits.attribute_count_limit as usize =>
                {
                    state.dropped = state.dropped.saturating_add(1);
                    otel_debug!(
                        name: "AttributeContainer.CountLimitExceeded",
                        id = self.inner.id.clone(),
                        key = key.to_string(),
                        dropped = state.dropped
                    );
                    Err(AttributeError::CountLimitExceeded {
                        key: key.to_string(),
                        limit: self.inner.limits.attribute_count_limit,
                    })
                }
                Ok(_) => Arc::make_mut(&mut state.local)
                    .insert(key, value.clone())
                    .map(|_| {
                        if state.deleted.contains(key) {
                            Arc::make_mut(&mut state.deleted).remove(key);
                        }
                        state.changed(generation, isize::from(previous.is_none()));
                    }),
            }
        };

        match result {
            Ok(()) => {
                let op = if previous.is_some() {
                    AttributeChangeOp::Set
                } else {
                    AttributeChangeOp::Add
                };
                self.notify(&AttributeChangeEvent::keyed(
                    op,
                    key,
                    Some(value),
                    previous,
                ));
                true
            }
            Err(err) => {
                self.inner
                    .handlers
                    .attrib_error(&err.to_string(), key, Some(&value));
                false
            }
        }
    }

    /// Deletes `key`, hiding any inherited value as well.
    ///
    /// Returns `false`, and records nothing, if the key did not resolve to a
    /// value.
    pub fn del(&self, key: &str) -> bool {
        let generation = self.inner.state().generation;
        let Some(previous) = self.get(key) else {
            return false;
        };
        {
            let mut state = self.inner.state();
            if state.local.contains_key(key) {
                Arc::make_mut(&mut state.local).remove(key);
            }
            state.hide(key);
            state.changed(generation, -1);
        }
        self.notify(&AttributeChangeEvent::keyed(
            AttributeChangeOp::Delete,
            key,
            None,
            Some(previous),
        ));
        true
    }

    /// Removes every attribute and stops inheriting.
    ///
    /// Live children then see an empty parent; snapshots keep the values they
    /// were created with.
    pub fn clear(&self) {
        let cleared: Vec<(String, AttributeValue)> =
            self.entries().map(|(k, v, _)| (k, v)).collect();
        let source_listener = {
            let mut state = self.inner.state();
            state.local = Arc::new(AttributeTree::new());
            state.deleted = Arc::default();
            state.frozen = Arc::default();
            state.source = None;
            state.invalidate();
            state.source_listener.take()
        };
        if let Some(listener) = source_listener {
            listener.remove();
        }
        self.notify(&AttributeChangeEvent::clear(cleared));
    }

    /// Iterates over visible entries: local ones first, then inherited ones,
    /// each tagged with [`AttributeFilter::Local`] or
    /// [`AttributeFilter::Inherited`].
    pub fn entries(&self) -> Entries {
        let state = self.inner.state();
        Entries::new(
            state.local.clone(),
            state.deleted.clone(),
            state.frozen.clone(),
            state.source.clone(),
        )
    }

    /// Iterates over visible keys.
    pub fn keys(&self) -> impl Iterator<Item = String> + Send {
        self.entries().map(|(k, _, _)| k)
    }

    /// Iterates over visible values.
    pub fn values(&self) -> impl Iterator<Item = AttributeValue> + Send {
        self.entries().map(|(_, v, _)| v)
    }

    /// Calls `f` for every visible entry.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &AttributeValue, AttributeFilter),
    {
        for (key, value, origin) in self.entries() {
            f(&key, &value, origin);
        }
    }

    /// Creates a child container inheriting from this one.
    ///
    /// A live child (`is_snapshot = false`) always reflects this container's
    /// current values. A snapshot child keeps the values visible now, even
    /// if this container changes later. Either way, writes to the child never
    /// affect this container.
    pub fn child(&self, name: &str, is_snapshot: bool) -> AttributeContainer {
        let separator = if is_snapshot { "<-@" } else { "<=" };
        let id = format!("{}{separator}[{}]", self.inner.id, unique_name(name));
        AttributeContainer::build(
            self.inner.limits,
            self.inner.handlers.clone(),
            id,
            Some(Inherited::Container(self.clone())),
            is_snapshot,
        )
    }

    /// Registers `callback` for changes made to this container and for
    /// changes to ancestors that are visible through it.
    ///
    /// Callbacks run after the change is applied, outside any internal lock.
    /// A panicking callback is reported and does not affect other listeners.
    pub fn listen<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&AttributeChangeEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(callback))
    }

    fn add_listener(&self, listener: Listener) -> ListenerHandle {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, listener));
        ListenerHandle {
            id,
            owner: Arc::downgrade(&self.inner),
        }
    }

    fn notify(&self, event: &AttributeChangeEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            invoke_guarded(&*self.inner.handlers, "attribute listener", || {
                listener(event)
            });
        }
    }

    /// Reacts to a change of the source container.
    ///
    /// Live children forward the parts of the change visible through them.
    /// Snapshots keep the value about to be replaced, or hide a key that did
    /// not exist when they were created.
    fn on_source_change(&self, event: &AttributeChangeEvent) {
        let forward = {
            let mut state = self.inner.state();
            if state.source.is_none() {
                return;
            }
            let forward = match (event.op, &event.key) {
                (AttributeChangeOp::Clear, _) => {
                    let affected: Vec<(String, AttributeValue)> = event
                        .cleared
                        .iter()
                        .filter(|(key, _)| state.inherits(key))
                        .cloned()
                        .collect();
                    if affected.is_empty() {
                        None
                    } else if state.is_snapshot {
                        for (key, value) in affected {
                            state.capture(&key, value);
                        }
                        None
                    } else {
                        Some(AttributeChangeEvent::clear(affected))
                    }
                }
                (_, Some(key)) if state.inherits(key) => {
                    if state.is_snapshot {
                        match &event.previous {
                            Some(previous) => state.capture(key, previous.clone()),
                            None => state.hide(key),
                        }
                        None
                    } else {
                        Some(event.clone())
                    }
                }
                _ => None,
            };
            state.invalidate();
            forward
        };

        if let Some(event) = forward {
            self.notify(&event);
        }
    }
}
