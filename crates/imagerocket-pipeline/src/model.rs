//! Reactive node configuration.
//!
//! A [`ModelObserver`] wraps a shared property [`Record`] with a write
//! interceptor. Writes through its [`Model`] handle apply immediately;
//! handlers registered for the written property are notified later, when
//! the [`Scheduler`] is drained. Repeated writes to one property within a
//! turn collapse into a single notification that sees the latest value.
//!
//! A [`ModelBridge`] joins two observers over one store. The node writes
//! through one side and listens on the other; the host gets the paired
//! bridge ([`ModelBridge::pair`]) and does the opposite. A write is only
//! ever seen by the *other* side's handlers, so a node reacting to a host
//! edit never re-triggers itself.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::scheduler::Scheduler;
use crate::schema::Schema;
use crate::value::{Record, Value};

/// Callback invoked with the observer's model and the changed property.
pub type UpdateHandler = Rc<dyn Fn(&Model, &str)>;

/// Handle returned by `add_handler`, used to unregister the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(0);

struct Registration {
    id: HandlerId,
    property: String,
    handler: UpdateHandler,
}

struct ObserverState {
    id: u64,
    store: Rc<RefCell<Record>>,
    scheduler: Scheduler,
    handlers: RefCell<Vec<Registration>>,
    pending: RefCell<Vec<String>>,
    flush_scheduled: Cell<bool>,
}

/// Read/write access to a store through one observer.
#[derive(Clone)]
pub struct Model {
    state: Rc<ObserverState>,
}

impl Model {
    /// The current value of `key`, or [`Value::Null`] when unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.state.store.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Write `value` to `key`.
    ///
    /// The store is updated before this returns. If any handler is
    /// registered for `key` on this observer, a notification is queued for
    /// the next flush.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.state.store.borrow_mut().insert(key, value);

        let watched = self
            .state
            .handlers
            .borrow()
            .iter()
            .any(|r| r.property == key);
        if !watched {
            return;
        }

        {
            let mut pending = self.state.pending.borrow_mut();
            if !pending.iter().any(|p| p == key) {
                pending.push(key.to_owned());
            }
        }

        if !self.state.flush_scheduled.replace(true) {
            let model = self.clone();
            self.state.scheduler.defer(move || model.flush());
        }
    }

    /// Queue every handler of every pending property, each as its own task.
    fn flush(&self) {
        self.state.flush_scheduled.set(false);
        let batch = std::mem::take(&mut *self.state.pending.borrow_mut());
        tracing::trace!(observer = self.state.id, properties = ?batch, "flushing model updates");

        for property in batch {
            let handlers: Vec<UpdateHandler> = self
                .state
                .handlers
                .borrow()
                .iter()
                .filter(|r| r.property == property)
                .map(|r| Rc::clone(&r.handler))
                .collect();
            for handler in handlers {
                let model = self.clone();
                let property = property.clone();
                self.state.scheduler.defer(move || handler(&model, &property));
            }
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("observer", &self.state.id)
            .field("store", &*self.state.store.borrow())
            .finish()
    }
}

/// One observer over a shared store.
#[derive(Clone)]
pub struct ModelObserver {
    state: Rc<ObserverState>,
}

impl ModelObserver {
    /// An observer over `store` that queues notifications on `scheduler`.
    #[must_use]
    pub fn new(store: Rc<RefCell<Record>>, scheduler: Scheduler) -> Self {
        Self {
            state: Rc::new(ObserverState {
                id: NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed),
                store,
                scheduler,
                handlers: RefCell::new(Vec::new()),
                pending: RefCell::new(Vec::new()),
                flush_scheduled: Cell::new(false),
            }),
        }
    }

    /// The write handle.
    #[must_use]
    pub fn model(&self) -> Model {
        Model {
            state: Rc::clone(&self.state),
        }
    }

    /// Process-unique observer id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Call `handler` after writes to `property` through this observer.
    pub fn add_handler(
        &self,
        property: &str,
        handler: impl Fn(&Model, &str) + 'static,
    ) -> HandlerId {
        let id = HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed));
        self.state.handlers.borrow_mut().push(Registration {
            id,
            property: property.to_owned(),
            handler: Rc::new(handler),
        });
        id
    }

    /// Unregister a handler. Notifications already queued still run.
    /// Returns `false` if the handler was not registered here.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.state.handlers.borrow_mut();
        let before = handlers.len();
        handlers.retain(|r| r.id != id);
        handlers.len() != before
    }
}

impl fmt::Debug for ModelObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelObserver({})", self.state.id)
    }
}

struct BridgeState {
    store: Rc<RefCell<Record>>,
    schema: Schema,
    observers: [ModelObserver; 2],
}

/// Two observers over one store, seen from one side.
///
/// [`model`](Self::model) writes through this side's observer;
/// [`add_handler`](Self::add_handler) listens on the other one.
/// [`pair`](Self::pair) returns the view from the other side, and
/// `bridge.pair().pair() == bridge`.
#[derive(Clone)]
pub struct ModelBridge {
    state: Rc<BridgeState>,
    side: usize,
}

impl ModelBridge {
    /// A bridge over `initial` that queues notifications on the calling
    /// thread's default scheduler.
    #[must_use]
    pub fn new(initial: Record, schema: Schema) -> Self {
        Self::with_scheduler(initial, schema, &Scheduler::current())
    }

    /// A bridge over `initial` that queues notifications on `scheduler`.
    #[must_use]
    pub fn with_scheduler(initial: Record, schema: Schema, scheduler: &Scheduler) -> Self {
        let store = Rc::new(RefCell::new(initial));
        let observers = [
            ModelObserver::new(Rc::clone(&store), scheduler.clone()),
            ModelObserver::new(Rc::clone(&store), scheduler.clone()),
        ];
        Self {
            state: Rc::new(BridgeState {
                store,
                schema,
                observers,
            }),
            side: 0,
        }
    }

    fn output(&self) -> &ModelObserver {
        &self.state.observers[self.side]
    }

    fn input(&self) -> &ModelObserver {
        &self.state.observers[1 - self.side]
    }

    /// Write handle for this side. Writes notify the paired side.
    #[must_use]
    pub fn model(&self) -> Model {
        self.output().model()
    }

    /// Listen for writes made through the paired side's model.
    pub fn add_handler(
        &self,
        property: &str,
        handler: impl Fn(&Model, &str) + 'static,
    ) -> HandlerId {
        self.input().add_handler(property, handler)
    }

    /// Unregister a handler added with [`add_handler`](Self::add_handler).
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.input().remove_handler(id)
    }

    /// The same bridge seen from the other side.
    #[must_use]
    pub fn pair(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            side: 1 - self.side,
        }
    }

    /// The property schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.state.schema
    }

    /// Read a property without going through either observer.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.state.store.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Names of the schema's serializable properties.
    #[must_use]
    pub fn serializable_names(&self) -> Vec<String> {
        self.state
            .schema
            .serializable_names()
            .map(str::to_owned)
            .collect()
    }

    /// Project the serializable properties into a record. Unset properties
    /// export as null.
    #[must_use]
    pub fn export_to_model(&self) -> Record {
        let names = self.serializable_names();
        self.export_names(names.iter().map(String::as_str))
    }

    /// Project the named properties into a record.
    #[must_use]
    pub fn export_names<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Record {
        let store = self.state.store.borrow();
        names
            .into_iter()
            .map(|name| (name, store.get(name).cloned().unwrap_or_default()))
            .collect()
    }

    /// Write the serializable properties present in `patch` through this
    /// side's model. Properties missing from `patch` keep their value.
    pub fn patch_model(&self, patch: &Record) {
        let names = self.serializable_names();
        self.patch_names(patch, names.iter().map(String::as_str));
    }

    /// Write the named properties present in `patch` through this side's
    /// model.
    pub fn patch_names<'a>(&self, patch: &Record, names: impl IntoIterator<Item = &'a str>) {
        let model = self.model();
        for name in names {
            if let Some(value) = patch.get(name) {
                model.set(name, value.clone());
            }
        }
    }
}

impl PartialEq for ModelBridge {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state) && self.side == other.side
    }
}

impl Eq for ModelBridge {}

impl fmt::Debug for ModelBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelBridge({},{})", self.input().id(), self.output().id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EditorKind, PropertySchema};

    fn test_bridge(scheduler: &Scheduler) -> ModelBridge {
        let schema = Schema::new(vec![
            PropertySchema::new("a", EditorKind::Int, "A"),
            PropertySchema::new("b", EditorKind::Int, "B"),
            PropertySchema::new("shown", EditorKind::Int, "Shown").read_only().transient(),
        ]);
        ModelBridge::with_scheduler(Record::new().with("a", 0).with("b", 0), schema, scheduler)
    }

    type Log = Rc<RefCell<Vec<(String, Value)>>>;

    fn recorder(log: &Log) -> impl Fn(&Model, &str) + 'static {
        let log = Rc::clone(log);
        move |model: &Model, prop: &str| log.borrow_mut().push((prop.to_owned(), model.get(prop)))
    }

    #[test]
    fn writes_apply_synchronously_and_notify_later() {
        let scheduler = Scheduler::new();
        let bridge = test_bridge(&scheduler);
        let log = Log::default();
        bridge.pair().add_handler("a", recorder(&log));

        bridge.model().set("a", 5);
        assert_eq!(bridge.get("a"), Value::Int(5));
        assert!(log.borrow().is_empty());

        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec![("a".to_owned(), Value::Int(5))]);
    }

    #[test]
    fn repeated_writes_collapse_to_latest_value() {
        let scheduler = Scheduler::new();
        let bridge = test_bridge(&scheduler);
        let log = Log::default();
        bridge.pair().add_handler("a", recorder(&log));

        bridge.model().set("a", 1);
        bridge.model().set("a", 2);
        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec![("a".to_owned(), Value::Int(2))]);
    }

    #[test]
    fn distinct_properties_notify_in_schedule_order() {
        let scheduler = Scheduler::new();
        let bridge = test_bridge(&scheduler);
        let log = Log::default();
        let host = bridge.pair();
        host.add_handler("a", recorder(&log));
        host.add_handler("b", recorder(&log));

        bridge.model().set("b", 1);
        bridge.model().set("a", 2);
        // One flush task queued, which then queues one task per handler.
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_until_idle(), 3);
        assert_eq!(
            *log.borrow(),
            vec![
                ("b".to_owned(), Value::Int(1)),
                ("a".to_owned(), Value::Int(2)),
            ]
        );
    }

    #[test]
    fn unwatched_writes_schedule_nothing() {
        let scheduler = Scheduler::new();
        let bridge = test_bridge(&scheduler);
        bridge.model().set("a", 1);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn pairing_is_exclusive() {
        let scheduler = Scheduler::new();
        let node_side = test_bridge(&scheduler);
        let host_side = node_side.pair();
        let node_log = Log::default();
        let host_log = Log::default();
        node_side.add_handler("a", recorder(&node_log));
        host_side.add_handler("a", recorder(&host_log));

        node_side.model().set("a", 1);
        scheduler.run_until_idle();
        assert!(node_log.borrow().is_empty());
        assert_eq!(host_log.borrow().len(), 1);

        host_side.model().set("a", 2);
        scheduler.run_until_idle();
        assert_eq!(*node_log.borrow(), vec![("a".to_owned(), Value::Int(2))]);
        assert_eq!(host_log.borrow().len(), 1);
    }

    #[test]
    fn pair_of_pair_is_self() {
        let bridge = test_bridge(&Scheduler::new());
        assert_eq!(bridge.pair().pair(), bridge);
        assert_ne!(bridge.pair(), bridge);
    }

    #[test]
    fn removed_handlers_stop_receiving_updates() {
        let scheduler = Scheduler::new();
        let bridge = test_bridge(&scheduler);
        let log = Log::default();
        let id = bridge.pair().add_handler("a", recorder(&log));

        bridge.model().set("a", 1);
        scheduler.run_until_idle();
        assert!(bridge.pair().remove_handler(id));
        assert!(!bridge.pair().remove_handler(id));

        bridge.model().set("a", 2);
        scheduler.run_until_idle();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn export_skips_transient_properties() {
        let bridge = test_bridge(&Scheduler::new());
        bridge.model().set("shown", 9);
        let exported = bridge.export_to_model();
        let keys: Vec<_> = exported.keys().collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn patch_writes_through_own_side() {
        let scheduler = Scheduler::new();
        let bridge = test_bridge(&scheduler);
        let log = Log::default();
        bridge.pair().add_handler("b", recorder(&log));

        bridge.patch_model(&Record::new().with("b", 7).with("shown", 3));
        assert_eq!(bridge.get("a"), Value::Int(0));
        assert_eq!(bridge.get("b"), Value::Int(7));
        assert_eq!(bridge.get("shown"), Value::Null);

        scheduler.run_until_idle();
        assert_eq!(*log.borrow(), vec![("b".to_owned(), Value::Int(7))]);
    }
}
