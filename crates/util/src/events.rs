//! Named-channel publish/subscribe.
//!
//! [`EventTrigger`] is a synchronous, single-threaded event emitter. Handlers
//! are keyed by channel name (`"change"`, `"change:name"`, `"add"`, ...) and
//! run in subscription order inside the call to [`EventTrigger::trigger`].
//!
//! Dispatch works on a snapshot of the listener list, so a handler may
//! subscribe, unsubscribe or re-enter whatever emitted the event.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Handle returned by every subscription, used to unsubscribe.
pub type ListenerId = u64;

type Handler<E> = Rc<dyn Fn(&str, &E)>;

#[derive(Clone, PartialEq, Eq)]
enum Channel {
    Named(String),
    All,
}

struct Listener<E> {
    id: ListenerId,
    channel: Channel,
    once: bool,
    handler: Handler<E>,
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            channel: self.channel.clone(),
            once: self.once,
            handler: Rc::clone(&self.handler),
        }
    }
}

/// Synchronous event emitter with named channels.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use modelkit_util::events::EventTrigger;
///
/// let events: EventTrigger<i32> = EventTrigger::new();
/// let seen = Rc::new(Cell::new(0));
/// let sink = Rc::clone(&seen);
/// events.on("add", move |n| sink.set(sink.get() + n));
///
/// events.trigger("add", &2);
/// events.trigger("remove", &5);
/// assert_eq!(seen.get(), 2);
/// ```
pub struct EventTrigger<E> {
    listeners: RefCell<Vec<Listener<E>>>,
    next_id: Cell<ListenerId>,
}

impl<E> Default for EventTrigger<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }
}

impl<E> fmt::Debug for EventTrigger<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTrigger")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E> EventTrigger<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(&self, channel: Channel, once: bool, handler: Handler<E>) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            channel,
            once,
            handler,
        });
        id
    }

    /// Subscribe `handler` to the channel `name`.
    pub fn on(&self, name: &str, handler: impl Fn(&E) + 'static) -> ListenerId {
        self.subscribe(
            Channel::Named(name.to_string()),
            false,
            Rc::new(move |_: &str, event: &E| handler(event)),
        )
    }

    /// Subscribe `handler` to the next event on `name` only.
    pub fn once(&self, name: &str, handler: impl Fn(&E) + 'static) -> ListenerId {
        self.subscribe(
            Channel::Named(name.to_string()),
            true,
            Rc::new(move |_: &str, event: &E| handler(event)),
        )
    }

    /// Subscribe `handler` to every channel. It receives the channel name
    /// alongside the payload.
    pub fn on_all(&self, handler: impl Fn(&str, &E) + 'static) -> ListenerId {
        self.subscribe(Channel::All, false, Rc::new(handler))
    }

    /// Remove one listener. Returns `false` if `id` was not subscribed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Remove every listener of the channel `name`.
    pub fn off_channel(&self, name: &str) {
        self.listeners
            .borrow_mut()
            .retain(|l| !matches!(&l.channel, Channel::Named(n) if n == name));
    }

    /// Number of listeners that would receive an event on `name`,
    /// including catch-all listeners.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| match &l.channel {
                Channel::Named(n) => n == name,
                Channel::All => true,
            })
            .count()
    }

    /// Emit `event` on the channel `name`.
    pub fn trigger(&self, name: &str, event: &E) {
        let matching: Vec<Listener<E>> = {
            let mut listeners = self.listeners.borrow_mut();
            let matching: Vec<Listener<E>> = listeners
                .iter()
                .filter(|l| match &l.channel {
                    Channel::Named(n) => n == name,
                    Channel::All => true,
                })
                .cloned()
                .collect();
            listeners.retain(|l| !(l.once && matching.iter().any(|m| m.id == l.id)));
            matching
        };

        for listener in matching {
            (listener.handler)(name, event);
        }
    }
}
