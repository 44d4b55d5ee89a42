//! Host boundary: the page/window surface the monitor observes.
//!
//! The embedding layer (browser bridge, kiosk shell, test harness) implements
//! these traits and pushes page events into a [`HostEventBus`]. Listeners are
//! registered per bus instance, so independent sessions never share them.

use crate::error::{ProctorError, ProctorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Page identity captured into violation metadata. Queried on every record.
pub trait PageContext: Send + Sync {
    fn user_agent(&self) -> String;
    fn current_url(&self) -> String;
}

/// Fixed page context, for hosts that know both values up front.
#[derive(Debug, Clone)]
pub struct StaticPageContext {
    pub user_agent: String,
    pub url: String,
}

impl PageContext for StaticPageContext {
    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }
}

/// Outer and inner window sizes in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDimensions {
    pub outer_width: u32,
    pub outer_height: u32,
    pub inner_width: u32,
    pub inner_height: u32,
}

impl WindowDimensions {
    /// Same outer and inner size: nothing docked.
    pub fn undocked(width: u32, height: u32) -> Self {
        Self {
            outer_width: width,
            outer_height: height,
            inner_width: width,
            inner_height: height,
        }
    }
}

/// Reads the current window geometry for the dev-tools heuristic.
pub trait ViewportProbe: Send + Sync {
    fn dimensions(&self) -> ProctorResult<WindowDimensions>;
}

/// Fullscreen control on the root viewport element.
pub trait FullscreenApi: Send + Sync {
    fn request_fullscreen(&self) -> ProctorResult<()>;
    fn exit_fullscreen(&self) -> ProctorResult<()>;
    fn is_fullscreen(&self) -> bool;
}

/// Host without fullscreen support. Every request is refused.
#[derive(Debug, Default)]
pub struct NoFullscreen;

impl FullscreenApi for NoFullscreen {
    fn request_fullscreen(&self) -> ProctorResult<()> {
        Err(ProctorError::Unsupported("fullscreen".to_string()))
    }

    fn exit_fullscreen(&self) -> ProctorResult<()> {
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        false
    }
}

/// Page event channels a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    VisibilityChange,
    Blur,
    ContextMenu,
    KeyDown,
    Copy,
    Paste,
}

/// A key press with its modifier state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStroke {
    /// Key value as reported by the host ("F12", "c", "Tab").
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyStroke {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ctrl: false,
            alt: false,
            shift: false,
            meta: false,
        }
    }

    pub fn ctrl(key: impl Into<String>) -> Self {
        Self {
            ctrl: true,
            ..Self::plain(key)
        }
    }

    pub fn ctrl_shift(key: impl Into<String>) -> Self {
        Self {
            ctrl: true,
            shift: true,
            ..Self::plain(key)
        }
    }

    pub fn alt(key: impl Into<String>) -> Self {
        Self {
            alt: true,
            ..Self::plain(key)
        }
    }
}

/// Raw page signal as delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostSignal {
    VisibilityChange { hidden: bool },
    Blur,
    ContextMenu,
    KeyDown(KeyStroke),
    Copy,
    Paste,
}

impl HostSignal {
    pub fn topic(&self) -> EventTopic {
        match self {
            HostSignal::VisibilityChange { .. } => EventTopic::VisibilityChange,
            HostSignal::Blur => EventTopic::Blur,
            HostSignal::ContextMenu => EventTopic::ContextMenu,
            HostSignal::KeyDown(_) => EventTopic::KeyDown,
            HostSignal::Copy => EventTopic::Copy,
            HostSignal::Paste => EventTopic::Paste,
        }
    }
}

/// The host's pending default behavior for an event (menu, paste, ...).
///
/// Cloning shares the flag, so the host keeps a handle and checks it after
/// dispatch to decide whether to run the default behavior.
#[derive(Debug, Clone, Default)]
pub struct DefaultAction(Arc<AtomicBool>);

impl DefaultAction {
    pub fn prevent(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_prevented(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A page event in flight.
#[derive(Debug, Clone)]
pub struct HostEvent {
    pub signal: HostSignal,
    pub default_action: DefaultAction,
}

impl HostEvent {
    pub fn new(signal: HostSignal) -> Self {
        Self {
            signal,
            default_action: DefaultAction::default(),
        }
    }
}

pub type Listener = Arc<dyn Fn(&HostEvent) + Send + Sync>;

struct Registration {
    id: u64,
    topic: EventTopic,
    listener: Listener,
    /// Cleared on release, before the registration leaves the table.
    live: Arc<AtomicBool>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
    unsupported: HashSet<EventTopic>,
}

impl BusInner {
    fn remove(&self, id: u64) -> bool {
        let Ok(mut listeners) = self.listeners.lock() else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }
}

/// Per-instance page event bus.
///
/// The host calls [`HostEventBus::dispatch`]; detectors subscribe through
/// [`HostEventBus::subscribe`] and hold the returned [`ListenerHandle`].
#[derive(Clone, Default)]
pub struct HostEventBus {
    inner: Arc<BusInner>,
}

impl HostEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose host lacks the given APIs; subscribing to them fails.
    pub fn without(topics: impl IntoIterator<Item = EventTopic>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                unsupported: topics.into_iter().collect(),
                ..Default::default()
            }),
        }
    }

    pub fn supports(&self, topic: EventTopic) -> bool {
        !self.inner.unsupported.contains(&topic)
    }

    pub fn subscribe(&self, topic: EventTopic, listener: Listener) -> ProctorResult<ListenerHandle> {
        if !self.supports(topic) {
            return Err(ProctorError::Unsupported(format!("{:?} events", topic)));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .map_err(|e| ProctorError::Unsupported(format!("listener table poisoned: {}", e)))?;
        let live = Arc::new(AtomicBool::new(true));
        listeners.push(Registration {
            id,
            topic,
            listener,
            live: Arc::clone(&live),
        });
        debug!("[PROCTOR] listener {} registered for {:?}", id, topic);
        Ok(ListenerHandle {
            id,
            topic,
            bus: Arc::downgrade(&self.inner),
            live,
            released: false,
        })
    }

    /// Deliver an event to every listener of its topic, in registration order.
    /// Returns the number of listeners invoked.
    ///
    /// Listeners run outside the table lock so they may (un)subscribe. A
    /// listener released before its turn in this dispatch is skipped. The
    /// host is expected to dispatch from one thread at a time; a release on
    /// another thread does not wait for a listener that is already running.
    pub fn dispatch(&self, event: &HostEvent) -> usize {
        let topic = event.signal.topic();
        let targets: Vec<(Listener, Arc<AtomicBool>)> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners
                .iter()
                .filter(|r| r.topic == topic)
                .map(|r| (Arc::clone(&r.listener), Arc::clone(&r.live)))
                .collect(),
            Err(_) => return 0,
        };
        let mut invoked = 0;
        for (listener, live) in &targets {
            if !live.load(Ordering::SeqCst) {
                continue;
            }
            listener(event);
            invoked += 1;
        }
        invoked
    }

    /// Wrap a signal in a fresh event, dispatch it, and hand back the event so
    /// the host can inspect its default action.
    pub fn emit(&self, signal: HostSignal) -> HostEvent {
        let event = HostEvent::new(signal);
        self.dispatch(&event);
        event
    }

    pub fn listener_count(&self, topic: EventTopic) -> usize {
        self.inner
            .listeners
            .lock()
            .map(|l| l.iter().filter(|r| r.topic == topic).count())
            .unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.inner.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

/// Registration of one listener. Released explicitly or on drop.
pub struct ListenerHandle {
    id: u64,
    topic: EventTopic,
    bus: Weak<BusInner>,
    live: Arc<AtomicBool>,
    released: bool,
}

impl ListenerHandle {
    pub fn topic(&self) -> EventTopic {
        self.topic
    }

    /// Deregister. A second call is a no-op.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.live.store(false, Ordering::SeqCst);
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.id) {
                debug!("[PROCTOR] listener {} released ({:?})", self.id, self.topic);
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.release();
    }
}
