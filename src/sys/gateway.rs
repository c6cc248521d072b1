//! Insulates the rest of the engine from the flaky, asynchronous
//! accessibility API.
//!
//! Queries run on a dedicated background worker and transparently retry
//! transient failures until a timeout; callers only ever see `Option<T>`.
//! Actions go out on a second worker so a wedged application can never stall
//! either the reactor or pending queries behind it. Notifications delivered
//! by the OS are mapped to typed events and re-dispatched onto the reactor
//! channel before they touch any shared state.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::actor::reactor::{self, Event};
use crate::common::collections::HashSet;
use crate::common::config::GatewaySettings;
use crate::model::entities::WindowSeed;
use crate::sys::ax::{
    AxApi, AxCode, AxHandle, NotificationKind, NotificationKinds, NotificationSink, Pid,
    QueryError, WindowServerId,
};

/// Thread-safe cache of window titles as last seen by the window server.
/// Used as the fallback when the accessibility title is empty or gone.
#[derive(Clone, Default, Debug)]
pub struct TitleCache(Arc<DashMap<WindowServerId, String>>);

impl TitleCache {
    pub fn new() -> TitleCache { TitleCache::default() }

    pub fn insert(&self, id: WindowServerId, title: String) { self.0.insert(id, title); }

    pub fn get(&self, id: &WindowServerId) -> Option<String> {
        self.0.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &WindowServerId) { self.0.remove(id); }
}

/// A background worker draining boxed jobs off a channel. The worker exits
/// when the owning gateway is dropped.
struct Worker {
    tx: crossbeam_channel::Sender<Box<dyn FnOnce() + Send>>,
}

impl Worker {
    fn spawn() -> Worker {
        let (tx, rx) = crossbeam_channel::unbounded::<Box<dyn FnOnce() + Send>>();
        thread::spawn(move || {
            while let Ok(job) = rx.recv() {
                job();
            }
        });
        Worker { tx }
    }

    fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}

pub struct Gateway {
    api: Arc<dyn AxApi>,
    settings: GatewaySettings,
    queries: Worker,
    commands: Worker,
    registered: Arc<RwLock<HashSet<(AxHandle, NotificationKind)>>>,
    titles: TitleCache,
}

impl Gateway {
    pub fn new(api: Arc<dyn AxApi>, settings: GatewaySettings) -> Gateway {
        Gateway {
            api,
            settings,
            queries: Worker::spawn(),
            commands: Worker::spawn(),
            registered: Arc::new(RwLock::new(HashSet::default())),
            titles: TitleCache::new(),
        }
    }

    pub fn titles(&self) -> &TitleCache { &self.titles }

    /// Runs `op` on the query worker, retrying transient failures until the
    /// configured timeout. `complete` observes `None` for both a timeout and
    /// a permanent failure; the distinction is not actionable for callers.
    pub fn query<T, F, C>(&self, mut op: F, complete: C)
    where
        T: Send + 'static,
        F: FnMut(&dyn AxApi) -> Result<T, AxCode> + Send + 'static,
        C: FnOnce(Option<T>) + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let settings = self.settings.clone();
        self.queries.submit(move || complete(run_with_retry(&*api, &settings, &mut op)));
    }

    /// Fire-and-forget action on the command worker.
    pub fn command(&self, op: impl FnOnce(&dyn AxApi) + Send + 'static) {
        let api = Arc::clone(&self.api);
        self.commands.submit(move || op(&*api));
    }

    /// Registers interest in `kinds` on `target`. Each kind is registered
    /// independently: one failing kind is logged and skipped, the rest
    /// proceed. Delivered notifications are re-dispatched to `events_tx`.
    pub fn subscribe(
        &self,
        target: AxHandle,
        pid: Pid,
        kinds: NotificationKinds,
        events_tx: reactor::Sender,
    ) {
        let api = Arc::clone(&self.api);
        let settings = self.settings.clone();
        let registered = Arc::clone(&self.registered);
        let sink: NotificationSink = Arc::new(move |notification| {
            trace!(?notification, "accessibility notification");
            if events_tx.try_send(Event::from_notification(&notification)).is_err() {
                debug!("dropping notification delivered after shutdown");
            }
        });
        self.queries.submit(move || {
            for kind in kinds.kinds() {
                if registered.read().contains(&(target, kind)) {
                    continue;
                }
                if register_with_retry(&*api, &settings, target, pid, kind, &sink) {
                    registered.write().insert((target, kind));
                } else {
                    warn!(%kind, ?target, "could not register accessibility notification");
                }
            }
        });
    }

    /// Forgets the registrations for `target`. The element is gone, so there
    /// is nothing to tear down on the OS side.
    pub fn unsubscribe(&self, target: AxHandle) {
        self.registered.write().retain(|(t, _)| *t != target);
    }

    // --- composed queries used by the reactor ---

    /// Enumerates the windows of a freshly tracked application and seeds
    /// their attributes in one retried pass.
    pub fn discover_windows(
        &self,
        pid: Pid,
        app: AxHandle,
        app_name: String,
        events_tx: reactor::Sender,
    ) {
        let titles = self.titles.clone();
        self.query(
            move |api| {
                let handles = api.windows(app)?;
                let mut seen: HashSet<AxHandle> = HashSet::default();
                let mut seeds = Vec::with_capacity(handles.len());
                for handle in handles {
                    // the OS sometimes reports the same window twice
                    if !seen.insert(handle) {
                        continue;
                    }
                    seeds.push(window_seed(api, &titles, handle, &app_name));
                }
                Ok(seeds)
            },
            move |seeds| {
                if let Some(seeds) = seeds {
                    let _ = events_tx.try_send(Event::WindowsDiscovered { pid, seeds });
                }
            },
        );
    }

    /// Seeds a single window reported by a window-created notification.
    pub fn discover_window(
        &self,
        pid: Pid,
        handle: AxHandle,
        app_name: String,
        events_tx: reactor::Sender,
    ) {
        let titles = self.titles.clone();
        self.query(
            move |api| Ok(window_seed(api, &titles, handle, &app_name)),
            move |seed| {
                if let Some(seed) = seed {
                    let _ = events_tx.try_send(Event::WindowsDiscovered { pid, seeds: vec![seed] });
                }
            },
        );
    }

    /// Re-reads a window title after a title-changed notification, falling
    /// back to the window-server cache and then the application name.
    pub fn resolve_title(
        &self,
        handle: AxHandle,
        server_id: Option<WindowServerId>,
        app_name: String,
        events_tx: reactor::Sender,
    ) {
        let titles = self.titles.clone();
        self.query(
            move |api| api.title(handle),
            move |title| {
                let title = match title {
                    Some(title) if !title.is_empty() => title,
                    _ => fallback_title(&titles, server_id, &app_name),
                };
                let _ = events_tx.try_send(Event::TitleResolved { handle, title });
            },
        );
    }

    /// Asks which window an activated application considers focused.
    pub fn focused_window(&self, pid: Pid, app: AxHandle, events_tx: reactor::Sender) {
        self.query(
            move |api| api.focused_window(app),
            move |window| {
                if let Some(handle) = window {
                    let _ = events_tx.try_send(Event::WindowFocusChanged { pid, handle });
                }
            },
        );
    }
}

fn run_with_retry<T, F>(api: &dyn AxApi, settings: &GatewaySettings, op: &mut F) -> Option<T>
where
    F: FnMut(&dyn AxApi) -> Result<T, AxCode>,
{
    let deadline = Instant::now() + settings.query_timeout();
    loop {
        match op(api) {
            Ok(value) => return Some(value),
            Err(code) => match QueryError::from(code) {
                QueryError::Transient => {
                    if Instant::now() >= deadline {
                        debug!("abandoning accessibility call after {:?}", settings.query_timeout());
                        return None;
                    }
                    thread::sleep(settings.retry_interval());
                }
                QueryError::Permanent(code) => {
                    trace!(?code, "accessibility call failed");
                    return None;
                }
            },
        }
    }
}

fn register_with_retry(
    api: &dyn AxApi,
    settings: &GatewaySettings,
    target: AxHandle,
    pid: Pid,
    kind: NotificationKind,
    sink: &NotificationSink,
) -> bool {
    let deadline = Instant::now() + settings.query_timeout();
    loop {
        let code = api.add_notification(target, pid, kind, Arc::clone(sink));
        if code.registration_ok() {
            return true;
        }
        match QueryError::from(code) {
            QueryError::Transient => {
                if Instant::now() >= deadline {
                    return false;
                }
                thread::sleep(settings.retry_interval());
            }
            QueryError::Permanent(_) => return false,
        }
    }
}

/// Reads a window's attributes without failing the enclosing query; absent
/// attributes degrade to fallbacks rather than aborting discovery.
fn window_seed(api: &dyn AxApi, titles: &TitleCache, handle: AxHandle, app_name: &str) -> WindowSeed {
    let server_id = api.window_server_id(handle).ok();
    let title = match api.title(handle) {
        Ok(title) if !title.is_empty() => title,
        _ => fallback_title(titles, server_id, app_name),
    };
    let is_minimized = api.is_minimized(handle).unwrap_or(false);
    WindowSeed { handle, server_id, title, is_minimized }
}

fn fallback_title(titles: &TitleCache, server_id: Option<WindowServerId>, app_name: &str) -> String {
    server_id
        .and_then(|id| titles.get(&id))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| app_name.to_string())
}
