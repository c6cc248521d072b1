//! The single serialized context for all registry state.
//!
//! Lifecycle events from the accessibility layer, decoded hotkey/mouse
//! intents and presentation queries all arrive on one channel and are
//! handled strictly in order, so two notification callbacks can never
//! reorder the same collection concurrently. Everything the gateway does in
//! the background re-enters here as an event before touching state.

use std::ops::Range;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace};

use crate::actor;
use crate::common::config::Config;
use crate::model::entities::{AppInfo, AppKey, EntityKey, WindowSeed};
use crate::model::registry::{CollectionId, Registry};
use crate::switch::manager::{SwitchItem, SwitchManager, SwitchTarget};
use crate::switch::state::SwitcherState;
use crate::switch::{BrowseMode, Trigger};
use crate::sys::ax::{AxHandle, AxNotification, NotificationKind, NotificationKinds, Pid};
use crate::sys::gateway::Gateway;
use crate::sys::geometry::Point;

pub type Sender = actor::Sender<Event>;
pub type Receiver = actor::Receiver<Event>;

#[derive(Debug)]
pub enum Event {
    // lifecycle, from the process watcher and the accessibility layer
    ApplicationLaunched(AppInfo),
    ApplicationTerminated(Pid),
    ApplicationActivated(Pid),
    ApplicationHidden(Pid),
    ApplicationShown(Pid),
    WindowCreated { pid: Pid, handle: AxHandle },
    WindowDestroyed { handle: AxHandle },
    WindowTitleChanged { handle: AxHandle },
    WindowMiniaturized { handle: AxHandle },
    WindowDeminiaturized { handle: AxHandle },
    // completions of background gateway queries
    WindowsDiscovered { pid: Pid, seeds: Vec<WindowSeed> },
    WindowFocusChanged { pid: Pid, handle: AxHandle },
    TitleResolved { handle: AxHandle, title: String },
    // dock badge refresh, delivered by the dock-observing collaborator
    LabelChanged { pid: Pid, label: Option<String> },
    // decoded user intents
    Intent(Intent),
    DelayedOpenElapsed { epoch: u64 },
    Query(QueryRequest),
}

impl Event {
    /// Typed event for a raw notification; called on the OS notification
    /// thread before re-dispatch.
    pub fn from_notification(notification: &AxNotification) -> Event {
        let AxNotification { kind, pid, element } = *notification;
        match kind {
            NotificationKind::WindowCreated => Event::WindowCreated { pid, handle: element },
            NotificationKind::ElementDestroyed => Event::WindowDestroyed { handle: element },
            NotificationKind::TitleChanged => Event::WindowTitleChanged { handle: element },
            NotificationKind::WindowMiniaturized => Event::WindowMiniaturized { handle: element },
            NotificationKind::WindowDeminiaturized => {
                Event::WindowDeminiaturized { handle: element }
            }
            NotificationKind::ApplicationActivated => Event::ApplicationActivated(pid),
            NotificationKind::ApplicationHidden => Event::ApplicationHidden(pid),
            NotificationKind::ApplicationShown => Event::ApplicationShown(pid),
            NotificationKind::FocusedWindowChanged | NotificationKind::MainWindowChanged => {
                Event::WindowFocusChanged { pid, handle: element }
            }
        }
    }
}

/// Already-decoded hotkey and mouse intents; capture and decoding live with
/// the embedder.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    ToggleOn(Trigger),
    ToggleForward,
    ToggleBackward,
    ToggleOff,
    ToggleDrop,
    Hide,
    Minimize,
    Close,
    Quit,
    HoverAt { index: Option<usize>, location: Point },
}

/// What the presentation layer is currently showing; sent with every query
/// because the filter text lives in its search box, not here.
#[derive(Debug, Clone, Default)]
pub struct ViewContext {
    pub mode: BrowseMode,
    pub filter: String,
}

#[derive(Debug)]
pub enum QueryRequest {
    ItemsCount { view: ViewContext, response: oneshot::Sender<usize> },
    Items { view: ViewContext, response: oneshot::Sender<Vec<SwitchItem>> },
    ItemsSlice {
        view: ViewContext,
        range: Range<usize>,
        response: oneshot::Sender<Vec<(usize, SwitchItem)>>,
    },
    ActiveIndex { view: ViewContext, response: oneshot::Sender<usize> },
    PageBounds { view: ViewContext, response: oneshot::Sender<(usize, usize)> },
}

/// Outbound surface to the overlay renderer.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OverlayEvent {
    Open { trigger: Trigger },
    Close,
}

enum PointerAction {
    Hide,
    Minimize,
    Close,
    Quit,
}

pub struct Reactor {
    config: Config,
    registry: Registry,
    manager: SwitchManager,
    switcher: SwitcherState,
    gateway: Gateway,
    rx: Receiver,
    /// Handed to gateway callbacks and the delayed-open timer so their
    /// results re-enter this context as events.
    events_tx: Sender,
    overlay_tx: actor::Sender<OverlayEvent>,
}

impl Reactor {
    pub fn new(
        config: Config,
        gateway: Gateway,
        rx: Receiver,
        events_tx: Sender,
        overlay_tx: actor::Sender<OverlayEvent>,
    ) -> Reactor {
        let page_size = config.switcher.page_size;
        Reactor {
            config,
            registry: Registry::new(),
            manager: SwitchManager::new(),
            switcher: SwitcherState::new(page_size),
            gateway,
            rx,
            events_tx,
            overlay_tx,
        }
    }

    pub async fn run(mut self) {
        while let Some((span, event)) = self.rx.recv().await {
            let _guard = span.enter();
            self.handle_event(event);
        }
    }

    #[instrument(name = "reactor::handle_event", skip(self, event))]
    fn handle_event(&mut self, event: Event) {
        trace!(?event);
        match event {
            Event::ApplicationLaunched(info) => self.handle_app_launched(info),
            Event::ApplicationTerminated(pid) => self.handle_app_terminated(pid),
            Event::ApplicationActivated(pid) => self.handle_app_activated(pid),
            Event::ApplicationHidden(pid) => self.set_app_hidden(pid, true),
            Event::ApplicationShown(pid) => self.set_app_hidden(pid, false),
            Event::WindowCreated { pid, handle } => self.join_or_touch(pid, handle),
            Event::WindowDestroyed { handle } => self.handle_window_destroyed(handle),
            Event::WindowTitleChanged { handle } => self.handle_window_title_changed(handle),
            Event::WindowMiniaturized { handle } => self.set_window_minimized(handle, true),
            Event::WindowDeminiaturized { handle } => self.set_window_minimized(handle, false),
            Event::WindowsDiscovered { pid, seeds } => self.handle_windows_discovered(pid, seeds),
            Event::WindowFocusChanged { pid, handle } => self.join_or_touch(pid, handle),
            Event::TitleResolved { handle, title } => self.handle_title_resolved(handle, title),
            Event::LabelChanged { pid, label } => self.handle_label_changed(pid, label),
            Event::Intent(intent) => self.handle_intent(intent),
            Event::DelayedOpenElapsed { epoch } => self.handle_delayed_open(epoch),
            Event::Query(request) => self.handle_query(request),
        }
    }

    // --- application lifecycle ---

    fn handle_app_launched(&mut self, info: AppInfo) {
        if self.registry.app_by_pid(info.pid).is_some() {
            trace!(pid = info.pid, "application already tracked");
            return;
        }
        let pid = info.pid;
        let handle = info.handle;
        let name = info.name.clone();
        self.registry.insert_app(info);
        self.manager.invalidate();
        self.gateway
            .subscribe(handle, pid, NotificationKinds::APPLICATION, self.events_tx.clone());
        self.gateway.discover_windows(pid, handle, name, self.events_tx.clone());
    }

    fn handle_app_terminated(&mut self, pid: Pid) {
        let Some(app_key) = self.registry.app_by_pid(pid) else {
            trace!(pid, "termination of an untracked application");
            return;
        };
        let windows = self.registry.app(app_key).map(|app| app.windows.clone()).unwrap_or_default();
        for key in windows {
            if let Some(window) = self.registry.window(key) {
                self.gateway.unsubscribe(window.handle);
                if let Some(id) = window.server_id {
                    self.gateway.titles().remove(&id);
                }
            }
        }
        if let Some(app) = self.registry.app(app_key) {
            self.gateway.unsubscribe(app.handle);
        }
        self.registry.destroy(EntityKey::App(app_key));
        self.manager.invalidate();
    }

    fn handle_app_activated(&mut self, pid: Pid) {
        let Some(app_key) = self.registry.app_by_pid(pid) else { return };
        let Some(handle) = self.registry.app(app_key).map(|app| app.handle) else { return };
        // which window is focused decides what "recent" means here
        self.gateway.focused_window(pid, handle, self.events_tx.clone());
    }

    fn set_app_hidden(&mut self, pid: Pid, hidden: bool) {
        let Some(app_key) = self.registry.app_by_pid(pid) else { return };
        if let Some(app) = self.registry.app_mut(app_key) {
            app.is_hidden = hidden;
        }
    }

    fn handle_label_changed(&mut self, pid: Pid, label: Option<String>) {
        let Some(app_key) = self.registry.app_by_pid(pid) else { return };
        if let Some(app) = self.registry.app_mut(app_key) {
            app.label = label;
        }
    }

    // --- window lifecycle ---

    /// Touches a window we already track, otherwise kicks off discovery for
    /// it. Creation, focus-change and activation all funnel through here.
    fn join_or_touch(&mut self, pid: Pid, handle: AxHandle) {
        if let Some(existing) = self.registry.window_by_handle(handle) {
            self.registry.touch_everywhere(EntityKey::Window(existing));
            self.manager.invalidate();
            return;
        }
        let Some(app_key) = self.registry.app_by_pid(pid) else {
            trace!(pid, "window event for an untracked application");
            return;
        };
        let name = self.registry.app(app_key).map(|app| app.name.clone()).unwrap_or_default();
        self.gateway.discover_window(pid, handle, name, self.events_tx.clone());
    }

    fn handle_windows_discovered(&mut self, pid: Pid, seeds: Vec<WindowSeed>) {
        let Some(app_key) = self.registry.app_by_pid(pid) else {
            debug!(pid, "discovered windows for an application no longer tracked");
            return;
        };
        for seed in seeds {
            self.attach_window(app_key, pid, seed);
        }
    }

    fn attach_window(&mut self, app_key: AppKey, pid: Pid, seed: WindowSeed) {
        if let Some(existing) = self.registry.window_by_handle(seed.handle) {
            // discovery raced a notification that already created it
            self.registry.touch_everywhere(EntityKey::Window(existing));
            self.manager.invalidate();
            return;
        }
        let handle = seed.handle;
        if self.registry.insert_window(app_key, seed).is_some() {
            self.manager.invalidate();
            self.gateway.subscribe(handle, pid, NotificationKinds::WINDOW, self.events_tx.clone());
        }
    }

    fn handle_window_destroyed(&mut self, handle: AxHandle) {
        let Some(key) = self.registry.window_by_handle(handle) else {
            trace!(?handle, "destroy event for an untracked window");
            return;
        };
        if let Some(id) = self.registry.window(key).and_then(|window| window.server_id) {
            self.gateway.titles().remove(&id);
        }
        self.gateway.unsubscribe(handle);
        self.registry.destroy(EntityKey::Window(key));
        self.manager.invalidate();
    }

    fn handle_window_title_changed(&mut self, handle: AxHandle) {
        let Some(key) = self.registry.window_by_handle(handle) else { return };
        let Some(window) = self.registry.window(key) else { return };
        let server_id = window.server_id;
        let app_name =
            self.registry.app(window.app).map(|app| app.name.clone()).unwrap_or_default();
        self.gateway.resolve_title(handle, server_id, app_name, self.events_tx.clone());
    }

    fn handle_title_resolved(&mut self, handle: AxHandle, title: String) {
        // the window may have died while the query was in flight
        let Some(key) = self.registry.window_by_handle(handle) else { return };
        if let Some(window) = self.registry.window_mut(key) {
            if window.title != title {
                window.set_title(title);
                self.manager.invalidate();
            }
        }
    }

    fn set_window_minimized(&mut self, handle: AxHandle, minimized: bool) {
        let Some(key) = self.registry.window_by_handle(handle) else { return };
        if let Some(window) = self.registry.window_mut(key) {
            window.is_minimized = minimized;
        }
    }

    // --- intents ---

    fn handle_intent(&mut self, intent: Intent) {
        match intent {
            Intent::ToggleOn(trigger) => self.handle_toggle_on(trigger),
            Intent::ToggleForward => self.move_pointer(1),
            Intent::ToggleBackward => self.move_pointer(-1),
            Intent::ToggleOff => self.handle_toggle_off(),
            Intent::ToggleDrop => {
                self.switcher.toggle_drop();
                let _ = self.overlay_tx.send(OverlayEvent::Close);
            }
            Intent::Hide => self.pointer_action(PointerAction::Hide),
            Intent::Minimize => self.pointer_action(PointerAction::Minimize),
            Intent::Close => self.pointer_action(PointerAction::Close),
            Intent::Quit => self.pointer_action(PointerAction::Quit),
            Intent::HoverAt { index, location } => self.switcher.hover(index, location),
        }
    }

    fn handle_toggle_on(&mut self, trigger: Trigger) {
        let epoch = self.switcher.toggle_on(trigger);
        if self.config.switcher.faster_switch {
            let tx = self.events_tx.clone();
            let delay = self.config.switcher.open_delay();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // checked when it fires; the timer itself is never cancelled
                let _ = tx.send(Event::DelayedOpenElapsed { epoch });
            });
        } else {
            let _ = self.overlay_tx.send(OverlayEvent::Open { trigger });
        }
    }

    fn handle_delayed_open(&mut self, epoch: u64) {
        if self.switcher.still_active(epoch) {
            let _ = self.overlay_tx.send(OverlayEvent::Open { trigger: self.switcher.trigger() });
        } else {
            trace!(epoch, "delayed open superseded");
        }
    }

    fn move_pointer(&mut self, delta: i64) {
        let count = self.browse_count();
        if delta > 0 {
            self.switcher.toggle_forward(count);
        } else {
            self.switcher.toggle_backward(count);
        }
        let trigger = self.switcher.trigger();
        if trigger != Trigger::None {
            // stepping also surfaces the overlay if the delayed open skipped it
            let _ = self.overlay_tx.send(OverlayEvent::Open { trigger });
        }
    }

    fn handle_toggle_off(&mut self) {
        let trigger = self.switcher.trigger();
        let count = self.browse_count();
        match self.switcher.toggle_off(count) {
            Some(index) => {
                let _ = self.overlay_tx.send(OverlayEvent::Close);
                if let Some(target) = self.target_at(trigger, index) {
                    self.focus_target(target);
                }
            }
            None if self.switcher.trigger() != Trigger::None => {
                // the spurious first toggle-off; state was left untouched
                debug!("absorbing spurious initial toggle-off");
            }
            None => {
                // deactivated over an empty list: close, nothing to focus
                if trigger != Trigger::None {
                    let _ = self.overlay_tx.send(OverlayEvent::Close);
                }
            }
        }
    }

    // --- pointer resolution and actions ---

    fn browse_count(&mut self) -> usize {
        let trigger = self.switcher.trigger();
        self.manager.items_count(&self.registry, trigger, BrowseMode::Browsing, "")
    }

    fn target_at(&mut self, trigger: Trigger, index: usize) -> Option<SwitchTarget> {
        self.manager.raw_expansion(&self.registry, trigger).get(index).copied()
    }

    fn owning_app(&self, target: SwitchTarget) -> Option<AppKey> {
        match target {
            SwitchTarget::App(key) => Some(key),
            SwitchTarget::Window(key) => self.registry.window(key).map(|window| window.app),
        }
    }

    fn focus_target(&mut self, target: SwitchTarget) {
        let handle = match target {
            SwitchTarget::Window(key) => self.registry.window(key).map(|window| window.handle),
            SwitchTarget::App(key) => {
                // focusing an application means focusing its most recent window
                self.registry
                    .members(CollectionId::AppWindows(key))
                    .first()
                    .and_then(|entity| match entity {
                        EntityKey::Window(window) => Some(*window),
                        EntityKey::App(_) => None,
                    })
                    .and_then(|window| self.registry.window(window))
                    .map(|window| window.handle)
            }
        };
        if let Some(handle) = handle {
            self.gateway.command(move |api| api.raise(handle));
        }
    }

    fn pointer_action(&mut self, action: PointerAction) {
        let trigger = self.switcher.trigger();
        let count = self.browse_count();
        if count == 0 {
            return;
        }
        let index = self.switcher.active_index(count);
        let Some(target) = self.target_at(trigger, index) else { return };
        match action {
            PointerAction::Hide => self.toggle_hidden(target),
            PointerAction::Minimize => match target {
                SwitchTarget::Window(key) => {
                    if let Some(window) = self.registry.window(key) {
                        let handle = window.handle;
                        self.gateway.command(move |api| api.set_minimized(handle, true));
                    }
                }
                // applications have no miniaturize of their own; hide instead
                SwitchTarget::App(_) => self.toggle_hidden(target),
            },
            PointerAction::Close => match target {
                SwitchTarget::Window(key) => {
                    if let Some(window) = self.registry.window(key) {
                        let handle = window.handle;
                        self.gateway.command(move |api| api.press_close_button(handle));
                    }
                }
                SwitchTarget::App(key) => self.quit_app(key),
            },
            PointerAction::Quit => {
                if let Some(app_key) = self.owning_app(target) {
                    self.quit_app(app_key);
                }
            }
        }
    }

    fn toggle_hidden(&mut self, target: SwitchTarget) {
        let Some(app_key) = self.owning_app(target) else { return };
        let Some(app) = self.registry.app(app_key) else { return };
        let handle = app.handle;
        let hidden = app.is_hidden;
        self.gateway.command(move |api| api.set_app_hidden(handle, !hidden));
    }

    /// Asks the application to quit; a second request while the first is
    /// still pending escalates to force-terminate.
    fn quit_app(&mut self, app_key: AppKey) {
        let Some(app) = self.registry.app_mut(app_key) else { return };
        let force = app.quit_requested;
        app.quit_requested = true;
        let handle = app.handle;
        self.gateway.command(move |api| api.terminate(handle, force));
    }

    // --- presentation queries ---

    fn handle_query(&mut self, request: QueryRequest) {
        let trigger = self.switcher.trigger();
        match request {
            QueryRequest::ItemsCount { view, response } => {
                let count =
                    self.manager.items_count(&self.registry, trigger, view.mode, &view.filter);
                let _ = response.send(count);
            }
            QueryRequest::Items { view, response } => {
                let items = self.manager.items(&self.registry, trigger, view.mode, &view.filter);
                let _ = response.send(items);
            }
            QueryRequest::ItemsSlice { view, range, response } => {
                let slice = self.manager.items_slice(
                    &self.registry,
                    trigger,
                    view.mode,
                    &view.filter,
                    range,
                );
                let _ = response.send(slice);
            }
            QueryRequest::ActiveIndex { view, response } => {
                let count =
                    self.manager.items_count(&self.registry, trigger, view.mode, &view.filter);
                let _ = response.send(self.switcher.active_index(count));
            }
            QueryRequest::PageBounds { view, response } => {
                let count =
                    self.manager.items_count(&self.registry, trigger, view.mode, &view.filter);
                let _ = response.send((
                    self.switcher.page_start(count),
                    self.switcher.page_end(count),
                ));
            }
        }
    }
}
