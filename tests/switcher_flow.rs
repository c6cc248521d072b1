//! Drives the engine through its public surface: a scripted desktop feeds
//! lifecycle events in, queries and overlay events come out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use carousel::actor::{self, reactor};
use carousel::sys::ax::{NotificationKind, NotificationSink};
use carousel::{
    AppInfo, AxApi, AxCode, AxHandle, BrowseMode, Config, Event, Gateway, Intent, OverlayEvent,
    Pid, QueryRequest, Reactor, Trigger, ViewContext, WindowServerId,
};
use tokio::sync::oneshot;
use tokio::time::timeout;

/// A desktop whose windows and titles are plain maps.
#[derive(Default)]
struct DesktopSim {
    windows: Mutex<HashMap<u64, Vec<u64>>>,
    titles: Mutex<HashMap<u64, String>>,
    sinks: Mutex<Vec<(AxHandle, NotificationKind, NotificationSink)>>,
    raised: Mutex<Vec<u64>>,
}

impl DesktopSim {
    fn set_title(&self, window: u64, title: &str) {
        self.titles.lock().unwrap().insert(window, title.to_string());
    }

    /// Delivers a notification the way the OS would: from a foreign thread.
    fn notify(&self, target: u64, pid: Pid, kind: NotificationKind) {
        let sinks = self.sinks.lock().unwrap();
        for (registered, registered_kind, sink) in sinks.iter() {
            if *registered == AxHandle(target) && *registered_kind == kind {
                let sink = Arc::clone(sink);
                std::thread::spawn(move || {
                    sink(carousel::sys::ax::AxNotification {
                        kind,
                        pid,
                        element: AxHandle(target),
                    });
                });
            }
        }
    }
}

impl AxApi for DesktopSim {
    fn title(&self, element: AxHandle) -> Result<String, AxCode> {
        self.titles.lock().unwrap().get(&element.0).cloned().ok_or(AxCode::NoValue)
    }

    fn windows(&self, app: AxHandle) -> Result<Vec<AxHandle>, AxCode> {
        Ok(self
            .windows
            .lock()
            .unwrap()
            .get(&app.0)
            .map(|handles| handles.iter().map(|h| AxHandle(*h)).collect())
            .unwrap_or_default())
    }

    fn window_server_id(&self, element: AxHandle) -> Result<WindowServerId, AxCode> {
        Ok(WindowServerId(element.0 as u32))
    }

    fn is_minimized(&self, _element: AxHandle) -> Result<bool, AxCode> { Ok(false) }

    fn focused_window(&self, app: AxHandle) -> Result<AxHandle, AxCode> {
        self.windows(app)?.first().copied().ok_or(AxCode::NoValue)
    }

    fn add_notification(
        &self,
        target: AxHandle,
        _pid: Pid,
        kind: NotificationKind,
        sink: NotificationSink,
    ) -> AxCode {
        self.sinks.lock().unwrap().push((target, kind, sink));
        AxCode::Success
    }

    fn raise(&self, element: AxHandle) { self.raised.lock().unwrap().push(element.0); }

    fn set_minimized(&self, _element: AxHandle, _minimized: bool) {}
    fn press_close_button(&self, _element: AxHandle) {}
    fn set_app_hidden(&self, _app: AxHandle, _hidden: bool) {}
    fn terminate(&self, _app: AxHandle, _force: bool) {}
}

struct Harness {
    desktop: Arc<DesktopSim>,
    events_tx: reactor::Sender,
    overlay_rx: actor::Receiver<OverlayEvent>,
}

fn launch_info(pid: Pid, name: &str, handle: u64) -> AppInfo {
    AppInfo {
        pid,
        bundle_id: Some(format!("sim.{name}")),
        name: name.to_string(),
        handle: AxHandle(handle),
        icon: None,
        dock_visible: true,
        is_hidden: false,
    }
}

fn harness() -> Harness {
    let desktop = Arc::new(DesktopSim::default());
    let config = Config::default();
    let gateway = Gateway::new(Arc::clone(&desktop) as Arc<dyn AxApi>, config.gateway.clone());
    let (events_tx, events_rx) = actor::channel();
    let (overlay_tx, overlay_rx) = actor::channel();
    let reactor = Reactor::new(config, gateway, events_rx, events_tx.clone(), overlay_tx);
    tokio::spawn(reactor.run());
    Harness { desktop, events_tx, overlay_rx }
}

impl Harness {
    async fn items_count(&self, view: ViewContext) -> usize {
        let (tx, rx) = oneshot::channel();
        self.events_tx
            .send(Event::Query(QueryRequest::ItemsCount { view, response: tx }))
            .unwrap();
        timeout(Duration::from_secs(2), rx).await.unwrap().unwrap()
    }

    async fn titles(&self, view: ViewContext) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        self.events_tx
            .send(Event::Query(QueryRequest::Items { view, response: tx }))
            .unwrap();
        let items = timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        items
            .iter()
            .map(|item| {
                item.runs
                    .iter()
                    .map(|run| match run {
                        carousel::switch::fuzzy::MatchRun::Matched(text)
                        | carousel::switch::fuzzy::MatchRun::Unmatched(text) => text.as_str(),
                    })
                    .collect()
            })
            .collect()
    }

    async fn wait_for_count(&self, view: ViewContext, expected: usize) {
        for _ in 0..200 {
            if self.items_count(view.clone()).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("window count never reached {expected}");
    }

    async fn next_overlay(&mut self) -> OverlayEvent {
        timeout(Duration::from_secs(2), self.overlay_rx.recv())
            .await
            .expect("timed out waiting for an overlay event")
            .map(|(_, event)| event)
            .expect("overlay channel closed")
    }
}

fn browsing() -> ViewContext {
    ViewContext { mode: BrowseMode::Browsing, filter: String::new() }
}

fn searching(filter: &str) -> ViewContext {
    ViewContext { mode: BrowseMode::Searching, filter: filter.to_string() }
}

#[tokio::test]
async fn discovery_search_and_switch_round_trip() {
    let mut harness = harness();
    let desktop = Arc::clone(&harness.desktop);

    desktop.windows.lock().unwrap().insert(100, vec![10, 11]);
    desktop.set_title(10, "island notes");
    desktop.set_title(11, "harbor log");
    desktop.windows.lock().unwrap().insert(200, vec![20]);
    desktop.set_title(20, "tide charts");

    harness.events_tx.send(Event::ApplicationLaunched(launch_info(1, "Editor", 100))).unwrap();
    harness.events_tx.send(Event::ApplicationLaunched(launch_info(2, "Browser", 200))).unwrap();
    harness.wait_for_count(browsing(), 0).await; // trigger is still None
    harness.events_tx.send(Event::Intent(Intent::ToggleOn(Trigger::InterWindow))).unwrap();
    assert_eq!(harness.next_overlay().await, OverlayEvent::Open { trigger: Trigger::InterWindow });
    harness.wait_for_count(browsing(), 3).await;

    // browsing shows live MRU order: the browser window was attached last
    let titles = harness.titles(browsing()).await;
    assert_eq!(titles[0], "tide charts");
    assert_eq!(titles.len(), 3);

    // the search corpus is filtered but keeps relative order
    assert_eq!(harness.titles(searching("island")).await, vec!["island notes"]);
    assert_eq!(harness.items_count(searching("zzz")).await, 0);

    // a title change flows: notification -> retried query -> registry
    desktop.set_title(11, "island ferries");
    desktop.notify(11, 1, NotificationKind::TitleChanged);
    for _ in 0..200 {
        if harness.items_count(searching("island")).await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(harness.items_count(searching("island")).await, 2);

    // first toggle-off is spurious; the second focuses the pointed window
    harness.events_tx.send(Event::Intent(Intent::ToggleOff)).unwrap();
    harness.events_tx.send(Event::Intent(Intent::ToggleOn(Trigger::InterWindow))).unwrap();
    assert_eq!(harness.next_overlay().await, OverlayEvent::Open { trigger: Trigger::InterWindow });
    harness.events_tx.send(Event::Intent(Intent::ToggleOff)).unwrap();
    assert_eq!(harness.next_overlay().await, OverlayEvent::Close);

    for _ in 0..200 {
        if !desktop.raised.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let raised = desktop.raised.lock().unwrap().clone();
    assert_eq!(raised.len(), 1, "exactly one focus action should have fired");

    // termination cascades and browsing reflects it immediately
    harness.events_tx.send(Event::ApplicationTerminated(1)).unwrap();
    harness.events_tx.send(Event::Intent(Intent::ToggleOn(Trigger::InterWindow))).unwrap();
    harness.wait_for_count(browsing(), 1).await;
    assert_eq!(harness.titles(browsing()).await, vec!["tide charts"]);
}
