//! Types at the boundary with the OS accessibility API.
//!
//! The engine never talks to the OS directly; everything goes through the
//! [`AxApi`] trait so the real binding lives with the embedder and tests can
//! script the OS side.

use std::sync::Arc;

use num_enum::FromPrimitive;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Process identifier of an observed application.
pub type Pid = i32;

/// Opaque handle to an accessibility element owned by another process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AxHandle(pub u64);

/// Identifier the window server assigns to an on-screen window.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowServerId(pub u32);

/// Opaque reference to an icon resource, resolved by the presentation layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct IconRef(pub u64);

/// Raw status codes reported by accessibility calls. Unknown values collapse
/// into `Failure`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromPrimitive)]
#[repr(i32)]
pub enum AxCode {
    Success = 0,
    #[num_enum(default)]
    Failure = -25200,
    IllegalArgument = -25201,
    InvalidElement = -25202,
    InvalidObserver = -25203,
    /// The target application is not responding right now. This is the only
    /// code worth retrying.
    CannotComplete = -25204,
    AttributeUnsupported = -25205,
    ActionUnsupported = -25206,
    NotificationUnsupported = -25207,
    NotImplemented = -25208,
    NotificationAlreadyRegistered = -25209,
    NotificationNotRegistered = -25210,
    ApiDisabled = -25211,
    NoValue = -25212,
}

/// How a failed call should be treated by the gateway.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// Retried in a tight loop until the gateway's timeout, then abandoned.
    #[error("accessibility call did not complete")]
    Transient,
    /// Not expected to resolve by retrying; surfaced as an absent value.
    #[error("accessibility call failed: {0:?}")]
    Permanent(AxCode),
}

impl From<AxCode> for QueryError {
    fn from(code: AxCode) -> QueryError {
        match code {
            AxCode::CannotComplete => QueryError::Transient,
            other => QueryError::Permanent(other),
        }
    }
}

impl AxCode {
    /// Registration outcomes that should not abort subscribing the remaining
    /// notification kinds.
    pub fn registration_ok(self) -> bool {
        matches!(
            self,
            AxCode::Success
                | AxCode::NotificationAlreadyRegistered
                | AxCode::NotificationUnsupported
                | AxCode::NotImplemented
        )
    }
}

/// One lifecycle notification kind observable on an accessibility element.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    WindowCreated,
    ElementDestroyed,
    TitleChanged,
    WindowMiniaturized,
    WindowDeminiaturized,
    ApplicationActivated,
    ApplicationHidden,
    ApplicationShown,
    FocusedWindowChanged,
    MainWindowChanged,
}

bitflags::bitflags! {
    /// Set of notification kinds for a single `subscribe` call.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct NotificationKinds: u16 {
        const WINDOW_CREATED = 1 << 0;
        const ELEMENT_DESTROYED = 1 << 1;
        const TITLE_CHANGED = 1 << 2;
        const WINDOW_MINIATURIZED = 1 << 3;
        const WINDOW_DEMINIATURIZED = 1 << 4;
        const APPLICATION_ACTIVATED = 1 << 5;
        const APPLICATION_HIDDEN = 1 << 6;
        const APPLICATION_SHOWN = 1 << 7;
        const FOCUSED_WINDOW_CHANGED = 1 << 8;
        const MAIN_WINDOW_CHANGED = 1 << 9;
    }
}

impl NotificationKind {
    pub fn bit(self) -> NotificationKinds {
        match self {
            NotificationKind::WindowCreated => NotificationKinds::WINDOW_CREATED,
            NotificationKind::ElementDestroyed => NotificationKinds::ELEMENT_DESTROYED,
            NotificationKind::TitleChanged => NotificationKinds::TITLE_CHANGED,
            NotificationKind::WindowMiniaturized => NotificationKinds::WINDOW_MINIATURIZED,
            NotificationKind::WindowDeminiaturized => NotificationKinds::WINDOW_DEMINIATURIZED,
            NotificationKind::ApplicationActivated => NotificationKinds::APPLICATION_ACTIVATED,
            NotificationKind::ApplicationHidden => NotificationKinds::APPLICATION_HIDDEN,
            NotificationKind::ApplicationShown => NotificationKinds::APPLICATION_SHOWN,
            NotificationKind::FocusedWindowChanged => NotificationKinds::FOCUSED_WINDOW_CHANGED,
            NotificationKind::MainWindowChanged => NotificationKinds::MAIN_WINDOW_CHANGED,
        }
    }
}

impl NotificationKinds {
    /// Kinds registered on an application element when it is first tracked.
    pub const APPLICATION: NotificationKinds = NotificationKinds::APPLICATION_ACTIVATED
        .union(NotificationKinds::MAIN_WINDOW_CHANGED)
        .union(NotificationKinds::FOCUSED_WINDOW_CHANGED)
        .union(NotificationKinds::WINDOW_CREATED)
        .union(NotificationKinds::APPLICATION_HIDDEN)
        .union(NotificationKinds::APPLICATION_SHOWN);

    /// Kinds registered on each window element.
    pub const WINDOW: NotificationKinds = NotificationKinds::ELEMENT_DESTROYED
        .union(NotificationKinds::TITLE_CHANGED)
        .union(NotificationKinds::WINDOW_MINIATURIZED)
        .union(NotificationKinds::WINDOW_DEMINIATURIZED);

    pub fn kinds(self) -> impl Iterator<Item = NotificationKind> {
        NotificationKind::iter().filter(move |kind| self.contains(kind.bit()))
    }
}

/// A delivered notification, still on the OS notification thread.
#[derive(Debug, Copy, Clone)]
pub struct AxNotification {
    pub kind: NotificationKind,
    pub pid: Pid,
    pub element: AxHandle,
}

/// Callback invoked by the OS notification machinery on its own thread.
pub type NotificationSink = Arc<dyn Fn(AxNotification) + Send + Sync>;

/// Everything the engine needs from the accessibility layer.
///
/// Attribute reads return the raw status code on failure so the gateway can
/// decide whether to retry. Actions are fire-and-forget; their failures only
/// show up as the absence of a follow-up notification.
pub trait AxApi: Send + Sync + 'static {
    fn title(&self, element: AxHandle) -> Result<String, AxCode>;
    fn windows(&self, app: AxHandle) -> Result<Vec<AxHandle>, AxCode>;
    fn window_server_id(&self, element: AxHandle) -> Result<WindowServerId, AxCode>;
    fn is_minimized(&self, element: AxHandle) -> Result<bool, AxCode>;
    fn focused_window(&self, app: AxHandle) -> Result<AxHandle, AxCode>;

    /// Registers one notification kind on `target`. Delivery happens on a
    /// thread owned by the OS notification mechanism, never the caller's.
    fn add_notification(
        &self,
        target: AxHandle,
        pid: Pid,
        kind: NotificationKind,
        sink: NotificationSink,
    ) -> AxCode;

    fn raise(&self, element: AxHandle);
    fn set_minimized(&self, element: AxHandle, minimized: bool);
    fn press_close_button(&self, element: AxHandle);
    fn set_app_hidden(&self, app: AxHandle, hidden: bool);
    fn terminate(&self, app: AxHandle, force: bool);
}
