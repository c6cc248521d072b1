pub mod entities;
pub mod registry;

pub use entities::{AppInfo, AppKey, Application, EntityKey, Window, WindowKey, WindowSeed};
pub use registry::{CollectionId, Memberships, Registry};
