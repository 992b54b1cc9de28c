// src/lib.rs
pub mod api;
pub mod config;
pub mod link;
pub mod logging;
pub mod notify;
pub mod panel;
pub mod present;
pub mod render;
pub mod shutdown;
pub mod snapshot;
pub mod types;

pub use api::{ApiError, HttpPanelApi, PanelApi};
pub use config::*;
pub use link::{build_connection_uri, LinkParams, LinkPolicy};
pub use logging::initialize_tracing;
pub use notify::{Notice, NoticeKind, Notifier};
pub use panel::{DeployForm, DeployOutcome, PanelClient, Poller, RefreshOutcome, TerminateOutcome};
pub use present::{CommandPresenter, PresentError, Presenter};
pub use shutdown::{wait_for_shutdown_signal, ShutdownSignal};
pub use snapshot::{ClientState, SnapshotStore};
pub use types::*;
