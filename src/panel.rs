// src/panel.rs - Dashboard sync and control client

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiError, PanelApi};
use crate::link::{build_connection_uri, LinkPolicy};
use crate::notify::{self, Notice, NoticeKind, Notifier};
use crate::present::Presenter;
use crate::snapshot::{Applied, ClientState, SnapshotStore};
use crate::types::InboundConfig;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    Failed,
    /// A newer refresh already published its result.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Port or path was empty; nothing was sent.
    Incomplete,
    Deployed,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    Terminated,
    Failed,
}

/// Input fields of the "new node" form. Cleared only after a successful deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployForm {
    pub port: String,
    pub path: String,
}

impl DeployForm {
    pub fn new(port: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            path: path.into(),
        }
    }

    pub fn clear(&mut self) {
        self.port.clear();
        self.path.clear();
    }
}

/// Prefix `/` onto a path that lacks one.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

pub struct PanelClient {
    api: Arc<dyn PanelApi>,
    presenter: Arc<dyn Presenter>,
    links: LinkPolicy,
    store: SnapshotStore,
    notifier: Notifier,
    stale_after: Duration,
}

impl PanelClient {
    pub fn new(api: Arc<dyn PanelApi>, presenter: Arc<dyn Presenter>, links: LinkPolicy) -> Self {
        Self {
            api,
            presenter,
            links,
            store: SnapshotStore::new(),
            notifier: Notifier::default(),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_notice_ttl(mut self, ttl: Duration) -> Self {
        self.notifier = Notifier::new(ttl);
        self
    }

    pub fn links(&self) -> &LinkPolicy {
        &self.links
    }

    pub fn snapshot(&self) -> Arc<ClientState> {
        self.store.current()
    }

    pub fn find_inbound(&self, port: u16) -> Option<InboundConfig> {
        self.store.current().data.inbound(port).cloned()
    }

    /// Fetch the backend state and publish it, or flag the backend offline.
    pub async fn refresh(&self) -> RefreshOutcome {
        let ticket = self.store.begin();

        let (applied, outcome) = match self.api.fetch_state().await {
            Ok(data) => {
                debug!(
                    ticket = ticket.id(),
                    inbounds = data.inbounds.len(),
                    logs = data.logs.len(),
                    "State fetched."
                );
                (self.store.apply_success(ticket, data, Instant::now()), RefreshOutcome::Applied)
            }
            Err(e) => {
                warn!(event = "refresh.failed", ticket = ticket.id(), error = %e, "Backend refresh failed.");
                (self.store.apply_failure(ticket), RefreshOutcome::Failed)
            }
        };

        match applied {
            Applied::Published => outcome,
            Applied::Superseded => {
                debug!(ticket = ticket.id(), "Discarding response of a superseded refresh.");
                RefreshOutcome::Superseded
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    pub fn is_stale_at(&self, now: Instant) -> bool {
        self.store.current().is_stale_at(now, self.stale_after)
    }

    /// Create an inbound from `form`. The form is cleared only on success.
    pub async fn deploy(&self, form: &mut DeployForm) -> DeployOutcome {
        if form.port.is_empty() || form.path.is_empty() {
            return DeployOutcome::Incomplete;
        }

        let path = normalize_path(&form.path);

        match self.api.create_inbound(&form.port, &path).await {
            Ok(()) => {
                info!(event = "inbound.deployed", port = %form.port, path = %path, "Inbound deployed.");
                form.clear();
                self.notifier.notify(notify::NODE_DEPLOYED, NoticeKind::Success);
                self.refresh().await;
                DeployOutcome::Deployed
            }
            Err(e) => {
                warn!(event = "inbound.deploy_failed", port = %form.port, error = %e, "Inbound deploy failed.");
                let message = match &e {
                    ApiError::Unreachable(_) => notify::UNREACHABLE.to_string(),
                    _ => e.detail().unwrap_or(notify::DEPLOY_FAILED).to_string(),
                };
                self.notifier.notify(message.clone(), NoticeKind::Error);
                DeployOutcome::Failed { message }
            }
        }
    }

    /// Remove the inbound listening on `port`.
    pub async fn terminate(&self, port: u16) -> TerminateOutcome {
        match self.api.delete_inbound(port).await {
            Ok(()) => {
                info!(event = "inbound.terminated", port, "Inbound terminated.");
                self.notifier.notify(notify::TERMINATED, NoticeKind::Success);
                self.refresh().await;
                TerminateOutcome::Terminated
            }
            Err(e) => {
                warn!(event = "inbound.terminate_failed", port, error = %e, "Inbound terminate failed.");
                self.notifier.notify(notify::TERMINATE_FAILED, NoticeKind::Error);
                TerminateOutcome::Failed
            }
        }
    }

    pub fn connection_uri(&self, inbound: &InboundConfig) -> String {
        build_connection_uri(inbound, &self.links)
    }

    pub async fn present_qr(&self, inbound: &InboundConfig) -> bool {
        let uri = self.connection_uri(inbound);
        match self.presenter.show_qr(&uri).await {
            Ok(()) => {
                self.notifier.notify(notify::QR_READY, NoticeKind::Success);
                true
            }
            Err(e) => {
                warn!(event = "qr.failed", port = inbound.port, error = %e, "QR presentation failed.");
                self.notifier.notify(notify::QR_FAILED, NoticeKind::Error);
                false
            }
        }
    }

    pub async fn copy_text(&self, text: &str) -> bool {
        match self.presenter.copy(text).await {
            Ok(()) => {
                self.notifier.notify(notify::LINK_COPIED, NoticeKind::Success);
                true
            }
            Err(e) => {
                warn!(event = "clipboard.failed", error = %e, "Clipboard copy failed.");
                self.notifier.notify(notify::COPY_FAILED, NoticeKind::Error);
                false
            }
        }
    }

    pub fn notify(&self, message: impl Into<String>, kind: NoticeKind) -> Notice {
        self.notifier.notify(message, kind)
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notifier.current()
    }

    pub fn notice_at(&self, now: Instant) -> Option<Notice> {
        self.notifier.current_at(now)
    }

    /// Refresh now and then once per `period` until the returned handle is stopped or dropped.
    ///
    /// Each refresh runs on its own task, so a slow response never holds back the
    /// next tick; tickets decide which overlapping response wins.
    pub fn spawn_poller(self: &Arc<Self>, period: Duration) -> Poller {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let client = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(event = "poller.start", period_ms = period.as_millis() as u64, "Polling started.");

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        info!(event = "poller.stop", "Polling stopped.");
                        break;
                    }
                    _ = ticker.tick() => {
                        let client = client.clone();
                        tokio::spawn(async move {
                            client.refresh().await;
                        });
                    }
                }
            }
        });

        Poller {
            token,
            handle: Some(handle),
        }
    }
}

/// Owns the polling timer. Dropping it cancels the timer; in-flight requests finish on their own.
pub struct Poller {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the timer and wait for the polling loop to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Polling task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkParams;
    use crate::present::PresentError;
    use crate::types::{DashboardData, SampleStat};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeApi {
        state: Mutex<DashboardData>,
        fetch_calls: AtomicUsize,
        fetch_offline: AtomicBool,
        created: Mutex<Vec<(String, String)>>,
        create_rejection: Mutex<Option<Option<String>>>,
        create_offline: AtomicBool,
        deleted: Mutex<Vec<u16>>,
        delete_rejected: AtomicBool,
    }

    impl FakeApi {
        fn with_ports(ports: &[u16]) -> Self {
            let api = FakeApi::default();
            for port in ports {
                api.state.lock().unwrap().inbounds.push(inbound(*port));
            }
            api
        }
    }

    fn inbound(port: u16) -> InboundConfig {
        InboundConfig {
            port,
            path: "/ws".to_string(),
            uuid: format!("uuid-{}", port),
            stats: vec![SampleStat { up: 1.0, down: 2.0, total_down: 2048.0, total_up: 1.0 }],
            online: Some(true),
        }
    }

    #[async_trait]
    impl PanelApi for FakeApi {
        async fn fetch_state(&self) -> Result<DashboardData, ApiError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fetch_offline.load(Ordering::SeqCst) {
                return Err(ApiError::Unreachable("connection refused".to_string()));
            }
            Ok(self.state.lock().unwrap().clone())
        }

        async fn create_inbound(&self, port: &str, path: &str) -> Result<(), ApiError> {
            self.created.lock().unwrap().push((port.to_string(), path.to_string()));
            if self.create_offline.load(Ordering::SeqCst) {
                return Err(ApiError::Unreachable("connection refused".to_string()));
            }
            if let Some(detail) = self.create_rejection.lock().unwrap().clone() {
                return Err(ApiError::Rejected { status: 400, detail });
            }
            let port: u16 = port.parse().map_err(|_| ApiError::Rejected { status: 422, detail: None })?;
            let mut ib = inbound(port);
            ib.path = path.to_string();
            self.state.lock().unwrap().inbounds.push(ib);
            Ok(())
        }

        async fn delete_inbound(&self, port: u16) -> Result<(), ApiError> {
            self.deleted.lock().unwrap().push(port);
            if self.delete_rejected.load(Ordering::SeqCst) {
                return Err(ApiError::Rejected { status: 500, detail: None });
            }
            self.state.lock().unwrap().inbounds.retain(|ib| ib.port != port);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        fail: AtomicBool,
        shown: Mutex<Vec<String>>,
        copied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Presenter for RecordingPresenter {
        async fn show_qr(&self, uri: &str) -> Result<(), PresentError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PresentError::NotConfigured);
            }
            self.shown.lock().unwrap().push(uri.to_string());
            Ok(())
        }

        async fn copy(&self, text: &str) -> Result<(), PresentError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PresentError::NotConfigured);
            }
            self.copied.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn client(api: Arc<FakeApi>, presenter: Arc<RecordingPresenter>) -> PanelClient {
        PanelClient::new(api, presenter, LinkPolicy::direct("198.51.100.4", LinkParams::default()))
    }

    #[tokio::test]
    async fn test_refresh_publishes_backend_state() {
        let api = Arc::new(FakeApi::with_ports(&[8080, 9090]));
        let panel = client(api.clone(), Arc::default());

        let before = Instant::now();
        assert_eq!(panel.refresh().await, RefreshOutcome::Applied);

        let state = panel.snapshot();
        assert_eq!(*state.data, *api.state.lock().unwrap());
        assert!(state.system_online);
        assert!(state.last_seen >= before);
        assert!(!panel.is_stale());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_data() {
        let api = Arc::new(FakeApi::with_ports(&[8080]));
        let panel = client(api.clone(), Arc::default());
        panel.refresh().await;

        api.fetch_offline.store(true, Ordering::SeqCst);
        assert_eq!(panel.refresh().await, RefreshOutcome::Failed);

        let state = panel.snapshot();
        assert!(!state.system_online);
        assert!(state.data.inbound(8080).is_some());
        assert!(panel.is_stale());
    }

    #[tokio::test]
    async fn test_staleness_threshold_is_configurable() {
        let api = Arc::new(FakeApi::default());
        let panel = client(api, Arc::default()).with_stale_after(Duration::from_millis(100));
        panel.refresh().await;

        let seen = panel.snapshot().last_seen;
        assert!(!panel.is_stale_at(seen + Duration::from_millis(100)));
        assert!(panel.is_stale_at(seen + Duration::from_millis(101)));
    }

    #[tokio::test]
    async fn test_deploy_with_empty_field_sends_nothing() {
        let api = Arc::new(FakeApi::default());
        let panel = client(api.clone(), Arc::default());

        let mut no_port = DeployForm::new("", "/x");
        let mut no_path = DeployForm::new("8080", "");
        assert_eq!(panel.deploy(&mut no_port).await, DeployOutcome::Incomplete);
        assert_eq!(panel.deploy(&mut no_path).await, DeployOutcome::Incomplete);

        assert!(api.created.lock().unwrap().is_empty());
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(no_path, DeployForm::new("8080", ""));
        assert!(panel.notice().is_none());
    }

    #[tokio::test]
    async fn test_deploy_prefixes_path_and_refreshes() {
        let api = Arc::new(FakeApi::default());
        let panel = client(api.clone(), Arc::default());

        let mut form = DeployForm::new("8080", "x");
        assert_eq!(panel.deploy(&mut form).await, DeployOutcome::Deployed);

        assert_eq!(
            *api.created.lock().unwrap(),
            vec![("8080".to_string(), "/x".to_string())]
        );
        assert_eq!(form, DeployForm::default());
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(panel.find_inbound(8080).unwrap().path, "/x");
        assert_eq!(panel.notice().unwrap().message, notify::NODE_DEPLOYED);
    }

    #[tokio::test]
    async fn test_deploy_rejection_shows_server_detail() {
        let api = Arc::new(FakeApi::default());
        *api.create_rejection.lock().unwrap() = Some(Some("port in use".to_string()));
        let panel = client(api.clone(), Arc::default());

        let mut form = DeployForm::new("8080", "/x");
        let outcome = panel.deploy(&mut form).await;

        assert_eq!(outcome, DeployOutcome::Failed { message: "port in use".to_string() });
        let notice = panel.notice().unwrap();
        assert_eq!(notice.message, "port in use");
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(form, DeployForm::new("8080", "/x"));
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deploy_rejection_without_detail_uses_fallback() {
        let api = Arc::new(FakeApi::default());
        *api.create_rejection.lock().unwrap() = Some(None);
        let panel = client(api, Arc::default());

        let mut form = DeployForm::new("8080", "/x");
        panel.deploy(&mut form).await;
        assert_eq!(panel.notice().unwrap().message, notify::DEPLOY_FAILED);
    }

    #[tokio::test]
    async fn test_deploy_unreachable() {
        let api = Arc::new(FakeApi::default());
        api.create_offline.store(true, Ordering::SeqCst);
        let panel = client(api, Arc::default());

        let mut form = DeployForm::new("8080", "/x");
        assert_eq!(
            panel.deploy(&mut form).await,
            DeployOutcome::Failed { message: notify::UNREACHABLE.to_string() }
        );
        assert_eq!(form.port, "8080");
    }

    #[tokio::test]
    async fn test_terminate_removes_inbound_on_next_refresh() {
        let api = Arc::new(FakeApi::with_ports(&[8080, 9090]));
        let panel = client(api.clone(), Arc::default());
        panel.refresh().await;

        assert_eq!(panel.terminate(8080).await, TerminateOutcome::Terminated);

        let state = panel.snapshot();
        assert!(state.data.inbounds.iter().all(|ib| ib.port != 8080));
        assert!(state.data.inbound(9090).is_some());
        assert_eq!(panel.notice().unwrap().message, notify::TERMINATED);
    }

    #[tokio::test]
    async fn test_terminate_failure_notifies_generic_error() {
        let api = Arc::new(FakeApi::with_ports(&[8080]));
        api.delete_rejected.store(true, Ordering::SeqCst);
        let panel = client(api.clone(), Arc::default());

        assert_eq!(panel.terminate(8080).await, TerminateOutcome::Failed);
        assert_eq!(panel.notice().unwrap().message, notify::TERMINATE_FAILED);
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_terminate_sends_every_request() {
        let api = Arc::new(FakeApi::with_ports(&[8080]));
        let panel = client(api.clone(), Arc::default());

        let (first, second) = tokio::join!(panel.terminate(8080), panel.terminate(8080));
        assert_eq!(first, TerminateOutcome::Terminated);
        assert_eq!(second, TerminateOutcome::Terminated);
        assert_eq!(*api.deleted.lock().unwrap(), vec![8080, 8080]);
    }

    #[tokio::test]
    async fn test_qr_and_copy_report_through_notices() {
        let api = Arc::new(FakeApi::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let panel = client(api, presenter.clone());
        let ib = inbound(8080);
        let uri = panel.connection_uri(&ib);

        assert!(panel.present_qr(&ib).await);
        assert_eq!(*presenter.shown.lock().unwrap(), vec![uri.clone()]);
        assert_eq!(panel.notice().unwrap().message, notify::QR_READY);

        assert!(panel.copy_text(&uri).await);
        assert_eq!(panel.notice().unwrap().message, notify::LINK_COPIED);

        presenter.fail.store(true, Ordering::SeqCst);
        assert!(!panel.present_qr(&ib).await);
        assert_eq!(panel.notice().unwrap().message, notify::QR_FAILED);
        assert!(!panel.copy_text(&uri).await);
        assert_eq!(panel.notice().unwrap().message, notify::COPY_FAILED);
    }

    #[tokio::test]
    async fn test_connection_uri_uses_listener_port() {
        let panel = client(Arc::default(), Arc::default());
        let uri = panel.connection_uri(&inbound(8080));
        assert!(uri.starts_with("vless://uuid-8080@198.51.100.4:8080?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_refreshes_on_interval_until_stopped() {
        let api = Arc::new(FakeApi::with_ports(&[8080]));
        let panel = Arc::new(client(api.clone(), Arc::default()));

        let poller = panel.spawn_poller(DEFAULT_REFRESH_INTERVAL);
        tokio::time::sleep(Duration::from_millis(4100)).await;
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 3);
        assert!(panel.snapshot().system_online);

        poller.stop().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_poller_cancels_timer() {
        let api = Arc::new(FakeApi::default());
        let panel = Arc::new(client(api.clone(), Arc::default()));

        let poller = panel.spawn_poller(DEFAULT_REFRESH_INTERVAL);
        let token = poller.cancellation_token();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(poller);

        assert!(token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("x"), "/x");
        assert_eq!(normalize_path("/x"), "/x");
        assert_eq!(normalize_path("a/b"), "/a/b");
    }
}
