// src/notify.rs - Single-slot transient notices

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const NODE_DEPLOYED: &str = "NODE DEPLOYED";
pub const DEPLOY_FAILED: &str = "FAILED";
pub const UNREACHABLE: &str = "UNREACHABLE";
pub const TERMINATED: &str = "TERMINATED";
pub const TERMINATE_FAILED: &str = "ERROR";
pub const LINK_COPIED: &str = "LINK COPIED";
pub const COPY_FAILED: &str = "COPY FAILED";
pub const QR_READY: &str = "QR READY";
pub const QR_FAILED: &str = "QR FAILED";

pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// A message paired with the instant it stops being shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl Notice {
    pub fn is_visible_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Holds at most one notice. A newer notice replaces the visible one; nothing queues.
pub struct Notifier {
    slot: Mutex<Option<Notice>>,
    ttl: Duration,
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn notify(&self, message: impl Into<String>, kind: NoticeKind) -> Notice {
        self.notify_at(message, kind, Instant::now())
    }

    pub fn notify_at(&self, message: impl Into<String>, kind: NoticeKind, now: Instant) -> Notice {
        let notice = Notice {
            message: message.into(),
            kind,
            issued_at: now,
            expires_at: now + self.ttl,
        };

        match kind {
            NoticeKind::Success => info!(event = "notice", text = %notice.message, "Notice shown."),
            NoticeKind::Error => warn!(event = "notice", text = %notice.message, "Error notice shown."),
        }

        *self.lock() = Some(notice.clone());
        notice
    }

    pub fn current(&self) -> Option<Notice> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> Option<Notice> {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|notice| !notice.is_visible_at(now)) {
            *slot = None;
        }
        slot.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Notice>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_TTL)
    }
}
