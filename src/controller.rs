use crate::fetch::{FetchError, Fetcher, RunError};
use crate::metrics::Metrics;
use crate::model::{DecodeError, StructuralError, Variant, VariantProfile};
use crate::render::render;
use crate::state::{AutoRefresh, Mode, WidgetState};
use crate::view::CardViewModel;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(30_000);

#[derive(Debug, Error)]
pub enum PollError {
    #[error("{0}")]
    Process(RunError),
    #[error("{0}")]
    Decode(DecodeError),
    #[error("{0}")]
    Structural(#[from] StructuralError),
}

impl From<FetchError> for PollError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Process(e) => PollError::Process(e),
            FetchError::Decode(e) => PollError::Decode(e),
        }
    }
}

impl PollError {
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Process(_) => "process_error",
            PollError::Decode(_) => "decode_error",
            PollError::Structural(_) => "structural_error",
        }
    }

    pub fn banner(&self, profile: &VariantProfile) -> String {
        let prefix = match self {
            PollError::Process(_) => profile.retrieve_failure,
            PollError::Decode(_) | PollError::Structural(_) => profile.parse_failure,
        };
        format!("{prefix}: {self}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Rendered,
    Failed(String),
    /// A newer request was issued while this one was in flight.
    Stale,
}

/// Serializable snapshot of what the widget currently shows.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetView {
    pub variant: Variant,
    pub mode: Mode,
    pub auto_refresh: AutoRefresh,
    pub timer_active: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub status_line: Option<String>,
    pub cards: Vec<CardViewModel>,
    pub markup_html: Option<String>,
    pub toggle_label: &'static str,
    pub toggle_icon: &'static str,
}

#[derive(Clone)]
pub struct PollController {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Fetcher,
    interval: Duration,
    metrics: Arc<Metrics>,
    state: RwLock<WidgetState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().poll.stop_timer();
    }
}

impl PollController {
    pub fn new(fetcher: Fetcher, interval: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                interval,
                metrics,
                state: RwLock::new(WidgetState::default()),
            }),
        }
    }

    pub fn variant(&self) -> Variant {
        self.inner.fetcher.variant()
    }

    /// One full fetch-and-render cycle. Failures end up in the error banner;
    /// the previously rendered cards are left in place.
    pub async fn refresh(&self) -> RefreshOutcome {
        let seq = self.begin_refresh().await;
        self.complete_refresh(seq).await
    }

    /// Enters Loading before returning; the fetch itself runs in the
    /// background and outlives the caller.
    pub async fn start_refresh(&self) -> JoinHandle<RefreshOutcome> {
        let seq = self.begin_refresh().await;
        let controller = self.clone();
        tokio::spawn(async move { controller.complete_refresh(seq).await })
    }

    async fn begin_refresh(&self) -> u64 {
        let mut guard = self.inner.state.write().await;
        guard.display.clear_error();
        let seq = guard.poll.begin_request();
        debug!(seq, "poll started");
        seq
    }

    async fn complete_refresh(&self, seq: u64) -> RefreshOutcome {
        let variant = self.variant();
        let result = match self.inner.fetcher.fetch().await {
            Ok(envelope) => render(variant, Some(&envelope))
                .map(|rendered| (rendered, envelope.entity_count()))
                .map_err(PollError::from),
            Err(err) => Err(PollError::from(err)),
        };

        let mut guard = self.inner.state.write().await;
        if !guard.poll.finish_request(seq) {
            self.inner.metrics.inc_stale_result();
            debug!(seq, latest = guard.poll.latest_seq(), "discarding stale poll result");
            return RefreshOutcome::Stale;
        }

        match result {
            Ok((rendered, count)) => {
                guard.display.apply(rendered);
                self.inner.metrics.record_success(count);
                debug!(seq, entities = count, "poll rendered");
                RefreshOutcome::Rendered
            }
            Err(err) => {
                warn!(seq, kind = err.kind(), error = %err, "poll failed");
                let banner = err.banner(variant.profile());
                guard.display.show_error(banner.clone());
                self.inner.metrics.record_failure(err.kind());
                RefreshOutcome::Failed(banner)
            }
        }
    }

    /// Starts a refresh that outlives its caller.
    pub fn spawn_refresh(&self) -> JoinHandle<RefreshOutcome> {
        let controller = self.clone();
        tokio::spawn(async move { controller.refresh().await })
    }

    pub async fn toggle_auto_refresh(&self) -> AutoRefresh {
        let mut guard = self.inner.state.write().await;
        match guard.poll.auto_refresh {
            AutoRefresh::Running => {
                guard.poll.stop_timer();
                info!("auto-refresh stopped");
            }
            AutoRefresh::Stopped => {
                guard.poll.start_timer(self.spawn_timer());
                info!(
                    interval = %humantime::format_duration(self.inner.interval),
                    "auto-refresh started"
                );
            }
        }
        let now = guard.poll.auto_refresh;
        self.inner
            .metrics
            .set_auto_refresh(now == AutoRefresh::Running);
        now
    }

    /// The first tick fires immediately, so enabling auto-refresh polls at
    /// once. Each tick detaches its refresh: aborting the timer never cancels
    /// a fetch that is already running.
    fn spawn_timer(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                PollController { inner }.spawn_refresh();
            }
        })
    }

    pub async fn teardown(&self) {
        let mut guard = self.inner.state.write().await;
        if guard.poll.stop_timer() {
            info!("auto-refresh timer cancelled on teardown");
        }
        self.inner.metrics.set_auto_refresh(false);
    }

    pub async fn view(&self) -> WidgetView {
        let guard = self.inner.state.read().await;
        let auto_refresh = guard.poll.auto_refresh;
        WidgetView {
            variant: self.variant(),
            mode: guard.poll.mode,
            auto_refresh,
            timer_active: guard.poll.has_timer(),
            loading: guard.poll.mode == Mode::Loading,
            error: guard.display.error.clone(),
            status_line: guard.display.status_line.clone(),
            cards: guard.display.cards.clone(),
            markup_html: guard.display.markup.as_ref().map(|m| m.to_html()),
            toggle_label: auto_refresh.toggle_label(),
            toggle_icon: auto_refresh.toggle_icon(),
        }
    }
}
