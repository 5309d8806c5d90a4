use crate::render::{Markup, Rendered};
use crate::view::CardViewModel;
use serde::Serialize;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Idle,
    Loading,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRefresh {
    #[default]
    Stopped,
    Running,
}

impl AutoRefresh {
    pub fn toggle_label(self) -> &'static str {
        match self {
            AutoRefresh::Stopped => "Start Auto-refresh",
            AutoRefresh::Running => "Stop Auto-refresh",
        }
    }

    pub fn toggle_icon(self) -> &'static str {
        match self {
            AutoRefresh::Stopped => "fa fa-play",
            AutoRefresh::Running => "fa fa-pause",
        }
    }
}

#[derive(Debug, Default)]
pub struct PollState {
    pub mode: Mode,
    pub auto_refresh: AutoRefresh,
    timer: Option<JoinHandle<()>>,
    latest_seq: u64,
}

impl PollState {
    /// Issues a new request number and enters `Loading`.
    pub fn begin_request(&mut self) -> u64 {
        self.latest_seq += 1;
        self.mode = Mode::Loading;
        self.latest_seq
    }

    /// Returns whether the completed request is still the latest one; only
    /// then does the mode return to `Idle` and the result get applied.
    pub fn finish_request(&mut self, seq: u64) -> bool {
        if seq != self.latest_seq {
            return false;
        }
        self.mode = Mode::Idle;
        true
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest_seq
    }

    pub fn start_timer(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.timer.replace(handle) {
            previous.abort();
        }
        self.auto_refresh = AutoRefresh::Running;
    }

    pub fn stop_timer(&mut self) -> bool {
        self.auto_refresh = AutoRefresh::Stopped;
        match self.timer.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }
}

/// What the host presentation layer shows.
#[derive(Debug, Clone, Default)]
pub struct Display {
    pub markup: Option<Markup>,
    pub status_line: Option<String>,
    pub error: Option<String>,
    pub cards: Vec<CardViewModel>,
}

impl Display {
    pub fn apply(&mut self, rendered: Rendered) {
        self.markup = Some(rendered.markup);
        self.cards = rendered.cards;
        if let Some(line) = rendered.status_line {
            self.status_line = Some(line);
        }
    }

    pub fn show_error(&mut self, message: String) {
        self.error = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[derive(Debug, Default)]
pub struct WidgetState {
    pub poll: PollState,
    pub display: Display,
}
