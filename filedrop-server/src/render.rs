//! Terminal progress rendering

use filedrop_core::SessionId;
use filedrop_engine::{ProgressEvent, ProgressObserver};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// One indicatif bar per active upload.
///
/// indicatif rate-limits redraws itself, so updating on every write is fine.
pub struct IndicatifObserver {
    mp: MultiProgress,
    bars: Mutex<HashMap<SessionId, ProgressBar>>,
}

impl IndicatifObserver {
    pub fn new() -> Self {
        Self {
            mp: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn known_total_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(
                "{prefix:.cyan} [{bar:40.cyan/blue}] {percent}% \
                 {decimal_bytes}/{decimal_total_bytes} ({decimal_bytes_per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn unknown_total_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.cyan} {decimal_bytes} ({decimal_bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    /// Number of bars currently shown
    pub fn active(&self) -> usize {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for IndicatifObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for IndicatifObserver {
    fn on_event(&self, event: ProgressEvent) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            ProgressEvent::Started { id, file_name, total } => {
                // Zero means unknown here, same as an absent total.
                let bar = match total {
                    Some(len) if len > 0 => self
                        .mp
                        .add(ProgressBar::new(len).with_style(Self::known_total_style())),
                    _ => self
                        .mp
                        .add(ProgressBar::new_spinner().with_style(Self::unknown_total_style())),
                };
                bar.set_prefix(file_name.to_string());
                bars.insert(id, bar);
            }
            ProgressEvent::Progress { id, observation } => {
                if let Some(bar) = bars.get(&id) {
                    if let Some(len) = bar.length() {
                        if observation.bytes_written > len {
                            bar.set_length(observation.bytes_written);
                        }
                    }
                    bar.set_position(observation.bytes_written);
                }
            }
            ProgressEvent::Finished { id, success, .. } => {
                if let Some(bar) = bars.remove(&id) {
                    if success {
                        bar.finish();
                    } else {
                        bar.abandon_with_message("failed");
                    }
                }
            }
        }
    }
}

/// Plain log lines for `--no-progress`
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_event(&self, event: ProgressEvent) {
        if let ProgressEvent::Started { id, file_name, total } = event {
            match total {
                Some(total) => info!("Receiving {} {} ({} bytes)", id, file_name, total),
                None => info!("Receiving {} {} (size unknown)", id, file_name),
            }
        }
    }
}
