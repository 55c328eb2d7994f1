//! Progress reporting, decoupled from whoever displays it.

use tokio::sync::mpsc::UnboundedSender;

/// One progress tick of an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub symbol: String,
    pub batch_number: u64,
    pub bars_so_far: u64,
    pub estimated_total: u64,
    /// 0..=99 while batches run; 100 only once the run has finished.
    pub percent: u8,
    pub message: String,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

/// Discards updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Forwards updates to a channel so a UI or printer task can consume them.
///
/// A closed receiver is ignored; progress is advisory.
#[derive(Debug, Clone)]
pub struct ChannelProgress(pub UnboundedSender<ProgressUpdate>);

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        let _ = self.0.send(update.clone());
    }
}

/// `min(99, batch * 100 / estimated_batches)`; 0 when nothing is estimated.
pub fn batch_percent(batch_number: u64, estimated_batches: u64) -> u8 {
    if estimated_batches == 0 {
        return 0;
    }
    (batch_number.saturating_mul(100) / estimated_batches).min(99) as u8
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;

    fn update(percent: u8) -> ProgressUpdate {
        ProgressUpdate {
            symbol: "BTCUSDT".into(),
            batch_number: 1,
            bars_so_far: 200,
            estimated_total: 1000,
            percent,
            message: String::new(),
        }
    }

    #[test]
    fn percent_is_clamped_below_completion() {
        assert_eq!(batch_percent(1, 4), 25);
        assert_eq!(batch_percent(4, 4), 99);
        assert_eq!(batch_percent(9, 4), 99);
        assert_eq!(batch_percent(3, 0), 0);
    }

    #[test]
    fn closures_and_channels_are_sinks() {
        let seen = Mutex::new(Vec::new());
        let sink = |u: &ProgressUpdate| seen.lock().push(u.percent);
        sink.on_progress(&update(10));
        assert_eq!(*seen.lock(), vec![10]);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx = ChannelProgress(tx);
        tx.on_progress(&update(42));
        assert_eq!(rx.try_recv().unwrap().percent, 42);
        drop(rx);
        tx.on_progress(&update(43));
    }
}
