//! Refresh scheduler
//!
//! Two independent timers drive silent polling: one for the conversation
//! list, one for the active thread's trailing window. Selection changes
//! reset the thread timer (so a freshly opened thread gets a full quiet
//! interval before its first refresh) and leave the list timer alone.
//! Every poll command the scheduler emits is silent: the dispatcher never
//! raises a loading flag for them, so a timer tick can never cause visible
//! flicker.
//!
//! Failed polls are not retried here; the next tick is the retry.

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::EngineCommand;
use crate::ids::ConversationId;

/// Spawn the list and thread timers. Both stop when `cancel` fires or the
/// dispatcher goes away.
pub(crate) fn spawn(
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    config: &EngineConfig,
    selection_rx: watch::Receiver<Option<ConversationId>>,
    cancel: CancellationToken,
) {
    let list_period = config.list_poll_interval();
    let thread_period = config.thread_poll_interval();

    let list_tx = cmd_tx.clone();
    let list_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + list_period, list_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = list_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if list_tx.send(EngineCommand::PollList).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut selection_rx = selection_rx;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + thread_period, thread_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = selection_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Selection moved: restart the quiet interval.
                    ticker = interval_at(Instant::now() + thread_period, thread_period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
                _ = ticker.tick() => {
                    if selection_rx.borrow().is_none() {
                        continue;
                    }
                    if cmd_tx.send(EngineCommand::PollThread).is_err() {
                        break;
                    }
                }
            }
        }
    });
}
