//! Periodic keepalive traffic for an open connection.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::frame::OutboundFrame;
use crate::manager::SessionSnapshot;

/// Owns one repeating timer that queues [`OutboundFrame::KeepAlive`] while the
/// session is open. Dropping the scheduler disarms it.
#[derive(Debug)]
pub struct KeepAliveScheduler {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl KeepAliveScheduler {
    /// Start ticking. The first keepalive goes out one full `period` after
    /// arming, not immediately. A zero period leaves the scheduler unarmed.
    pub fn arm(
        period: Duration,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        snapshot: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        if period.is_zero() {
            debug!("Keepalive disabled (zero period)");
            return Self { period, task: None };
        }

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !snapshot.borrow().is_connected() {
                    continue;
                }
                debug!("Sending keepalive");
                if outbound.send(OutboundFrame::KeepAlive).is_err() {
                    // Connection driver is gone
                    break;
                }
            }
        });

        Self {
            period,
            task: Some(task),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for KeepAliveScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
