//! 🛑 Shutdown — the big red button, wired through a `tokio::sync::watch`.
//!
//! One `ShutdownTrigger`, many `Shutdown` listeners. Workers hold a listener and
//! `select!` on it next to every suspension point (waiting for a line, waiting for
//! the cluster). Pull the trigger and everyone stops taking new lines.
//!
//! ⚠️ If the trigger is dropped without firing, listeners simply never resolve.
//! A dropped trigger means "nobody will ever cancel", not "cancel now".

use tokio::sync::watch;

/// 🔴 The button. Keep it somewhere safe. Ctrl-C handlers love it.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// 👂 A listener. Cheap to clone, hand one to every worker.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    /// 🚀 Build a fresh, un-pressed button and its first listener.
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// 🛑 Press it. Idempotent. Pressing it twice doesn't make it cancel harder.
    pub fn trigger(&self) {
        // send_replace never fails, even with zero listeners left
        self.tx.send_replace(true);
    }

    /// 👂 Mint another listener.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    /// 🧘 A listener attached to a button nobody can press. For library callers who
    /// don't care about cancellation.
    pub fn never() -> Shutdown {
        let (tx, rx) = watch::channel(false);
        // dropping the sender means `cancelled()` pends forever
        drop(tx);
        Shutdown { rx }
    }

    /// ✅ Has the button been pressed?
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// ⏳ Resolves once the button is pressed. Never resolves if it can't be.
    pub async fn cancelled(&mut self) {
        let heard_the_press = self.rx.wait_for(|pressed| *pressed).await.is_ok();
        if !heard_the_press {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn the_one_where_pressing_the_button_wakes_every_listener() {
        let (the_button, mut the_first_ear) = ShutdownTrigger::new();
        let mut the_second_ear = the_button.subscribe();
        assert!(!the_first_ear.is_cancelled());

        the_button.trigger();

        tokio::time::timeout(Duration::from_secs(1), the_first_ear.cancelled())
            .await
            .expect("💀 first listener never heard the button");
        tokio::time::timeout(Duration::from_secs(1), the_second_ear.cancelled())
            .await
            .expect("💀 second listener never heard the button");
        assert!(the_second_ear.is_cancelled());
    }

    #[tokio::test]
    async fn the_one_where_nobody_can_press_the_button() {
        let mut the_zen_listener = Shutdown::never();
        assert!(!the_zen_listener.is_cancelled());
        let the_outcome =
            tokio::time::timeout(Duration::from_millis(50), the_zen_listener.cancelled()).await;
        assert!(the_outcome.is_err(), "never() must never resolve");
    }

    #[tokio::test]
    async fn the_one_where_late_subscribers_still_see_the_press() {
        let (the_button, _the_original) = ShutdownTrigger::new();
        the_button.trigger();
        let mut the_latecomer = the_button.subscribe();
        assert!(the_latecomer.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), the_latecomer.cancelled())
            .await
            .expect("💀 latecomer should resolve immediately");
    }
}
