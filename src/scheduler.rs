use anyhow::Result;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

enum TimerMsg {
    Arm(Instant),
    Cancel,
    Shutdown,
}

/// Resettable one-shot countdown.
///
/// Every `arm()` replaces the live countdown, so the callback only runs once
/// the timer has gone a full window without being re-armed. The callback runs
/// on the timer's own thread; consecutive firings never overlap.
pub struct BatchTimer {
    tx: Sender<TimerMsg>,
    window: Duration,
}

impl BatchTimer {
    pub fn spawn<F>(window: Duration, mut on_fire: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("autosync-batch".to_string())
            .spawn(move || {
                let mut deadline: Option<Instant> = None;
                loop {
                    let msg = match deadline {
                        Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
                        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match msg {
                        Ok(TimerMsg::Arm(from)) => deadline = Some(from + window),
                        Ok(TimerMsg::Cancel) => deadline = None,
                        Ok(TimerMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                        Err(RecvTimeoutError::Timeout) => {
                            deadline = None;
                            on_fire();
                        }
                    }
                }
            })?;
        Ok(Self { tx, window })
    }

    /// Cancel any live countdown and start a fresh one.
    pub fn arm(&self) {
        let _ = self.tx.send(TimerMsg::Arm(Instant::now()));
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(TimerMsg::Cancel);
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Drop for BatchTimer {
    fn drop(&mut self) {
        // Not joined: the last owner may be the timer thread itself.
        let _ = self.tx.send(TimerMsg::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn counting(window: Duration) -> (BatchTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = BatchTimer::spawn(window, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (timer, fired)
    }

    #[test]
    fn burst_collapses_into_one_fire() {
        let (timer, fired) = counting(Duration::from_millis(150));
        for _ in 0..5 {
            timer.arm();
            thread::sleep(Duration::from_millis(30));
        }
        thread::sleep(Duration::from_millis(400));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_fires_before_window() {
        let fired_at = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fired_at);
        let timer = BatchTimer::spawn(Duration::from_millis(200), move || {
            *slot.lock().unwrap() = Some(Instant::now());
        })
        .unwrap();

        timer.arm();
        thread::sleep(Duration::from_millis(100));
        let last_arm = Instant::now();
        timer.arm();
        thread::sleep(Duration::from_millis(500));

        let at = fired_at.lock().unwrap().expect("timer fired");
        assert!(at.duration_since(last_arm) >= Duration::from_millis(200));
    }

    #[test]
    fn separate_bursts_fire_separately() {
        let (timer, fired) = counting(Duration::from_millis(80));
        timer.arm();
        thread::sleep(Duration::from_millis(300));
        timer.arm();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancel_and_drop_prevent_firing() {
        let (timer, fired) = counting(Duration::from_millis(100));
        timer.arm();
        timer.cancel();
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        timer.arm();
        drop(timer);
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
