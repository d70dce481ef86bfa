//! Single-thread deferred executor.
//!
//! Jobs run in submission order on one named worker thread, each no earlier
//! than `delay` after it was scheduled. Dropping the executor stops accepting
//! jobs, lets queued ones finish and joins the worker.

use anyhow::{anyhow, Context, Result};
use log::{debug, error};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct DeferredExecutor {
    tx: Mutex<Option<Sender<(Instant, Job)>>>,
    worker: Option<JoinHandle<()>>,
    delay: Duration,
}

impl DeferredExecutor {
    pub fn new(delay: Duration) -> Result<Self> {
        let (tx, rx) = channel::<(Instant, Job)>();
        let worker = thread::Builder::new()
            .name("confvault-deferred".into())
            .spawn(move || {
                for (due, job) in rx {
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                    job();
                }
                debug!("deferred executor stopped");
            })
            .context("spawn deferred worker")?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Some(worker),
            delay,
        })
    }

    /// Queue `job` to run after the configured delay.
    pub fn schedule<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let g = self
            .tx
            .lock()
            .map_err(|_| anyhow!("deferred executor lock poisoned"))?;
        let tx = g.as_ref().ok_or_else(|| anyhow!("deferred executor stopped"))?;
        tx.send((Instant::now() + self.delay, Box::new(job)))
            .map_err(|_| anyhow!("deferred worker is gone"))
    }
}

impl Drop for DeferredExecutor {
    fn drop(&mut self) {
        if let Ok(mut g) = self.tx.lock() {
            g.take();
        }
        if let Some(h) = self.worker.take() {
            // a job dropping the last service handle runs this on the worker itself
            if h.thread().id() == thread::current().id() {
                return;
            }
            if h.join().is_err() {
                error!("deferred worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn runs_in_order_after_delay() {
        let ex = DeferredExecutor::new(Duration::from_millis(20)).unwrap();
        let (tx, rx) = channel();
        let start = Instant::now();
        for i in 0..3 {
            let tx = tx.clone();
            ex.schedule(move || {
                let _ = tx.send(i);
            })
            .unwrap();
        }
        let got: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, vec![0, 1, 2]);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
