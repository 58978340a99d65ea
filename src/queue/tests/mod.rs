//! Test suites for the work queues, organised by behaviour

mod dispatch;

use crate::queue::Work;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub type Record = Arc<Mutex<Vec<u32>>>;

pub fn record() -> Record {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn recorded(record: &Record) -> Vec<u32> {
    record.lock().unwrap().clone()
}

/// Work that appends `n` to `record`
pub fn push(record: &Record, n: u32) -> Work<()> {
    let record = Arc::clone(record);
    Work::blocking(format!("item-{}", n), move || {
        record.lock().unwrap().push(n);
        Ok::<_, String>(())
    })
}

/// One-shot gate that blocked work items wait on
#[derive(Clone, Default)]
pub struct Latch(Arc<(Mutex<bool>, Condvar)>);

impl Latch {
    pub fn release(&self) {
        let (open, cond) = &*self.0;
        *open.lock().unwrap() = true;
        cond.notify_all();
    }

    /// Wait until released; false if `timeout` passed first
    pub fn wait(&self, timeout: Duration) -> bool {
        let (open, cond) = &*self.0;
        let guard = open.lock().unwrap();
        let (guard, _) = cond.wait_timeout_while(guard, timeout, |open| !*open).unwrap();
        *guard
    }
}

/// Work that blocks its worker until `latch` is released, signalling `running` first
pub fn gate(latch: &Latch, running: std::sync::mpsc::Sender<()>) -> Work<()> {
    let latch = latch.clone();
    Work::blocking("gate", move || {
        let _ = running.send(());
        latch.wait(Duration::from_secs(60));
        Ok::<_, String>(())
    })
}
