//! Bounded pool of fetch threads fed through a channel

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Task>();
        let rx = Arc::new(Mutex::new(rx));

        let workers: Vec<_> = (0..size.max(1))
            .filter_map(|i| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("tickplate-fetch-{i}"))
                    .spawn(move || worker_loop(rx))
                    .map_err(|e| tracing::error!(error = %e, "failed to spawn fetch worker"))
                    .ok()
            })
            .collect();

        if workers.is_empty() {
            tracing::error!("no fetch workers could be started; providers will keep their defaults");
        }

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue a task. Gives the task back if the pool has been shut down.
    pub(crate) fn execute(&self, task: Task) -> Result<(), Task> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(task).map_err(|e| e.0),
            None => Err(task),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.lock().len()
    }

    /// Close the channel and join every worker. Queued tasks still run first.
    pub(crate) fn shutdown(&self) {
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                tracing::warn!("fetch worker exited with a panic");
            }
        }
    }
}

fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Task>>>) {
    loop {
        let task = rx.lock().recv();
        match task {
            Ok(task) => task(),
            Err(_) => break,
        }
    }
}
