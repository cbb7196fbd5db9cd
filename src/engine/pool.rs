use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size worker pool. Each accepted connection occupies one worker for its entire
/// (potentially keep-alive) lifetime; jobs queue when every worker is busy.
pub(crate) struct ThreadPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub(crate) fn new(size: u16) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size as usize);
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            workers.push(
                thread::Builder::new()
                    .name(format!("engine-worker-{id}"))
                    .spawn(move || Self::work(&receiver))
                    .expect("failed to spawn worker thread"),
            );
        }
        Self {
            sender: Some(sender),
            workers,
        }
    }

    fn work(receiver: &Arc<Mutex<Receiver<Job>>>) {
        loop {
            let job = receiver.lock().unwrap().recv();
            match job {
                Ok(job) => job(),
                Err(_) => return,
            }
        }
    }

    /// Queue `job` for execution on the next free worker.
    pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }

    /// Stop accepting new jobs and block until every worker has drained its queue and exited.
    pub(crate) fn join(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.join();
    }
}
