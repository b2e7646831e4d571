use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use media_types::{Error, Result};

use crate::stop::StopSignal;

struct Task {
    name: String,
    stop: StopSignal,
    handle: JoinHandle<()>,
}

/**
    Named background threads that run until asked to stop.
*/
#[derive(Default)]
pub(crate) struct TaskSet {
    tasks: Vec<Task>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        self.reap();

        let stop = StopSignal::new();
        let signal = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("task-{name}"))
            .spawn(move || body(signal))
            .map_err(Error::from)?;

        debug!(task = name, "task started");
        self.tasks.push(Task {
            name: name.to_string(),
            stop,
            handle,
        });
        Ok(())
    }

    /**
        Names of tasks whose threads are still running.
    */
    pub(crate) fn running(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|task| !task.handle.is_finished())
            .map(|task| task.name.clone())
            .collect()
    }

    /**
        Ask every task to stop, then join them all.
    */
    pub(crate) fn stop_all(&mut self) {
        for task in &self.tasks {
            task.stop.request();
        }
        for task in self.tasks.drain(..) {
            join(task);
        }
    }

    /// Join tasks that already returned.
    fn reap(&mut self) {
        let (finished, running): (Vec<Task>, Vec<Task>) = self
            .tasks
            .drain(..)
            .partition(|task| task.handle.is_finished());
        self.tasks = running;
        for task in finished {
            join(task);
        }
    }
}

fn join(task: Task) {
    match task.handle.join() {
        Ok(()) => debug!(task = %task.name, "task finished"),
        Err(_) => error!(task = %task.name, "task panicked"),
    }
}
