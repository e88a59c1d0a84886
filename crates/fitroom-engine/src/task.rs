use std::io;
use std::sync::mpsc;
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll<T> {
    Pending,
    Ready(T),
    /// The worker stopped without reporting a value.
    Lost,
}

/// One blocking operation running on a named worker thread.
///
/// The owning controller polls from its event loop; dropping the task
/// abandons whatever the worker eventually reports.
#[derive(Debug)]
pub struct Task<T> {
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> Task<T> {
    pub fn spawn<F>(name: &str, job: F) -> io::Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = tx.send(job());
            })?;
        Ok(Self { rx })
    }

    pub fn poll(&mut self) -> TaskPoll<T> {
        match self.rx.try_recv() {
            Ok(value) => TaskPoll::Ready(value),
            Err(mpsc::TryRecvError::Empty) => TaskPoll::Pending,
            Err(mpsc::TryRecvError::Disconnected) => TaskPoll::Lost,
        }
    }

    /// Blocks until the worker reports; `None` when it was lost.
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::{Task, TaskPoll};

    #[test]
    fn poll_reports_pending_until_worker_finishes() -> anyhow::Result<()> {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let mut task = Task::spawn("fitroom-test-gated", move || {
            let _ = release_rx.recv();
            7
        })?;
        assert_eq!(task.poll(), TaskPoll::Pending);
        release_tx.send(())?;
        assert_eq!(task.wait(), Some(7));
        Ok(())
    }

    #[test]
    fn panicking_worker_is_reported_lost() -> anyhow::Result<()> {
        let task: Task<u8> = Task::spawn("fitroom-test-panic", || panic!("worker died"))?;
        assert_eq!(task.wait(), None);
        Ok(())
    }

    #[test]
    fn wait_returns_value() -> anyhow::Result<()> {
        let task = Task::spawn("fitroom-test-wait", || "done".to_string())?;
        assert_eq!(task.wait().as_deref(), Some("done"));
        Ok(())
    }
}
