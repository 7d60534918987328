//! Deferred tasks.
//!
//! The only timer the tracker needs is the short delay between recording a
//! link click and performing the navigation it interrupted.

use std::time::Duration;

/// A task to run later on the host thread.
pub type Task = Box<dyn FnOnce()>;

/// Trait for running a task once after a delay.
pub trait Scheduler {
    /// Run `task` once, no sooner than `delay` from now.
    fn schedule(&self, delay: Duration, task: Task);
}

/// Scheduler backed by the tokio timer.
///
/// Like [`crate::transport::ReqwestTransport`], tasks are spawned with
/// [`tokio::task::spawn_local`], so `schedule` must be called from within a
/// [`tokio::task::LocalSet`].
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[cfg(not(target_arch = "wasm32"))]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Scheduler that holds tasks until the test runs them.
    #[derive(Default)]
    pub struct ManualScheduler {
        tasks: RefCell<Vec<(Duration, Task)>>,
    }

    impl ManualScheduler {
        pub fn delays(&self) -> Vec<Duration> {
            self.tasks.borrow().iter().map(|(d, _)| *d).collect()
        }

        pub fn run_all(&self) {
            let tasks: Vec<_> = self.tasks.borrow_mut().drain(..).collect();
            for (_, task) in tasks {
                task();
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, delay: Duration, task: Task) {
            self.tasks.borrow_mut().push((delay, task));
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_waits_for_delay() {
        use std::cell::Cell;
        use std::rc::Rc;
        use tokio::task::LocalSet;

        let local = LocalSet::new();
        local
            .run_until(async {
                let ran = Rc::new(Cell::new(false));
                let flag = Rc::clone(&ran);
                TokioScheduler.schedule(Duration::from_millis(150), Box::new(move || flag.set(true)));

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(!ran.get(), "task must not run before its delay");

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert!(ran.get(), "task should run after its delay");
            })
            .await;
    }
}
