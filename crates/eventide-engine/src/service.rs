//! Application service: one shutdown signal over every long-lived task.
//!
//! Collects the command processor, one subscriber per projection
//! publisher, and any extra tasks (bus listeners, HTTP servers), then
//! runs them all as tokio tasks. The first task failure signals shutdown
//! to the rest and becomes the service's error; an external shutdown
//! signal (e.g. ctrl-c in the binary) stops everything cleanly.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use eventide_store::EventStore;

use crate::error::EngineError;
use crate::processor::CommandProcessor;
use crate::subscriber::{Publisher, Subscriber};

type TaskFn = Box<dyn FnOnce(watch::Receiver<bool>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Builder and runner for the application's long-lived tasks.
pub struct Service {
    store: Arc<dyn EventStore>,
    tasks: Vec<(String, TaskFn)>,
}

impl Service {
    /// Create a service over the given store.
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            tasks: Vec::new(),
        }
    }

    fn push_task<F, Fut>(&mut self, name: String, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task_fn: TaskFn = Box::new(move |shutdown| Box::pin(task(shutdown)));
        self.tasks.push((name, task_fn));
    }

    /// Add the command processor.
    #[must_use]
    pub fn with_processor(mut self, processor: CommandProcessor) -> Self {
        self.push_task("command_processor".to_owned(), move |shutdown| async move {
            processor.run(shutdown).await?;
            Ok(())
        });
        self
    }

    /// Add one subscriber per projection publisher, each consuming under
    /// the publisher's subscription group.
    #[must_use]
    pub fn with_publishers(mut self, publishers: Vec<Arc<dyn Publisher>>) -> Self {
        for publisher in publishers {
            let store = Arc::clone(&self.store);
            let name = format!("subscriber/{}", publisher.name());
            self.push_task(name, move |shutdown| async move {
                let subscriber = Subscriber::new(store, publisher).await?;
                subscriber.run(shutdown).await?;
                Ok(())
            });
        }
        self
    }

    /// Add an arbitrary long-lived task (bus listener, HTTP server).
    ///
    /// The task receives the shared shutdown receiver and should exit
    /// cleanly when it fires.
    #[must_use]
    pub fn with_task<F, Fut>(mut self, name: &str, task: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push_task(name.to_owned(), task);
        self
    }

    /// Run every task until the external shutdown signal fires or a task
    /// fails.
    ///
    /// The first failure signals shutdown to the remaining tasks, waits
    /// for them, and is returned as the service's error.
    pub async fn run(self, mut external: watch::Receiver<bool>) -> Result<(), EngineError> {
        info!(tasks = self.tasks.len(), "starting application service");
        let (tx, rx) = watch::channel(false);
        let mut join_set: JoinSet<(String, anyhow::Result<()>)> = JoinSet::new();
        for (name, task) in self.tasks {
            let shutdown = rx.clone();
            join_set.spawn(async move {
                let result = task(shutdown).await;
                (name, result)
            });
        }
        drop(rx);

        let mut first_error: Option<EngineError> = None;
        let mut external_seen = false;
        loop {
            tokio::select! {
                changed = external.changed(), if !external_seen => {
                    // A closed sender counts as a shutdown request too.
                    let _ = changed;
                    external_seen = true;
                    info!("shutdown signal received");
                    let _ = tx.send(true);
                }
                joined = join_set.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok((name, Ok(()))) => info!(task = %name, "task stopped"),
                        Ok((name, Err(e))) => {
                            error!(task = %name, error = %e, "task failed");
                            if first_error.is_none() {
                                first_error = Some(EngineError::Task {
                                    name,
                                    message: e.to_string(),
                                });
                            }
                            let _ = tx.send(true);
                        }
                        Err(join_error) => {
                            error!(error = %join_error, "task panicked");
                            if first_error.is_none() {
                                first_error = Some(EngineError::Task {
                                    name: "unknown".to_owned(),
                                    message: join_error.to_string(),
                                });
                            }
                            let _ = tx.send(true);
                        }
                    }
                }
            }
        }
        info!("application service stopped");
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use eventide_store::MemoryStore;

    use super::*;

    fn service() -> Service {
        Service::new(Arc::new(MemoryStore::new()))
    }

    async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let _ = shutdown.changed().await;
        Ok(())
    }

    #[tokio::test]
    async fn external_shutdown_stops_every_task() {
        let svc = service()
            .with_task("a", wait_for_shutdown)
            .with_task("b", wait_for_shutdown);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(svc.run(rx));
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("service must stop after the shutdown signal")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn first_task_failure_cancels_the_rest() {
        let svc = service()
            .with_task("stable", wait_for_shutdown)
            .with_task("broken", |_shutdown| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                anyhow::bail!("broken task gave up")
            });

        let (_tx, rx) = watch::channel(false);
        let result = tokio::time::timeout(Duration::from_secs(5), svc.run(rx))
            .await
            .expect("the failure must cascade into a full stop");

        match result {
            Err(EngineError::Task { name, message }) => {
                assert_eq!(name, "broken");
                assert!(message.contains("gave up"));
            }
            other => panic!("expected a task failure, got {other:?}"),
        }
    }
}
