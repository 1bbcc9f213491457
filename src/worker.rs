//! Worker threads sharing the world buffers.
//!
//! Each worker boots with exactly one init message carrying the shared
//! world handle and its partition coordinates, then serves execute
//! requests. Failures travel back as structured replies; a worker never
//! takes the main thread down with it.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::{EcsError, Result};
use crate::world::{Context, WorldHandle};

/// System entry point run on a worker's partitioned context.
pub type SystemFn = dyn Fn(&Context) -> Result<()> + Send + Sync;

/// The one-time boot payload: shared buffers (via the world handle, whose
/// component table doubles as the per-cid transfer map) plus this worker's
/// partition coordinates.
pub struct WorkerInit {
    pub handle: WorldHandle,
    pub thread_index: u32,
    pub thread_count: u32,
}

/// Messages accepted by a worker.
pub enum WorkerRequest {
    Init(Box<WorkerInit>),
    Execute { thread_index: u32 },
    Shutdown,
}

/// Reply to one execute request, echoing its thread index tag.
pub struct WorkerReply {
    pub thread_index: u32,
    pub result: std::result::Result<(), String>,
}

impl WorkerReply {
    /// Lift the wire-shaped reply into the crate error taxonomy.
    pub fn into_result(self) -> Result<()> {
        match self.result {
            Ok(()) => Ok(()),
            Err(msg) if msg == "buffer not initialized" => Err(EcsError::WorkerUninitialized),
            Err(msg) => Err(EcsError::WorkerExecuteFailure(msg)),
        }
    }
}

/// Handle to one worker thread.
pub struct Worker {
    requests: Sender<WorkerRequest>,
    replies: Receiver<WorkerReply>,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker running `system` on each execute request. The worker
    /// starts uninitialized; an execute before its init message is answered
    /// with the error `"buffer not initialized"`.
    pub fn spawn(system: Arc<SystemFn>) -> Worker {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (reply_tx, reply_rx) = unbounded::<WorkerReply>();

        let join = std::thread::spawn(move || {
            worker_loop(&request_rx, &reply_tx, system.as_ref());
        });

        Worker {
            requests: request_tx,
            replies: reply_rx,
            join: Some(join),
        }
    }

    pub fn send(&self, request: WorkerRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| EcsError::WorkerExecuteFailure("worker disconnected".into()))
    }

    pub fn recv(&self) -> Result<WorkerReply> {
        self.replies
            .recv()
            .map_err(|_| EcsError::WorkerExecuteFailure("worker disconnected".into()))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn worker_loop(
    requests: &Receiver<WorkerRequest>,
    replies: &Sender<WorkerReply>,
    system: &SystemFn,
) {
    let mut ctx: Option<Context> = None;
    while let Ok(request) = requests.recv() {
        match request {
            WorkerRequest::Init(init) => {
                debug!(
                    thread_index = init.thread_index,
                    thread_count = init.thread_count,
                    "worker initialized"
                );
                ctx = Some(init.handle.context(init.thread_index, init.thread_count));
            }
            WorkerRequest::Execute { thread_index } => {
                let result = match &ctx {
                    None => Err("buffer not initialized".to_string()),
                    Some(ctx) => system(ctx).map_err(|e| e.to_string()),
                };
                if replies.send(WorkerReply {
                    thread_index,
                    result,
                }).is_err()
                {
                    break;
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }
}

/// A fixed set of workers spanning every partition of a world.
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Spawn and initialize `thread_count` workers over the same system.
    pub fn spawn(handle: &WorldHandle, thread_count: u32, system: Arc<SystemFn>) -> Result<WorkerPool> {
        let workers = (0..thread_count)
            .map(|thread_index| {
                let worker = Worker::spawn(Arc::clone(&system));
                worker.send(WorkerRequest::Init(Box::new(WorkerInit {
                    handle: handle.clone(),
                    thread_index,
                    thread_count,
                })))?;
                Ok(worker)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(WorkerPool { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Run one execute round across every partition, collecting all
    /// replies before surfacing the first failure.
    pub fn execute(&self) -> Result<()> {
        for (thread_index, worker) in self.workers.iter().enumerate() {
            worker.send(WorkerRequest::Execute {
                thread_index: thread_index as u32,
            })?;
        }
        let mut first_error = None;
        for worker in &self.workers {
            if let Err(err) = worker.recv()?.into_result() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[test]
    fn test_execute_before_init_is_rejected() {
        let worker = Worker::spawn(Arc::new(|_: &Context| Ok(())));
        worker
            .send(WorkerRequest::Execute { thread_index: 0 })
            .unwrap();
        let reply = worker.recv().unwrap();
        assert_eq!(reply.thread_index, 0);
        assert_eq!(reply.result, Err("buffer not initialized".to_string()));
        assert_eq!(reply.into_result(), Err(EcsError::WorkerUninitialized));
    }

    #[test]
    fn test_execute_after_init_succeeds() {
        let world = World::builder().max_entities(64).build();
        let worker = Worker::spawn(Arc::new(|ctx: &Context| {
            ctx.create_entity()?;
            Ok(())
        }));
        worker
            .send(WorkerRequest::Init(Box::new(WorkerInit {
                handle: world.handle(),
                thread_index: 0,
                thread_count: 1,
            })))
            .unwrap();
        worker
            .send(WorkerRequest::Execute { thread_index: 0 })
            .unwrap();
        assert!(worker.recv().unwrap().into_result().is_ok());
        assert_eq!(world.context().alive_count(), 1);
    }

    #[test]
    fn test_system_error_travels_as_reply() {
        let world = World::builder().max_entities(64).build();
        let system: Arc<SystemFn> =
            Arc::new(|_: &Context| Err(EcsError::WorkerExecuteFailure("boom".into())));
        let pool = WorkerPool::spawn(&world.handle(), 2, system).unwrap();
        let err = pool.execute().unwrap_err();
        assert!(matches!(err, EcsError::WorkerExecuteFailure(_)));
    }
}
