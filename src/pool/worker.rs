//! # Pool de Workers
//! src/pool/worker.rs
//!
//! Número fijo de threads de larga vida que sacan tareas de una
//! `TaskQueue` acotada. Cada tarea se procesa con una sesión del
//! `ResourcePool` prestada durante el procesamiento y devuelta al terminar,
//! incluso si el handler retorna antes o entra en pánico. Un pánico del
//! handler se registra y el worker sigue con la próxima tarea.
//!
//! ## Apagado
//!
//! `shutdown()` levanta el flag de parada y despierta a todos los workers.
//! La tarea en curso termina normalmente; las tareas encoladas que aún no
//! empezaron se abandonan.

use crate::error::{Rejected, ServerError};
use crate::pool::TaskQueue;
use crate::resource::{ResourcePool, Session};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pool de workers sobre una cola acotada
pub struct WorkerPool<T: Send + 'static> {
    /// Cola compartida con los workers
    queue: Arc<TaskQueue<T>>,

    /// Flag de parada observado entre tareas
    stop: Arc<AtomicBool>,

    /// Handles de los threads
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Crea el pool e inicia `threads` workers
    ///
    /// Falla si `threads` o `max_requests` es cero, o si el sistema no
    /// permite crear alguno de los threads (los ya creados se detienen).
    pub fn new<F>(
        threads: usize,
        max_requests: usize,
        resources: Arc<ResourcePool>,
        handler: F,
    ) -> Result<Self, ServerError>
    where
        F: Fn(T, Option<&Session>) + Send + Sync + 'static,
    {
        if threads == 0 {
            return Err(ServerError::Config("worker pool needs at least one thread".into()));
        }
        if max_requests == 0 {
            return Err(ServerError::Config("task queue depth must be > 0".into()));
        }

        let mut pool = Self {
            queue: Arc::new(TaskQueue::new(max_requests)),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::with_capacity(threads),
        };

        let handler = Arc::new(handler);

        for i in 0..threads {
            let name = format!("worker-{}", i);
            let queue = Arc::clone(&pool.queue);
            let stop = Arc::clone(&pool.stop);
            let resources = Arc::clone(&resources);
            let handler = Arc::clone(&handler);

            // Si falla, `pool` se descarta y Drop detiene los ya creados
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || Self::worker_loop(name, queue, stop, resources, handler))
                .map_err(ServerError::ThreadSpawn)?;

            pool.workers.push(handle);
        }

        tracing::info!(threads, max_requests, "worker pool started");
        Ok(pool)
    }

    /// Loop principal del worker
    fn worker_loop<F>(
        name: String,
        queue: Arc<TaskQueue<T>>,
        stop: Arc<AtomicBool>,
        resources: Arc<ResourcePool>,
        handler: Arc<F>,
    ) where
        F: Fn(T, Option<&Session>) + Send + Sync + 'static,
    {
        tracing::debug!(worker = %name, "worker started");

        loop {
            // Esperar por una tarea (o por el aviso de parada)
            queue.wait();

            if stop.load(Ordering::Acquire) {
                break;
            }

            // Despertar espurio: la cola puede estar vacía
            let Some(task) = queue.try_pop() else {
                continue;
            };

            // Sesión prestada solo mientras dura el procesamiento
            let session = match resources.acquire() {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(worker = %name, error = %e, "processing without a session");
                    None
                }
            };

            // Un handler que entra en pánico no se lleva al worker
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                handler(task, session.as_ref().and_then(|s| s.get()))
            }));
            if result.is_err() {
                tracing::error!(worker = %name, "task handler panicked");
            }
        }

        tracing::debug!(worker = %name, "worker stopped");
    }

    /// Encola una tarea
    ///
    /// Retorna `Err(Rejected(task))` cuando la cola ya tiene el máximo de
    /// tareas pendientes; la tarea vuelve al llamador.
    pub fn submit(&self, task: T) -> Result<(), Rejected<T>> {
        if self.stop.load(Ordering::Acquire) {
            return Err(Rejected(task));
        }
        self.queue.push(task)
    }

    /// Tareas encoladas que aún no empezaron
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Número de workers
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Detiene los workers y espera a que terminen su tarea actual
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.stop.store(true, Ordering::Release);
        self.queue.wake(self.workers.len());

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        tracing::info!(abandoned = self.queue.len(), "worker pool stopped");
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
