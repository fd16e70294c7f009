//! # Cola Acotada de Tareas
//! src/pool/queue.rs
//!
//! Cola FIFO thread-safe con capacidad máxima. El mutex protege la cola y
//! el semáforo cuenta cuántas tareas hay pendientes, así los workers
//! duermen en el semáforo y no sobre el lock.

use crate::error::Rejected;
use crate::sync::Semaphore;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Cola FIFO acotada
pub struct TaskQueue<T> {
    /// Tareas pendientes
    tasks: Mutex<VecDeque<T>>,

    /// Un permiso por tarea encolada
    pending: Semaphore,

    /// Capacidad máxima de la cola
    max_requests: usize,
}

impl<T> TaskQueue<T> {
    /// Crea una nueva cola con capacidad máxima
    pub fn new(max_requests: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            pending: Semaphore::new(0),
            max_requests,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Encola una tarea
    ///
    /// Retorna `Err(Rejected(task))` si la cola ya tiene `max_requests`
    /// tareas; en ese caso la cola no cambia.
    pub fn push(&self, task: T) -> Result<(), Rejected<T>> {
        {
            let mut tasks = self.lock();
            if tasks.len() >= self.max_requests {
                return Err(Rejected(task));
            }
            tasks.push_back(task);
        }

        // Notificar a un worker esperando
        self.pending.release();
        Ok(())
    }

    /// Espera un permiso del semáforo (hay, o hubo, una tarea)
    pub fn wait(&self) {
        self.pending.acquire();
    }

    /// Saca la tarea más antigua, si hay
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Despierta a `n` workers sin encolar nada (usado al apagar)
    pub fn wake(&self, n: usize) {
        for _ in 0..n {
            self.pending.release();
        }
    }

    /// Retorna el tamaño actual de la cola
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Verifica si la cola está vacía
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retorna la capacidad máxima
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Verifica si la cola está llena
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_fifo_order() {
        let queue = TaskQueue::new(10);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();

        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(3));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_queue_capacity() {
        let queue = TaskQueue::new(2);

        assert!(queue.push("a").is_ok());
        assert!(queue.push("b").is_ok());
        assert!(queue.is_full());

        // Cola llena: se rechaza y el tamaño no cambia
        let rejected = queue.push("c").unwrap_err();
        assert_eq!(rejected.into_inner(), "c");
        assert_eq!(queue.len(), 2);

        // Después de sacar una, la siguiente entra
        queue.wait();
        assert_eq!(queue.try_pop(), Some("a"));
        assert!(queue.push("c").is_ok());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_spurious_wake_leaves_queue_empty() {
        let queue: TaskQueue<u8> = TaskQueue::new(1);
        queue.wake(1);
        queue.wait();
        assert_eq!(queue.try_pop(), None);
        assert!(queue.is_empty());
    }
}
