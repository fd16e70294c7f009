//! # Semáforo Contador
//! src/sync/semaphore.rs
//!
//! Semáforo clásico (P/V) implementado con `Mutex<usize>` + `Condvar`.
//! Lo usan la cola de tareas (avisar a los workers que hay trabajo) y el
//! pool de recursos (acotar cuántos checkouts concurrentes existen).

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Semáforo contador thread-safe
pub struct Semaphore {
    /// Permisos disponibles
    permits: Mutex<usize>,

    /// Condvar para despertar a quien espera un permiso
    condvar: Condvar,
}

impl Semaphore {
    /// Crea un semáforo con `permits` permisos iniciales
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Toma un permiso, bloqueando hasta que haya uno (P / wait)
    pub fn acquire(&self) {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .condvar
                .wait(permits)
                .unwrap_or_else(|e| e.into_inner());
        }
        *permits -= 1;
    }

    /// Intenta tomar un permiso sin bloquear
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Toma un permiso esperando como máximo `timeout`.
    ///
    /// Retorna `false` si venció el plazo sin conseguirlo.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.lock();

        while *permits == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .condvar
                .wait_timeout(permits, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            permits = guard;
        }

        *permits -= 1;
        true
    }

    /// Devuelve un permiso y despierta a un posible esperador (V / post)
    pub fn release(&self) {
        let mut permits = self.lock();
        *permits += 1;
        self.condvar.notify_one();
    }

    /// Permisos disponibles en este instante
    pub fn available(&self) -> usize {
        *self.lock()
    }
}
