//! # Pool de Sesiones
//! src/resource/pool.rs
//!
//! Número fijo de sesiones sobre el almacén de credenciales. Un semáforo
//! acota cuántas hay prestadas a la vez y un mutex protege la lista de
//! libres.
//!
//! La espera por una sesión está acotada (`acquire_timeout`): si el pool
//! sigue agotado al vencer el plazo se retorna `PoolError::Exhausted` en
//! vez de bloquear al worker indefinidamente.
//!
//! ## Adquisición con alcance
//!
//! ```ignore
//! let session = pool.acquire()?;   // adquirir al entrar
//! session.get().map(|s| s.verify("bob", "pw1"));
//! // al salir del scope (return, ?, panic) la sesión vuelve al pool
//! ```

use crate::error::{PoolError, ServerError};
use crate::resource::CredentialStore;
use crate::sync::Semaphore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Sesión prestada sobre el almacén de credenciales
pub struct Session {
    id: usize,
    store: Arc<CredentialStore>,
}

impl Session {
    /// Identificador de la sesión dentro del pool
    pub fn id(&self) -> usize {
        self.id
    }

    /// Verifica usuario y contraseña
    pub fn verify(&self, name: &str, password: &str) -> bool {
        self.store.verify(name, password)
    }

    /// Registra un usuario nuevo (`Ok(false)` si ya existía)
    pub fn register(&self, name: &str, password: &str) -> Result<bool, ServerError> {
        self.store.insert(name, password)
    }
}

/// Pool acotado de sesiones
pub struct ResourcePool {
    /// Sesiones libres
    sessions: Mutex<Vec<Session>>,

    /// Un permiso por sesión libre
    available: Semaphore,

    /// Total de sesiones
    size: usize,

    /// Espera máxima en `acquire`
    acquire_timeout: Duration,
}

impl ResourcePool {
    /// Crea un pool con `size` sesiones sobre `store`
    pub fn new(store: Arc<CredentialStore>, size: usize, acquire_timeout: Duration) -> Self {
        let sessions = (0..size)
            .map(|id| Session {
                id,
                store: Arc::clone(&store),
            })
            .collect();

        Self {
            sessions: Mutex::new(sessions),
            available: Semaphore::new(size),
            size,
            acquire_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Toma una sesión, esperando como máximo `acquire_timeout`
    pub fn acquire(&self) -> Result<PooledSession<'_>, PoolError> {
        if self.size == 0 {
            return Err(PoolError::Closed);
        }

        if !self.available.acquire_timeout(self.acquire_timeout) {
            return Err(PoolError::Exhausted(self.acquire_timeout));
        }

        match self.lock().pop() {
            Some(session) => Ok(PooledSession {
                pool: self,
                session: Some(session),
            }),
            None => {
                self.available.release();
                Err(PoolError::Closed)
            }
        }
    }

    /// Sesiones libres en este instante
    pub fn free(&self) -> usize {
        self.available.available()
    }

    /// Total de sesiones del pool
    pub fn size(&self) -> usize {
        self.size
    }

    fn put_back(&self, session: Session) {
        self.lock().push(session);
        self.available.release();
    }
}

/// Sesión prestada; vuelve al pool al hacer `drop`
pub struct PooledSession<'a> {
    pool: &'a ResourcePool,
    session: Option<Session>,
}

impl PooledSession<'_> {
    /// Acceso a la sesión (None si ya se liberó)
    pub fn get(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Devuelve la sesión al pool. Llamarlo más de una vez no hace nada.
    pub fn release(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.put_back(session);
        }
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
