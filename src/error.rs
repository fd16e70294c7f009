//! # Errores del Servidor
//! src/error.rs
//!
//! Errores que pueden ocurrir al construir o ejecutar el servidor.
//!
//! Los errores de protocolo (request mal formado, recurso inexistente, etc.)
//! NO se representan aquí: se resuelven localmente como una respuesta HTTP.
//! Aquí solo viven los fallos de arranque, de I/O del reactor y del pool
//! de recursos.

use std::io;
use std::time::Duration;

/// Errores fatales o de infraestructura del servidor
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Error de I/O (bind, epoll, socketpair, ...)
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Configuración inválida
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No se pudo crear un thread del pool
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(io::Error),

    /// Error del almacén de credenciales
    #[error("credential store error: {0}")]
    Store(String),
}

/// Errores del pool de recursos
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Ningún recurso quedó libre dentro del tiempo de espera
    #[error("resource pool exhausted after {0:?}")]
    Exhausted(Duration),

    /// El pool no tiene recursos configurados
    #[error("resource pool is empty")]
    Closed,
}

/// Tarea rechazada por el pool de workers (cola llena).
///
/// Devuelve la tarea al llamador para que decida cuándo reintentar.
#[derive(Debug)]
pub struct Rejected<T>(pub T);

impl<T> Rejected<T> {
    /// Recupera la tarea rechazada
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task queue is full")
    }
}

impl<T: std::fmt::Debug> std::error::Error for Rejected<T> {}
