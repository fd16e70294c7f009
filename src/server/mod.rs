//! # Módulo del Servidor
//! src/server/mod.rs
//!
//! Reactor de un solo thread sobre epoll:
//! 1. `poller`: registro one-shot de sockets
//! 2. `signal`: señales convertidas en bytes sobre un socket
//! 3. `registry`: conexiones vivas y su cierre único
//! 4. `reactor`: accept, lectura, escritura y barrido de timers
//!
//! El parseo y la composición de respuestas ocurren en el pool de workers.

pub mod poller;
pub mod reactor;
pub mod registry;
pub mod signal;

pub use reactor::{Server, ServerHandle};
