//! # Primitivas de Sincronización
//! src/sync/mod.rs
//!
//! `std::sync` ya ofrece `Mutex` y `Condvar`; aquí solo falta el semáforo
//! contador, construido sobre ambos.

pub mod semaphore;

pub use semaphore::Semaphore;
