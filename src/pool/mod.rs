//! # Pool de Workers
//! src/pool/mod.rs
//!
//! Ejecuta el procesamiento de conexiones fuera del thread del reactor:
//!
//! - `queue`: cola FIFO acotada, protegida por mutex y señalizada por semáforo
//! - `worker`: threads de larga vida que consumen esa cola

pub mod queue;
pub mod worker;

pub use queue::TaskQueue;
pub use worker::WorkerPool;
