//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Contadores del servidor:
//! - Conexiones aceptadas, vivas, cerradas y desalojadas por inactividad
//! - Rechazos (servidor lleno, cola de tareas llena)
//! - Respuestas por código de estado y bytes enviados

pub mod collector;

pub use collector::{ServerStats, StatsSnapshot};
