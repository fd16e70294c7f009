//! # Timers de Inactividad
//! src/timer/mod.rs
//!
//! Cada conexión viva tiene exactamente un timer. Cuando hay actividad el
//! timer se reposiciona; el reactor barre la lista periódicamente y expulsa
//! las conexiones vencidas.

pub mod list;

pub use list::{EvictFn, TimerHandle, TimerList};
