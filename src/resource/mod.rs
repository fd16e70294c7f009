//! # Recursos Compartidos
//! src/resource/mod.rs
//!
//! Colaboradores que el núcleo del servidor consume pero no implementa
//! como parte del protocolo:
//!
//! - `credentials`: almacén clave/valor de usuarios y contraseñas
//! - `pool`: pool de sesiones sobre ese almacén, con adquisición acotada
//!   y liberación automática (RAII)

pub mod credentials;
pub mod pool;

pub use credentials::CredentialStore;
pub use pool::{PooledSession, ResourcePool, Session};
