//! # Logging
//! src/logging.rs
//!
//! Inicializa el subscriber de `tracing`. `RUST_LOG`, si está definida,
//! tiene prioridad sobre `--log-level`.
//!
//! Sin subscriber instalado (por ejemplo en los tests) las macros de
//! `tracing` no hacen nada: el log nunca bloquea ni falla el camino del
//! protocolo.

use crate::config::LogFormat;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filtro a usar: `RUST_LOG` o el nivel configurado
fn filter(level: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Instala el subscriber global
///
/// Si ya había uno instalado, no hace nada.
pub fn init(level: &str, format: LogFormat) {
    let filter = filter(level);

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(true).with_thread_names(true))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_thread_names(true))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialised");
    }
}
