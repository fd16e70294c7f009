//! # tinyweb
//! src/lib.rs
//!
//! Servidor web HTTP/1.1 pequeño: un reactor epoll acepta y hace la E/S de
//! las conexiones, y un pool acotado de workers parsea los requests y
//! compone las respuestas. Las conexiones inactivas se desalojan con una
//! lista de timers ordenada.
//!
//! ## Arquitectura
//!
//! - `config`: parámetros de CLI (clap) y validación
//! - `error`: errores de arranque y del pool de sesiones
//! - `logging`: subscriber de `tracing`
//! - `sync`: semáforo contador
//! - `timer`: lista ordenada de timers de inactividad
//! - `pool`: cola de tareas acotada y workers
//! - `resource`: almacén de credenciales y pool de sesiones
//! - `http`: parser, respuestas, archivos mapeados y estado por conexión
//! - `server`: epoll, señales, registro de conexiones y reactor
//! - `metrics`: contadores del servidor
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use tinyweb::config::Config;
//! use tinyweb::server::Server;
//!
//! let config = Config {
//!     port: 9006,
//!     doc_root: "./root".into(),
//!     ..Config::default()
//! };
//!
//! let server = Server::new(config).expect("arranque");
//! let handle = server.handle();
//! std::thread::spawn(move || server.run());
//! handle.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod resource;
pub mod server;
pub mod sync;
pub mod timer;
