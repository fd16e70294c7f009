//! # tinyweb - Entry Point
//! src/main.rs
//!
//! Parsea la configuración, inicializa el logging y corre el reactor hasta
//! recibir `SIGTERM` o `SIGINT`.

use tinyweb::config::Config;
use tinyweb::error::ServerError;
use tinyweb::logging;
use tinyweb::server::{signal, Server};

fn run(config: Config) -> Result<(), ServerError> {
    signal::ignore_sigpipe()?;

    let mut server = Server::new(config)?;
    server.install_signal_handlers()?;
    server.run()
}

fn main() {
    let config = Config::new();

    logging::init(&config.log_level, config.log_format);
    config.print_summary();

    if let Err(e) = run(config) {
        tracing::error!(error = %e, "fatal");
        eprintln!("💥 Error fatal: {}", e);
        std::process::exit(1);
    }
}
