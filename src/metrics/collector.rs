//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Contadores del servidor compartidos entre el reactor, los workers y los
//! callbacks de los timers. El contador de conexiones vivas es el que
//! decide si un accept nuevo se rechaza con "Internal server busy".

use crate::http::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct ServerStats {
    inner: Arc<Mutex<StatsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Default)]
struct StatsData {
    /// Conexiones aceptadas desde el arranque
    accepted: u64,

    /// Conexiones abiertas en este instante
    live: usize,

    /// Conexiones cerradas (por cualquier causa)
    closed: u64,

    /// Cerradas por el timer de inactividad
    evicted: u64,

    /// Rechazadas por exceso de conexiones
    busy_refusals: u64,

    /// Envíos al pool rechazados por cola llena
    rejected_tasks: u64,

    /// Respuestas por código de estado
    status_codes: BTreeMap<u16, u64>,

    bytes_sent: u64,
}

/// Snapshot serializable de las métricas
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub live: usize,
    pub closed: u64,
    pub evicted: u64,
    pub busy_refusals: u64,
    pub rejected_tasks: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub bytes_sent: u64,
}

impl ServerStats {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsData::default())),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsData> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registra una conexión aceptada
    pub fn connection_opened(&self) {
        let mut data = self.lock();
        data.accepted += 1;
        data.live += 1;
    }

    /// Registra una conexión cerrada
    pub fn connection_closed(&self) {
        let mut data = self.lock();
        data.closed += 1;
        data.live = data.live.saturating_sub(1);
    }

    pub fn record_eviction(&self) {
        self.lock().evicted += 1;
    }

    pub fn record_busy(&self) {
        self.lock().busy_refusals += 1;
    }

    pub fn record_rejected(&self) {
        self.lock().rejected_tasks += 1;
    }

    /// Registra una respuesta compuesta
    pub fn record_response(&self, status: StatusCode) {
        *self.lock().status_codes.entry(status.as_u16()).or_insert(0) += 1;
    }

    pub fn add_bytes_sent(&self, bytes: usize) {
        self.lock().bytes_sent += bytes as u64;
    }

    /// Conexiones abiertas en este instante
    pub fn live(&self) -> usize {
        self.lock().live
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> StatsSnapshot {
        let data = self.lock();

        StatsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            accepted: data.accepted,
            live: data.live,
            closed: data.closed,
            evicted: data.evicted,
            busy_refusals: data.busy_refusals,
            rejected_tasks: data.rejected_tasks,
            status_codes: data.status_codes.clone(),
            bytes_sent: data.bytes_sent,
        }
    }

    /// Snapshot en formato JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_tracking() {
        let stats = ServerStats::new();

        stats.connection_opened();
        stats.connection_opened();
        assert_eq!(stats.live(), 2);

        stats.connection_closed();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.live, 1);
        assert_eq!(snapshot.closed, 1);
    }

    #[test]
    fn test_live_never_negative() {
        let stats = ServerStats::new();
        stats.connection_closed();
        stats.connection_closed();
        assert_eq!(stats.live(), 0);
    }

    #[test]
    fn test_status_codes() {
        let stats = ServerStats::new();

        stats.record_response(StatusCode::Ok);
        stats.record_response(StatusCode::Ok);
        stats.record_response(StatusCode::NotFound);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.status_codes.get(&200), Some(&2));
        assert_eq!(snapshot.status_codes.get(&404), Some(&1));
        assert_eq!(snapshot.status_codes.get(&500), None);
    }

    #[test]
    fn test_clones_share_counters() {
        let stats = ServerStats::new();
        let other = stats.clone();

        other.record_eviction();
        other.record_busy();
        other.record_rejected();
        other.add_bytes_sent(100);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evicted, 1);
        assert_eq!(snapshot.busy_refusals, 1);
        assert_eq!(snapshot.rejected_tasks, 1);
        assert_eq!(snapshot.bytes_sent, 100);
    }

    #[test]
    fn test_json_format() {
        let stats = ServerStats::new();
        stats.connection_opened();
        stats.record_response(StatusCode::BadRequest);

        let value: serde_json::Value = serde_json::from_str(&stats.to_json()).unwrap();
        assert_eq!(value["accepted"], 1);
        assert_eq!(value["live"], 1);
        assert_eq!(value["status_codes"]["400"], 1);
    }
}
