//! Métricas por plugin: contadores de éxito/fallo e histograma de tiempos de
//! ejecución. Es el único estado mutable compartido entre workers; sólo se
//! actualiza con operaciones atómicas.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::constants::EXEC_TIME_BUCKETS;

#[derive(Debug, Default)]
struct PluginCounters {
    successes: AtomicU64,
    failures: AtomicU64,
    buckets: [AtomicU64; EXEC_TIME_BUCKETS.len()],
    count: AtomicU64,
    sum_micros: AtomicU64,
}

/// Foto de las métricas de un plugin. `buckets` es acumulativo (estilo
/// histograma de Prometheus): `buckets[i]` cuenta observaciones `<= le[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetricsSnapshot {
    pub plugin: String,
    pub successes: u64,
    pub failures: u64,
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum_seconds: f64,
}

#[derive(Debug, Default)]
pub struct PluginMetrics {
    plugins: DashMap<String, Arc<PluginCounters>>,
}

impl PluginMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, plugin: &str) -> Arc<PluginCounters> {
        if let Some(c) = self.plugins.get(plugin) {
            return c.clone();
        }
        self.plugins.entry(plugin.to_string()).or_default().clone()
    }

    pub fn record_success(&self, plugin: &str) {
        self.counters(plugin).successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, plugin: &str) {
        self.counters(plugin).failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_exec_time(&self, plugin: &str, seconds: f64) {
        let c = self.counters(plugin);
        for (i, le) in EXEC_TIME_BUCKETS.iter().enumerate() {
            if seconds <= *le {
                c.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        c.count.fetch_add(1, Ordering::Relaxed);
        c.sum_micros.fetch_add((seconds.max(0.0) * 1_000_000.0) as u64, Ordering::Relaxed);
    }

    pub fn start_timer<'a>(&'a self, plugin: &'a str) -> ExecTimer<'a> {
        ExecTimer { metrics: self, plugin, started: Instant::now() }
    }

    pub fn snapshot(&self, plugin: &str) -> Option<PluginMetricsSnapshot> {
        let c = self.plugins.get(plugin)?.clone();
        Some(PluginMetricsSnapshot { plugin: plugin.to_string(),
                                     successes: c.successes.load(Ordering::Relaxed),
                                     failures: c.failures.load(Ordering::Relaxed),
                                     buckets: EXEC_TIME_BUCKETS.iter()
                                                               .zip(c.buckets.iter())
                                                               .map(|(le, n)| (*le, n.load(Ordering::Relaxed)))
                                                               .collect(),
                                     count: c.count.load(Ordering::Relaxed),
                                     sum_seconds: c.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0 })
    }

    /// Snapshots de todos los plugins observados, ordenados por nombre.
    pub fn snapshot_all(&self) -> Vec<PluginMetricsSnapshot> {
        let mut names: Vec<String> = self.plugins.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names.iter().filter_map(|n| self.snapshot(n)).collect()
    }
}

/// Temporizador de la fase de ejecución.
pub struct ExecTimer<'a> {
    metrics: &'a PluginMetrics,
    plugin: &'a str,
    started: Instant,
}

impl ExecTimer<'_> {
    /// Registra el tiempo transcurrido y lo devuelve en segundos.
    pub fn observe(self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        self.metrics.observe_exec_time(self.plugin, secs);
        secs
    }
}
