//! Append-only, size-rotated NDJSON audit sinks: a mandatory compliance
//! stream and an opt-in verbose debug stream.

use crate::config::AuditConfig;
use crate::model::{RefusalReason, SearchMode};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The always-on compliance record, one per request regardless of outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceRecord {
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    /// Unique query identifier.
    pub query_id: String,
    /// Question as submitted.
    pub question: String,
    /// Normalized form used for retrieval.
    pub normalized_query: String,
    /// Sources requested.
    pub sources: Vec<String>,
    /// Search mode requested.
    pub search_mode: SearchMode,
    /// Search mode actually executed.
    pub effective_search_mode: SearchMode,
    /// Candidates returned by retrieval.
    pub chunks_retrieved: usize,
    /// Chunks supplied to the answer generator.
    pub chunks_used: usize,
    /// Terms linked by the definitions linker.
    pub definitions_linked: Vec<String>,
    /// Prompt tokens billed by the answer call.
    pub tokens_input: u32,
    /// Completion tokens billed by the answer call.
    pub tokens_output: u32,
    /// Wall-clock request duration.
    pub latency_ms: u64,
    /// Whether the pipeline refused to answer.
    pub refused: bool,
    /// Refusal reason, when `refused`.
    pub refusal_reason: Option<RefusalReason>,
    /// Word count of the rendered answer text.
    pub answer_word_count: usize,
    /// Number of citations in the rendered answer.
    pub citation_count: usize,
    /// Validation errors recorded by the Validator, if any.
    pub validation_errors: Vec<String>,
}

/// Per-index hit recorded in a debug record.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHitRecord {
    /// Chunk identifier.
    pub chunk_id: String,
    /// 0-indexed rank within that index's result list.
    pub rank: u32,
    /// Raw score from that index.
    pub score: f64,
}

/// Per-chunk rerank outcome recorded in a debug record.
#[derive(Debug, Clone, Serialize)]
pub struct RerankRecord {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Assigned score (0 on failure).
    pub score: f64,
    /// One-line explanation, when requested.
    pub explanation: Option<String>,
    /// Whether this chunk's scoring call failed.
    pub failed: bool,
}

/// Budget metrics recorded in a debug record.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BudgetMetrics {
    /// Tokens available for chunks after reservations.
    pub target_tokens: u32,
    /// Tokens actually consumed by kept chunks.
    pub final_tokens: u32,
    /// Chunk count before packing.
    pub chunks_before: usize,
    /// Chunk count after packing.
    pub chunks_after: usize,
}

/// The opt-in verbose debug record: everything needed to reconstruct why the
/// pipeline made the decisions it did.
#[derive(Debug, Clone, Serialize)]
pub struct DebugRecord {
    /// Query this record diagnoses.
    pub query_id: String,
    /// Per-index vector hits, one list per queried source.
    pub vector_hits: Vec<IndexHitRecord>,
    /// Per-index lexical hits, one list per queried source.
    pub lexical_hits: Vec<IndexHitRecord>,
    /// Fused RRF list.
    pub rrf_fused: Vec<IndexHitRecord>,
    /// Per-chunk rerank outcomes.
    pub rerank: Vec<RerankRecord>,
    /// Gate decision: refusal reason (if any) plus the scores it evaluated.
    pub gate_refusal_reason: Option<RefusalReason>,
    /// Top 1-2 scores the gate evaluated.
    pub gate_top_scores: Vec<f64>,
    /// Budget packing metrics.
    pub budget: BudgetMetrics,
    /// Answer model identifier, when known.
    pub answer_model: Option<String>,
    /// Total wall-clock duration of the request.
    pub total_duration_ms: u64,
}

/// A single rotating NDJSON file: writes are atomic at record granularity,
/// and the file is rotated (rename to `.1`, shifting older backups up) once
/// it would exceed `max_bytes`.
struct RotatingSink {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    file: File,
    current_size: u64,
}

impl RotatingSink {
    fn open(path: PathBuf, max_bytes: u64, backups: u32) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backups,
            file,
            current_size,
        })
    }

    fn write_record(&mut self, line: &str) -> std::io::Result<()> {
        let record_bytes = line.len() as u64 + 1;
        if self.current_size > 0 && self.current_size + record_bytes > self.max_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        self.current_size += record_bytes;
        Ok(())
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        for i in (1..self.backups).rev() {
            let from = backup_path(&self.path, i);
            let to = backup_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }
        if self.backups > 0 {
            let _ = std::fs::rename(&self.path, backup_path(&self.path, 1));
        } else {
            std::fs::remove_file(&self.path)?;
        }
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.current_size = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, index: u32) -> PathBuf {
    let mut name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audit")
        .to_string();
    name.push_str(&format!(".{index}"));
    path.with_file_name(name)
}

/// Counters exposed for `/ready` and operational visibility.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditCounters {
    /// Debug records dropped due to a sink write failure.
    pub debug_write_failures: u64,
    /// Consecutive compliance-stream write failures. Three or more should
    /// drive the API front into returning 503 for new `/query` requests.
    pub compliance_write_failures: u64,
}

/// The two audit streams, guarded independently so a slow debug write never
/// blocks compliance writes.
pub struct AuditSink {
    compliance: Mutex<RotatingSink>,
    debug: Mutex<Option<RotatingSink>>,
    counters: Mutex<AuditCounters>,
}

impl AuditSink {
    /// Opens (or creates) the compliance stream at `compliance_path` and,
    /// when `debug_path` is given, the debug stream alongside it.
    ///
    /// # Errors
    /// Returns an I/O error if the compliance file cannot be opened; a
    /// failure opening the debug file is non-fatal and simply disables it.
    pub fn open(compliance_path: PathBuf, debug_path: Option<PathBuf>, config: AuditConfig) -> std::io::Result<Self> {
        let compliance = RotatingSink::open(compliance_path, config.audit_max_bytes, config.audit_backups)?;
        let debug = debug_path.and_then(|p| RotatingSink::open(p, config.debug_max_bytes, config.debug_backups).ok());
        Ok(Self {
            compliance: Mutex::new(compliance),
            debug: Mutex::new(debug),
            counters: Mutex::new(AuditCounters::default()),
        })
    }

    /// Writes a compliance record. Always attempted, regardless of outcome.
    pub fn write_compliance(&self, record: &ComplianceRecord) {
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        let Ok(mut sink) = self.compliance.lock() else {
            return;
        };
        let Ok(mut counters) = self.counters.lock() else {
            return;
        };
        match sink.write_record(&line) {
            Ok(()) => counters.compliance_write_failures = 0,
            Err(_) => counters.compliance_write_failures += 1,
        }
    }

    /// Writes a debug record if the debug stream is enabled. Failures are
    /// swallowed (counted) rather than surfaced, per the propagation policy.
    pub fn write_debug(&self, record: &DebugRecord) {
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        let Ok(mut guard) = self.debug.lock() else {
            return;
        };
        let Some(sink) = guard.as_mut() else {
            return;
        };
        if sink.write_record(&line).is_err() {
            if let Ok(mut counters) = self.counters.lock() {
                counters.debug_write_failures += 1;
            }
        }
    }

    /// Whether the compliance stream has failed persistently enough
    /// (three consecutive failures) to force the API into a degraded mode.
    #[must_use]
    pub fn compliance_degraded(&self) -> bool {
        self.counters.lock().is_ok_and(|c| c.compliance_write_failures >= 3)
    }

    /// Returns a snapshot of the current counters.
    #[must_use]
    pub fn counters(&self) -> AuditCounters {
        self.counters.lock().map(|c| *c).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> ComplianceRecord {
        ComplianceRecord {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            query_id: "q1".to_string(),
            question: "Can I terminate?".to_string(),
            normalized_query: "terminate".to_string(),
            sources: vec!["cme".to_string()],
            search_mode: SearchMode::Hybrid,
            effective_search_mode: SearchMode::Hybrid,
            chunks_retrieved: 5,
            chunks_used: 2,
            definitions_linked: vec![],
            tokens_input: 100,
            tokens_output: 50,
            latency_ms: 250,
            refused: false,
            refusal_reason: None,
            answer_word_count: 42,
            citation_count: 2,
            validation_errors: vec![],
        }
    }

    #[test]
    fn writes_newline_delimited_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.ndjson");
        let sink = AuditSink::open(path.clone(), None, AuditConfig::default()).unwrap();

        sink.write_compliance(&sample_record());
        sink.write_compliance(&sample_record());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().next().unwrap().starts_with('{'));
    }

    #[test]
    fn rotates_when_exceeding_max_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.ndjson");
        let config = AuditConfig {
            audit_max_bytes: 200,
            audit_backups: 2,
            ..AuditConfig::default()
        };
        let sink = AuditSink::open(path.clone(), None, config).unwrap();

        for _ in 0..20 {
            sink.write_compliance(&sample_record());
        }

        assert!(path.with_file_name("queries.ndjson.1").exists());
    }

    #[test]
    fn debug_stream_disabled_by_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.ndjson");
        let sink = AuditSink::open(path, None, AuditConfig::default()).unwrap();
        assert_eq!(sink.counters().debug_write_failures, 0);
    }
}
