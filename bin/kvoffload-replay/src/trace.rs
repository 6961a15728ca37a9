//! Trace format and replay loop
//!
//! A trace is JSON lines, one inbound event per line:
//!
//! ```text
//! {"event":"commit","writes":[{"key":"A","file_id":1,"offset":0,"size":128,"version":5}]}
//! {"event":"batch","requests":[{"op":"get","key":"A"},{"op":"put","key":"B","value":"x"}]}
//! {"event":"host_read","keys":["A"]}
//! {"event":"advance","ms":11000}
//! {"event":"purge"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use kvoffload_common::{
    Key, OpType, PhysicalLocation, PhysicalReadOp, ReadOp, Request, WriteResult,
};
use kvoffload_router::{CommitReport, ManualClock, OffloadRouter};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::time::Duration;
use tracing::{debug, info};

/// One line of a trace
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Batch { requests: Vec<TraceRequest> },
    Commit { writes: Vec<TraceWrite> },
    HostRead { keys: Vec<String> },
    Advance { ms: u64 },
    Purge,
}

/// Op code recorded for op names the router does not know
pub const UNKNOWN_OP: u16 = u16::MAX;

/// An op as written in a trace
///
/// Names outside `get`, `put`, `delete` and `{"other": n}` are kept as
/// unknown ops so they still reach the host.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TraceOp {
    Known(OpType),
    Unknown(String),
}

impl From<TraceOp> for OpType {
    fn from(op: TraceOp) -> Self {
        match op {
            TraceOp::Known(op) => op,
            TraceOp::Unknown(name) => {
                debug!(op = %name, "unknown op in trace");
                Self::Other(UNKNOWN_OP)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceRequest {
    pub op: TraceOp,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl From<TraceRequest> for Request {
    fn from(r: TraceRequest) -> Self {
        Self {
            op: r.op.into(),
            key: r.key.map(Key::from),
            payload: r.value.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceWrite {
    pub key: String,
    pub file_id: u64,
    pub offset: u64,
    pub size: u32,
    #[serde(default)]
    pub version: Option<u64>,
}

impl From<TraceWrite> for WriteResult {
    fn from(w: TraceWrite) -> Self {
        let result = Self::new(w.key, PhysicalLocation::new(w.file_id, w.offset, w.size));
        match w.version {
            Some(v) => result.with_version(v),
            None => result,
        }
    }
}

/// How one batch was resolved
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub index: usize,
    pub offloaded: Vec<(String, PhysicalReadOp)>,
    pub host: Vec<String>,
    pub forwarded: usize,
}

/// Totals over a whole replay
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    pub batches: Vec<BatchReport>,
    pub commits_applied: usize,
    pub commits_stale: usize,
    pub commits_rejected: usize,
    pub evicted: usize,
    pub purged: usize,
}

/// Replay options
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Feed host-executed GETs back as host reads
    pub read_feedback: bool,
}

fn describe(request: &Request) -> String {
    match &request.key {
        Some(key) => format!("{} {}", request.op, key),
        None => format!("{} <no key>", request.op),
    }
}

/// Drive the router with every event of a trace
pub fn replay<R: BufRead>(
    router: &OffloadRouter,
    clock: &ManualClock,
    reader: R,
    options: ReplayOptions,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read trace line {}", lineno + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: TraceEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid trace event on line {}", lineno + 1))?;
        debug!(line = lineno + 1, ?event, "replaying event");

        match event {
            TraceEvent::Batch { requests } => {
                let batch: Vec<Request> = requests.into_iter().map(Into::into).collect();
                let dispatch = router.dispatch(batch);

                if options.read_feedback {
                    let read = ReadOp::new(
                        dispatch
                            .host
                            .iter()
                            .filter(|r| r.op == OpType::Get)
                            .filter_map(|r| r.routing_key().cloned()),
                    );
                    if !read.keys.is_empty() {
                        summary.evicted += router.on_host_read(&read);
                    }
                }

                summary.batches.push(BatchReport {
                    index: summary.batches.len(),
                    offloaded: dispatch
                        .offloaded
                        .iter()
                        .map(|(r, op)| (describe(r), *op))
                        .collect(),
                    host: dispatch.host.iter().map(describe).collect(),
                    forwarded: dispatch.forwarded,
                });
            }
            TraceEvent::Commit { writes } => {
                let results: Vec<WriteResult> = writes.into_iter().map(Into::into).collect();
                let CommitReport {
                    applied,
                    stale,
                    rejected,
                } = router.on_writes_committed(&results);
                summary.commits_applied += applied;
                summary.commits_stale += stale;
                summary.commits_rejected += rejected;
            }
            TraceEvent::HostRead { keys } => {
                summary.evicted += router.on_host_read(&ReadOp::new(keys));
            }
            TraceEvent::Advance { ms } => clock.advance(Duration::from_millis(ms)),
            TraceEvent::Purge => summary.purged += router.purge_expired(),
        }
    }

    info!(
        batches = summary.batches.len(),
        evicted = summary.evicted,
        "replay finished"
    );
    Ok(summary)
}
