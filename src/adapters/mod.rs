//! Tool adapter layer
//!
//! Shields the fusion engine from external-tool presence, versioning and I/O
//! semantics. Each adapter wraps one analyzer behind a uniform contract:
//! an O(1) availability probe, a description captured into the report's
//! availability snapshot, and a bounded `analyze` call that normalizes the
//! tool's output into evidence.
//!
//! Adapter results are cached on disk for 24 hours, keyed by the adapter
//! version and the content hash of the input set. A timed-out tool is
//! recorded as partial; its evidence carries the partial flag and the fusion
//! stage applies the partiality penalty.

pub mod jscpd;
pub mod knip;
pub mod lizard;
pub mod ruff;
pub mod vulture;

pub use jscpd::JscpdAdapter;
pub use knip::KnipAdapter;
pub use lizard::LizardAdapter;
pub use ruff::RuffAdapter;
pub use vulture::VultureAdapter;

use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::collectors::ScanContext;
use crate::error::{AuditError, Result};
use crate::fs_utils::{cache_base_dir, write_atomic};
use crate::schema::{fnv1a_hash, Artifact, Evidence};

/// Cache entries expire after this many seconds
const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Description of a discovered tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name
    pub name: String,

    /// Detected version, when the probe could read one
    pub version: Option<String>,

    /// What the tool contributes
    pub capabilities: Vec<String>,
}

/// Result of one adapter invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOutcome {
    /// Normalized evidence
    pub evidence: Vec<Evidence>,

    /// True when the tool timed out and the evidence may be incomplete
    pub partial: bool,
}

/// Uniform contract over external analyzers
pub trait ToolAdapter: Send + Sync {
    /// Stable adapter name, used as the availability-snapshot key
    fn name(&self) -> &'static str;

    /// Adapter version; part of the cache key so parser changes invalidate
    fn adapter_version(&self) -> &'static str;

    /// Executable probed on PATH
    fn executable(&self) -> &'static str;

    /// Capability tags captured into the report
    fn capabilities(&self) -> Vec<&'static str>;

    /// O(1) presence probe. Never touches the network.
    fn is_available(&self) -> bool {
        which::which(self.executable()).is_ok()
    }

    /// Best-effort version string from `<tool> --version`
    fn probe_version(&self) -> Option<String> {
        let output = run_with_timeout(
            {
                let mut cmd = Command::new(self.executable());
                cmd.arg("--version");
                cmd
            },
            Duration::from_secs(5),
        )
        .ok()?;
        if output.timed_out {
            return None;
        }
        let line = output.stdout.lines().chain(output.stderr.lines()).next()?;
        Some(line.trim().to_string())
    }

    /// Tool description for the availability snapshot
    fn describe(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            version: self.probe_version(),
            capabilities: self.capabilities().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Run the tool against the artifact set and normalize its output.
    /// A timeout is an outcome (`partial: true`), never an error.
    fn analyze(&self, ctx: &ScanContext, artifacts: &[Artifact]) -> Result<AdapterOutcome>;
}

/// The built-in adapter set, in deterministic order
pub fn builtin_adapters() -> Vec<Box<dyn ToolAdapter>> {
    vec![
        Box::new(JscpdAdapter),
        Box::new(KnipAdapter),
        Box::new(LizardAdapter),
        Box::new(RuffAdapter),
        Box::new(VultureAdapter),
    ]
}

/// An adapter with its presence resolved at session start.
///
/// Discovery happens once; mid-scan changes to PATH do not affect a running
/// session.
pub struct DiscoveredAdapter {
    pub adapter: Box<dyn ToolAdapter>,
    pub available: bool,
    pub info: ToolInfo,
}

/// Probe every adapter once and freeze the result
pub fn discover(adapters: Vec<Box<dyn ToolAdapter>>) -> Vec<DiscoveredAdapter> {
    adapters
        .into_iter()
        .map(|adapter| {
            let available = adapter.is_available();
            let info = if available {
                adapter.describe()
            } else {
                ToolInfo {
                    name: adapter.name().to_string(),
                    version: None,
                    capabilities: adapter
                        .capabilities()
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                }
            };
            DiscoveredAdapter {
                adapter,
                available,
                info,
            }
        })
        .collect()
}

/// Repo-relative paths of artifacts eligible for adapter analysis
pub fn artifact_path_set(artifacts: &[Artifact]) -> HashSet<String> {
    artifacts.iter().map(|a| a.path.clone()).collect()
}

// ============================================================================
// Bounded subprocess execution
// ============================================================================

/// Captured output of a bounded tool run
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Run a command with a deadline. On expiry the child is killed and the
/// partial output returned with `timed_out` set; a timeout is not an error.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ToolOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd.spawn().map_err(|e| AuditError::ToolError {
        tool: program.clone(),
        message: format!("failed to spawn: {}", e),
    })?;

    // Drain pipes on threads so a chatty tool cannot deadlock on a full pipe
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if Instant::now() >= deadline {
                    timed_out = true;
                    let _ = child.kill();
                    let status = child.wait().ok();
                    break status.and_then(|s| s.code());
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(AuditError::ToolError {
                    tool: program,
                    message: format!("wait failed: {}", e),
                });
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();

    Ok(ToolOutput {
        stdout,
        stderr,
        exit_code,
        timed_out,
    })
}

// ============================================================================
// Result cache
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct CachedOutcome {
    /// Epoch seconds at write time
    created_at: u64,

    /// The cached outcome (never partial; partial runs are not cached)
    outcome: AdapterOutcome,
}

/// Cache key over the adapter version and the input content hashes
pub fn cache_key(adapter: &dyn ToolAdapter, artifacts: &[Artifact]) -> String {
    let mut hashes: Vec<&str> = artifacts.iter().map(|a| a.content_hash.as_str()).collect();
    hashes.sort_unstable();
    let input = format!(
        "{}|{}|{}",
        adapter.name(),
        adapter.adapter_version(),
        hashes.join(",")
    );
    format!("{:016x}", fnv1a_hash(&input))
}

fn cache_path(adapter: &dyn ToolAdapter, key: &str) -> PathBuf {
    cache_base_dir()
        .join("adapters")
        .join(format!("{}-{}.json", adapter.name(), key))
}

/// Look up a fresh cached outcome; absence and corruption read as a miss.
pub fn cache_lookup(adapter: &dyn ToolAdapter, key: &str, now_epoch: u64) -> Option<AdapterOutcome> {
    let path = cache_path(adapter, key);
    let contents = std::fs::read_to_string(path).ok()?;
    let cached: CachedOutcome = serde_json::from_str(&contents).ok()?;
    if now_epoch.saturating_sub(cached.created_at) > CACHE_TTL_SECS {
        return None;
    }
    Some(cached.outcome)
}

/// Store a complete outcome. Partial outcomes are never cached, so a rerun
/// after a timeout gets a full attempt.
pub fn cache_store(
    adapter: &dyn ToolAdapter,
    key: &str,
    outcome: &AdapterOutcome,
    now_epoch: u64,
) {
    if outcome.partial {
        return;
    }
    let cached = CachedOutcome {
        created_at: now_epoch,
        outcome: outcome.clone(),
    };
    if let Ok(serialized) = serde_json::to_vec(&cached) {
        let path = cache_path(adapter, key);
        if let Err(e) = write_atomic(&path, &serialized) {
            tracing::warn!(adapter = adapter.name(), error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArtifactKind, EvidenceSource, SignalKind};

    struct NullAdapter;

    impl ToolAdapter for NullAdapter {
        fn name(&self) -> &'static str {
            "null"
        }
        fn adapter_version(&self) -> &'static str {
            "null-1"
        }
        fn executable(&self) -> &'static str {
            "definitely-not-on-path-9f2c"
        }
        fn capabilities(&self) -> Vec<&'static str> {
            vec![]
        }
        fn analyze(&self, _ctx: &ScanContext, _artifacts: &[Artifact]) -> Result<AdapterOutcome> {
            Ok(AdapterOutcome::default())
        }
    }

    fn artifact(path: &str, hash: &str) -> Artifact {
        Artifact {
            path: path.to_string(),
            kind: ArtifactKind::File,
            byte_size: 10,
            line_count: 1,
            content_hash: hash.to_string(),
            last_modified: None,
            inbound_refs: None,
        }
    }

    #[test]
    fn test_missing_executable_not_available() {
        assert!(!NullAdapter.is_available());
    }

    #[test]
    fn test_cache_key_is_input_order_independent() {
        let a = [artifact("a.rs", "h1"), artifact("b.rs", "h2")];
        let b = [artifact("b.rs", "h2"), artifact("a.rs", "h1")];
        assert_eq!(cache_key(&NullAdapter, &a), cache_key(&NullAdapter, &b));
    }

    #[test]
    fn test_cache_key_changes_with_content() {
        let a = [artifact("a.rs", "h1")];
        let b = [artifact("a.rs", "h-other")];
        assert_ne!(cache_key(&NullAdapter, &a), cache_key(&NullAdapter, &b));
    }

    #[test]
    fn test_cache_round_trip_and_ttl() {
        let outcome = AdapterOutcome {
            evidence: vec![Evidence::new(
                "file:a.rs",
                EvidenceSource::StaticAnalysis,
                SignalKind::UnusedSymbol,
                0.8,
                0.8,
                "null-1",
            )],
            partial: false,
        };
        let key = format!("{:016x}", fnv1a_hash("cache-round-trip-test"));
        cache_store(&NullAdapter, &key, &outcome, 1_000_000);

        let hit = cache_lookup(&NullAdapter, &key, 1_000_100).expect("cache hit");
        assert_eq!(hit.evidence.len(), 1);

        // Expired entry reads as a miss
        assert!(cache_lookup(&NullAdapter, &key, 1_000_000 + CACHE_TTL_SECS + 1).is_none());

        let _ = std::fs::remove_file(cache_path(&NullAdapter, &key));
    }

    #[test]
    fn test_partial_outcomes_not_cached() {
        let outcome = AdapterOutcome {
            evidence: Vec::new(),
            partial: true,
        };
        let key = format!("{:016x}", fnv1a_hash("partial-cache-test"));
        cache_store(&NullAdapter, &key, &outcome, 1_000_000);
        assert!(cache_lookup(&NullAdapter, &key, 1_000_001).is_none());
    }

    #[test]
    fn test_run_with_timeout_captures_output() {
        let mut cmd = Command::new("echo");
        cmd.arg("hello");
        let output = run_with_timeout(cmd, Duration::from_secs(10)).unwrap();
        assert!(!output.timed_out);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.exit_code, Some(0));
    }

    #[test]
    fn test_run_with_timeout_kills_slow_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let start = Instant::now();
        let output = run_with_timeout(cmd, Duration::from_millis(200)).unwrap();
        assert!(output.timed_out);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
