//! Verification between apply and commit
//!
//! The verifier is invoked after every applied remediation action and gates
//! the commit: only a PASSED result lets a transaction complete. It must be
//! idempotent and side-effect-free against the working tree. The default
//! implementation detects the project's build and test entry points and runs
//! them; hosts may substitute anything satisfying the trait (a test subset
//! for speed, a scripted result in tests).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::run_with_timeout;

/// Outcome of one verifier invocation. A timeout is treated as FAILED by the
/// executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerifierResult {
    Passed,
    Failed,
    Timeout,
}

impl VerifierResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Only PASSED lets a transaction commit
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Externally-replaceable verification hook
pub trait Verifier: Send + Sync {
    fn verify(&self, root: &Path) -> VerifierResult;
}

/// Closures work directly as verifiers
impl<F> Verifier for F
where
    F: Fn(&Path) -> VerifierResult + Send + Sync,
{
    fn verify(&self, root: &Path) -> VerifierResult {
        self(root)
    }
}

// ============================================================================
// Default build+test verifier
// ============================================================================

/// Detected project toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toolchain {
    Cargo,
    Go,
    Pytest,
    Npm,
    Unknown,
}

fn detect_toolchain(root: &Path) -> Toolchain {
    if root.join("Cargo.toml").exists() {
        return Toolchain::Cargo;
    }
    if root.join("go.mod").exists() {
        return Toolchain::Go;
    }
    if root.join("pytest.ini").exists()
        || root.join("pyproject.toml").exists()
        || root.join("setup.py").exists()
        || root.join("conftest.py").exists()
    {
        return Toolchain::Pytest;
    }
    if root.join("package.json").exists() {
        return Toolchain::Npm;
    }
    Toolchain::Unknown
}

/// Default verifier: the project's declared build and test entry points
#[derive(Debug, Clone)]
pub struct DefaultVerifier {
    timeout: Duration,
}

impl DefaultVerifier {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn command_sets(toolchain: Toolchain) -> Vec<Vec<&'static str>> {
        match toolchain {
            Toolchain::Cargo => vec![
                vec!["cargo", "build", "--quiet"],
                vec!["cargo", "test", "--quiet"],
            ],
            Toolchain::Go => vec![vec!["go", "build", "./..."], vec!["go", "test", "./..."]],
            Toolchain::Pytest => vec![vec!["python", "-m", "pytest", "-q"]],
            Toolchain::Npm => vec![vec!["npm", "test", "--silent"]],
            Toolchain::Unknown => Vec::new(),
        }
    }
}

impl Verifier for DefaultVerifier {
    fn verify(&self, root: &Path) -> VerifierResult {
        let toolchain = detect_toolchain(root);
        let commands = Self::command_sets(toolchain);
        if commands.is_empty() {
            // Nothing declared to run; vacuously passed, loudly
            tracing::warn!(
                root = %root.display(),
                "no build or test entry points detected; verification is vacuous"
            );
            return VerifierResult::Passed;
        }

        for argv in commands {
            let mut cmd = Command::new(argv[0]);
            cmd.args(&argv[1..]);
            cmd.current_dir(root);

            let output = match run_with_timeout(cmd, self.timeout) {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(command = argv.join(" "), error = %e, "verifier spawn failed");
                    return VerifierResult::Failed;
                }
            };
            if output.timed_out {
                return VerifierResult::Timeout;
            }
            if output.exit_code != Some(0) {
                tracing::info!(
                    command = argv.join(" "),
                    exit_code = ?output.exit_code,
                    "verification failed"
                );
                return VerifierResult::Failed;
            }
        }
        VerifierResult::Passed
    }
}
