//! `switchyard check` command implementation.
//!
//! Validates the topology file:
//! - JSON Schema validation against the embedded `Topology.schema.json`
//! - Wiring checks: every trigger must resolve its identity and endpoint
//! - Warnings for configuration that is valid but probably unintended

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

use switchyard_core::{TopologyConfig, TopologyError};

/// Compiled into the binary so validation works without external files.
const TOPOLOGY_SCHEMA: &str = include_str!("../../../../schemas/Topology.schema.json");

/// Cloud Scheduler accepts at most this many retries per job.
const MAX_SCHEDULER_RETRIES: u32 = 5;

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Warning - valid but probably not what was meant.
    Warning,
    /// Error - the topology cannot be planned.
    Error,
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Category of the check that produced this finding.
    pub category: String,
    pub message: String,
    pub file: Option<PathBuf>,
    /// Location within the file (e.g., "triggers.daily-scout").
    pub location: Option<String>,
}

impl CheckFinding {
    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category: category.into(),
            message: message.into(),
            file: None,
            location: None,
        }
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category: category.into(),
            message: message.into(),
            file: None,
            location: None,
        }
    }

    fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn extend(&mut self, findings: impl IntoIterator<Item = CheckFinding>) {
        self.findings.extend(findings);
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Print human-readable summary.
    pub fn print_summary(&self) {
        for (severity, heading) in [(Severity::Error, "❌ Errors"), (Severity::Warning, "⚠️  Warnings")] {
            let mut group: Vec<_> = self
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            group.sort_by(|a, b| a.category.cmp(&b.category));

            println!("\n{} ({}):", heading, group.len());
            println!("{}", "─".repeat(60));
            for finding in group {
                print_finding(finding);
            }
        }

        println!();
        println!("{}", "═".repeat(60));
        if self.findings.is_empty() {
            println!("✅ All checks passed!");
        } else {
            println!(
                "Summary: {} error(s), {} warning(s)",
                self.error_count(),
                self.warning_count()
            );
            if self.has_errors() {
                println!("\n❌ Topology has errors that must be fixed.");
            }
        }
    }
}

fn print_finding(finding: &CheckFinding) {
    let icon = match finding.severity {
        Severity::Error => "✗",
        Severity::Warning => "⚠",
    };

    let location = match (&finding.file, &finding.location) {
        (Some(f), Some(l)) => format!(" [{}:{}]", f.display(), l),
        (Some(f), None) => format!(" [{}]", f.display()),
        (None, Some(l)) => format!(" [{}]", l),
        (None, None) => String::new(),
    };

    println!(
        "  {} [{}]{}: {}",
        icon, finding.category, location, finding.message
    );
}

// ============================================================================
// Main Check Runner
// ============================================================================

/// Run all checks without printing.
pub fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let mut results = CheckResults::default();

    results.extend(validate_json_schema(config_path)?);

    let config = TopologyConfig::load_with_context(config_path)
        .context("Failed to load topology")?;

    results.extend(check_wiring(&config));
    results.extend(check_unused_identities(&config));
    results.extend(check_untriggered_services(&config));
    results.extend(check_scheduler_retries(&config));

    Ok(results)
}

/// Run all checks and print a report. Fails if any error was found.
pub fn run(config_path: &Path) -> Result<()> {
    println!("🔍 Checking {}...", config_path.display());

    let results = run_quiet(config_path)?;
    results.print_summary();

    if results.has_errors() {
        anyhow::bail!("Topology check failed with {} error(s)", results.error_count());
    }
    Ok(())
}

// ============================================================================
// Check 1: JSON Schema Validation
// ============================================================================

fn validate_json_schema(config_path: &Path) -> Result<Vec<CheckFinding>> {
    let schema: JsonValue =
        serde_json::from_str(TOPOLOGY_SCHEMA).context("Failed to parse embedded topology schema")?;
    let display_name = config_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| config_path.display().to_string());

    let mut findings = Vec::new();

    let content = match fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            findings.push(
                CheckFinding::error("json-schema", format!("Failed to read file: {}", e))
                    .with_file(config_path),
            );
            return Ok(findings);
        }
    };

    let yaml_value: JsonValue = match serde_yaml::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            findings.push(
                CheckFinding::error("json-schema", format!("Failed to parse YAML: {}", e))
                    .with_file(config_path),
            );
            return Ok(findings);
        }
    };

    let compiled = jsonschema::validator_for(&schema)
        .map_err(|e| anyhow::anyhow!("Failed to compile topology schema: {}", e))?;

    for error in compiled.iter_errors(&yaml_value) {
        let path_str = error.instance_path().to_string();
        let location = if path_str.is_empty() {
            "(root)".to_string()
        } else {
            path_str
        };

        findings.push(
            CheckFinding::error("json-schema", error.to_string())
                .with_file(&display_name)
                .with_location(location),
        );
    }

    Ok(findings)
}

// ============================================================================
// Check 2: Wiring
// ============================================================================

/// Every trigger that cannot be added to the graph, not just the first.
fn check_wiring(config: &TopologyConfig) -> Vec<CheckFinding> {
    match config.build_graph_collecting() {
        Ok((_, errors)) => errors.iter().map(wiring_finding).collect(),
        Err(e) => vec![wiring_finding(&e)],
    }
}

fn wiring_finding(error: &TopologyError) -> CheckFinding {
    let finding = CheckFinding::error("wiring", error.to_string());
    match error.edge_name() {
        Some(edge) => finding.with_location(format!("triggers.{}", edge)),
        None => finding,
    }
}

// ============================================================================
// Check 3: Unreferenced Definitions
// ============================================================================

fn check_unused_identities(config: &TopologyConfig) -> Vec<CheckFinding> {
    config
        .unused_identities()
        .into_iter()
        .map(|name| {
            CheckFinding::warning(
                "unused-identity",
                format!("Identity '{}' is not used by any trigger", name),
            )
            .with_location(format!("identities.{}", name))
        })
        .collect()
}

fn check_untriggered_services(config: &TopologyConfig) -> Vec<CheckFinding> {
    config
        .untriggered_services()
        .into_iter()
        .map(|name| {
            CheckFinding::warning(
                "untriggered-service",
                format!("Service '{}' is not the target of any trigger", name),
            )
            .with_location(format!("services.{}", name))
        })
        .collect()
}

// ============================================================================
// Check 4: Scheduler Retry Limits
// ============================================================================

fn check_scheduler_retries(config: &TopologyConfig) -> Vec<CheckFinding> {
    config
        .triggers
        .iter()
        .filter(|t| t.cron.is_some())
        .filter_map(|t| {
            // Invalid policies are reported by the wiring check.
            let policy = t.retry.to_policy().ok()?;
            (policy.max_retries() > MAX_SCHEDULER_RETRIES).then(|| {
                CheckFinding::warning(
                    "scheduler-retry",
                    format!(
                        "Trigger '{}' asks for {} retries; Cloud Scheduler allows at most {}",
                        t.name,
                        policy.max_retries(),
                        MAX_SCHEDULER_RETRIES
                    ),
                )
                .with_location(format!("triggers.{}.retry", t.name))
            })
        })
        .collect()
}
