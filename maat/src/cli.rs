//! Operator commands.
//!
//! Every command works on local files. `report` runs the full pipeline over
//! an in-memory store described by a case manifest.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Subcommand;
use serde::Deserialize;
use tracing::info;

use forensics::ArtifactKind;
use jurisdiction::{Action, RulesEngine, RulesetInputs};
use maat::{ArtifactUpload, AuditPacket, MaatConfig, MaatService, ServiceError, Verdict};

/// CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compile a ruleset and print the permission matrix
    Compile {
        /// Ruleset inputs (YAML)
        ruleset: PathBuf,
    },

    /// Evaluate one (platform, action) cell
    Evaluate {
        /// Ruleset inputs (YAML)
        ruleset: PathBuf,
        /// Platform name
        platform: String,
        /// Action, e.g. passive_view
        action: Action,
    },

    /// Run the language firewall over a text file
    Validate {
        /// File to validate
        file: PathBuf,
    },

    /// Generate a report and audit packet for a case manifest
    Report {
        /// Case manifest (YAML)
        case: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
    },

    /// Verify an audit packet against a report and its inputs
    Verify {
        /// Audit packet (JSON)
        audit: PathBuf,
        /// Rendered report
        report: PathBuf,
        /// Input artifacts in upload order
        inputs: Vec<PathBuf>,
    },
}

/// Command output and whether it should exit successfully.
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    fn failed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// A case as described on disk.
#[derive(Debug, Deserialize)]
struct CaseManifest {
    case_id: String,
    ruleset: RulesetInputs,
    #[serde(default)]
    artifacts: Vec<ManifestArtifact>,
}

#[derive(Debug, Deserialize)]
struct ManifestArtifact {
    kind: String,
    /// Relative to the manifest
    path: PathBuf,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    platform: Option<String>,
}

/// Execute a command.
pub async fn execute_command(config: MaatConfig, cmd: Commands) -> anyhow::Result<Outcome> {
    match cmd {
        Commands::Compile { ruleset } => {
            let inputs = load_ruleset(&ruleset)?;
            let compiled = RulesEngine::new().compile(&inputs)?;
            Ok(Outcome::ok(serde_json::to_string_pretty(&*compiled)?))
        }

        Commands::Evaluate {
            ruleset,
            platform,
            action,
        } => {
            let inputs = load_ruleset(&ruleset)?;
            let compiled = RulesEngine::new().compile(&inputs)?;
            Ok(Outcome::ok(compiled.matrix.evaluate(&platform, action).to_string()))
        }

        Commands::Validate { file } => {
            let text = read_text(&file)?;
            let firewall = maat::LanguageFirewall::new()
                .with_extra_terms(&config.firewall.extra_deny_terms);
            let verdict = firewall.validate(&text);
            let output = serde_json::to_string_pretty(&verdict)?;
            Ok(match verdict {
                Verdict::Approved { .. } => Outcome::ok(output),
                Verdict::IntegrityHalt { .. } => Outcome::failed(output),
            })
        }

        Commands::Report { case, out } => run_report(config, &case, &out).await,

        Commands::Verify {
            audit,
            report,
            inputs,
        } => {
            let packet: AuditPacket = serde_json::from_str(&read_text(&audit)?)
                .with_context(|| format!("parsing audit packet {}", audit.display()))?;
            let rendered = std::fs::read(&report)
                .with_context(|| format!("reading {}", report.display()))?;

            packet.verify()?;
            packet.verify_report(&rendered)?;
            if !inputs.is_empty() {
                let contents = inputs
                    .iter()
                    .map(|p| std::fs::read(p).with_context(|| format!("reading {}", p.display())))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                packet.verify_inputs(&contents)?;
            }
            Ok(Outcome::ok(format!(
                "verified: aggregate {} over {} input(s)",
                packet.aggregate_digest,
                packet.input_hashes.len()
            )))
        }
    }
}

async fn run_report(config: MaatConfig, case: &Path, out: &Path) -> anyhow::Result<Outcome> {
    let manifest: CaseManifest = serde_yaml::from_str(&read_text(case)?)
        .with_context(|| format!("parsing case manifest {}", case.display()))?;
    let base = case.parent().unwrap_or_else(|| Path::new("."));

    let mut uploads = Vec::with_capacity(manifest.artifacts.len());
    for entry in &manifest.artifacts {
        let kind: ArtifactKind = entry.kind.parse()?;
        let path = base.join(&entry.path);
        let content = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let source = entry
            .source
            .clone()
            .unwrap_or_else(|| entry.path.display().to_string());
        let mut upload = ArtifactUpload::new(kind, content, source);
        upload.platform = entry.platform.clone();
        uploads.push(upload);
    }

    let service = MaatService::in_memory().with_config(config);
    service.attach_ruleset(&manifest.case_id, manifest.ruleset).await?;
    service.ingest_artifacts(&manifest.case_id, uploads).await?;

    let generated = match service.generate_report(&manifest.case_id).await {
        Ok(generated) => generated,
        Err(ServiceError::IntegrityHalt { violations }) => {
            let lines: Vec<String> = violations.iter().map(|v| format!("- {v}")).collect();
            return Ok(Outcome::failed(format!(
                "INTEGRITY HALT: no report written\n{}",
                lines.join("\n")
            )));
        }
        Err(e) => return Err(e.into()),
    };

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let report_path = out.join("report.md");
    let audit_path = out.join("audit.json");
    std::fs::write(&report_path, &generated.report.rendered)?;
    std::fs::write(&audit_path, generated.packet.manifest()?)?;

    info!(
        case_id = %manifest.case_id,
        report = %report_path.display(),
        "Report written"
    );
    Ok(Outcome::ok(format!(
        "report: {}\naudit: {}\naggregate: {}",
        report_path.display(),
        audit_path.display(),
        generated.packet.aggregate_digest
    )))
}

fn load_ruleset(path: &Path) -> anyhow::Result<RulesetInputs> {
    let inputs = RulesetInputs::from_yaml(&read_text(path)?)
        .with_context(|| format!("parsing ruleset {}", path.display()))?;
    if inputs.jurisdiction.trim().is_empty() {
        bail!("ruleset {} has no jurisdiction", path.display());
    }
    Ok(inputs)
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
