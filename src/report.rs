/*!
    Migration report.

    Collects everything the reconcilers did, skipped or failed to do during one
    run. The three operator-facing tables (teams already present, repositories
    missing in the target, unresolved members) plus the failure and structural
    discrepancy tables are exported as CSV; a colored summary goes to stdout.
*/

use crate::error::AppResult;
use crate::identity::UnresolvedReason;
use crate::model::{Permission, TeamRole};
use colored::*;
use log::info;
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::path::{Path, PathBuf};

fn display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Source team matched by name to a team that already existed in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTeam {
    pub team: String,
    pub target_slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTeam {
    pub team: String,
    pub target_slug: String,
    pub parent: Option<String>,
}

/// Source binding whose repository does not exist in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRepo {
    pub team: String,
    pub repo: String,
    #[serde(serialize_with = "display")]
    pub permission: Permission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedBinding {
    pub team: String,
    pub repo: String,
    #[serde(serialize_with = "display")]
    pub permission: Permission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedMember {
    pub team: String,
    pub source_login: String,
    pub target_login: String,
    #[serde(serialize_with = "display")]
    pub role: TeamRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedEntry {
    pub team: String,
    pub source_login: String,
    #[serde(serialize_with = "display")]
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    CreateTeam,
    ReadBindings,
    WriteBinding,
    ReadMembers,
}

/// A single work item that failed after retries; the run carried on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub subject: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscrepancyKind {
    /// Parent failed or was excluded; the team was created without a parent.
    ParentNotMatched,
    /// Parent id does not belong to any source team.
    ParentMissingInSource,
    /// Team sits on a parent cycle and was excluded.
    CyclicHierarchy,
    /// Matched by name to a target team whose parent differs.
    HierarchyMismatch,
    /// Secret team created under a parent, so made visible to the org.
    PrivacyAdjusted,
    /// Target already grants a higher permission; left untouched.
    HigherPermissionKept,
    /// Target member is a maintainer while the source role is member.
    MaintainerRoleKept,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub team: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub teams_created: Vec<CreatedTeam>,
    pub teams_skipped: Vec<SkippedTeam>,
    pub bindings_applied: Vec<AppliedBinding>,
    pub bindings_unchanged: usize,
    pub repos_skipped: Vec<SkippedRepo>,
    pub members_added: Vec<AddedMember>,
    pub members_unchanged: usize,
    pub unresolved: Vec<UnresolvedEntry>,
    pub failures: Vec<Failure>,
    pub discrepancies: Vec<Discrepancy>,
}

impl MigrationReport {
    pub fn new(dry_run: bool) -> Self {
        MigrationReport {
            dry_run,
            ..Default::default()
        }
    }

    pub fn record_failure(&mut self, kind: FailureKind, subject: impl Into<String>, error: impl Display) {
        self.failures.push(Failure {
            kind,
            subject: subject.into(),
            error: error.to_string(),
        });
    }

    pub fn record_discrepancy(&mut self, kind: DiscrepancyKind, team: &str, detail: impl Into<String>) {
        self.discrepancies.push(Discrepancy {
            kind,
            team: team.to_string(),
            detail: detail.into(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Write every table as a CSV file into `dir` (created if needed) and
    /// return the paths written.
    pub fn write_csv(&self, dir: &Path) -> AppResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let written = vec![
            write_table(dir, "teams_skipped.csv", &["team", "target_slug"], &self.teams_skipped)?,
            write_table(dir, "teams_created.csv", &["team", "target_slug", "parent"], &self.teams_created)?,
            write_table(dir, "repos_skipped.csv", &["team", "repo", "permission"], &self.repos_skipped)?,
            write_table(
                dir,
                "unresolved_members.csv",
                &["team", "source_login", "reason"],
                &self.unresolved,
            )?,
            write_table(dir, "failures.csv", &["kind", "subject", "error"], &self.failures)?,
            write_table(dir, "discrepancies.csv", &["kind", "team", "detail"], &self.discrepancies)?,
        ];
        info!("Wrote {} report file(s) to {}", written.len(), dir.display());
        Ok(written)
    }

    pub fn print_summary(&self) {
        let heading = if self.dry_run {
            "Dry run summary (nothing was changed)"
        } else {
            "Migration summary"
        };
        println!("{}", heading.bold());
        println!(
            "  Teams:       {} created, {} already present",
            self.teams_created.len().to_string().green(),
            self.teams_skipped.len().to_string().yellow()
        );
        println!(
            "  Permissions: {} applied, {} unchanged, {} skipped (repository missing in target)",
            self.bindings_applied.len().to_string().green(),
            self.bindings_unchanged,
            self.repos_skipped.len().to_string().yellow()
        );
        println!(
            "  Members:     {} added, {} unchanged, {} unresolved",
            self.members_added.len().to_string().green(),
            self.members_unchanged,
            self.unresolved.len().to_string().red()
        );
        if !self.discrepancies.is_empty() {
            println!(
                "  {} structural discrepanc(ies) need review",
                self.discrepancies.len().to_string().yellow()
            );
        }
        if self.has_failures() {
            println!("  {} failure(s):", self.failures.len().to_string().red());
            for failure in &self.failures {
                println!("    {:?} {}: {}", failure.kind, failure.subject, failure.error.red());
            }
        }
    }
}

/// The header row is written up front so an empty table still names its
/// columns.
fn write_table<T: Serialize>(dir: &Path, name: &str, header: &[&str], rows: &[T]) -> AppResult<PathBuf> {
    let path = dir.join(name);
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(path)
}
