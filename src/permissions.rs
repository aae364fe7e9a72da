//! Replication of team repository permissions.

use crate::api::OrgApi;
use crate::error::AppResult;
use crate::hierarchy::{MatchedTeam, TeamOrigin};
use crate::model::{correlation_key, Permission};
use crate::report::{AppliedBinding, DiscrepancyKind, FailureKind, MigrationReport, SkippedRepo};
use log::{debug, error, info, warn};
use std::collections::HashMap;

pub struct PermissionReconciler<'a> {
    source: &'a dyn OrgApi,
    target: &'a dyn OrgApi,
}

impl<'a> PermissionReconciler<'a> {
    pub fn new(source: &'a dyn OrgApi, target: &'a dyn OrgApi) -> Self {
        PermissionReconciler { source, target }
    }

    ///
    /// Grant every matched target team the permissions its source team holds.
    ///
    /// Repositories absent from the target are skipped and reported. A
    /// binding the target already has at the same or a higher level is not
    /// rewritten. A failed read or write affects only that team or binding.
    ///
    pub async fn reconcile(&self, teams: &[MatchedTeam], report: &mut MigrationReport) -> AppResult<()> {
        let target_repos: HashMap<String, String> = self
            .target
            .list_repos()
            .await?
            .into_iter()
            .map(|r| (correlation_key(&r.name), r.name))
            .collect();
        info!("{} has {} repositories", self.target.org(), target_repos.len());

        for matched in teams {
            self.reconcile_team(matched, &target_repos, report).await;
        }
        Ok(())
    }

    async fn reconcile_team(
        &self,
        matched: &MatchedTeam,
        target_repos: &HashMap<String, String>,
        report: &mut MigrationReport,
    ) {
        let team = &matched.source.name;
        let bindings = match self.source.list_team_repos(&matched.source.slug).await {
            Ok(bindings) => bindings,
            Err(e) => {
                error!("Failed to list repositories of source team {}: {}", team, e);
                report.record_failure(FailureKind::ReadBindings, team.clone(), e);
                return;
            }
        };
        debug!("Source team {} has {} repository binding(s)", team, bindings.len());

        let current = self.current_bindings(matched).await;
        for binding in bindings {
            let key = correlation_key(&binding.repo);
            let Some(repo) = target_repos.get(&key) else {
                info!(
                    "Skipping {} for team {}: repository not found in {}",
                    binding.repo,
                    team,
                    self.target.org()
                );
                report.repos_skipped.push(SkippedRepo {
                    team: team.clone(),
                    repo: binding.repo,
                    permission: binding.permission,
                });
                continue;
            };

            match current.get(&key) {
                Some(&existing) if existing == binding.permission => {
                    debug!("Team {} already has {} on {}", team, existing, repo);
                    report.bindings_unchanged += 1;
                    continue;
                }
                Some(&existing) if existing > binding.permission => {
                    warn!(
                        "Team {} has {} on {} in the target, higher than {} in the source; leaving it",
                        team, existing, repo, binding.permission
                    );
                    report.record_discrepancy(
                        DiscrepancyKind::HigherPermissionKept,
                        team,
                        format!("{}: target {} kept over source {}", repo, existing, binding.permission),
                    );
                    report.bindings_unchanged += 1;
                    continue;
                }
                _ => {}
            }

            match self
                .target
                .set_team_repo_permission(&matched.target.slug, repo, binding.permission)
                .await
            {
                Ok(()) => report.bindings_applied.push(AppliedBinding {
                    team: team.clone(),
                    repo: repo.clone(),
                    permission: binding.permission,
                }),
                Err(e) => {
                    error!("Failed to grant team {} {} on {}: {}", team, binding.permission, repo, e);
                    report.record_failure(FailureKind::WriteBinding, format!("{}/{}", team, repo), e);
                }
            }
        }
    }

    /// Permissions the target team already holds. Teams created in this run
    /// have none, so they are not read.
    async fn current_bindings(&self, matched: &MatchedTeam) -> HashMap<String, Permission> {
        if matched.origin == TeamOrigin::Created {
            return HashMap::new();
        }
        match self.target.list_team_repos(&matched.target.slug).await {
            Ok(bindings) => bindings
                .into_iter()
                .map(|b| (correlation_key(&b.repo), b.permission))
                .collect(),
            Err(e) => {
                warn!(
                    "Could not read current permissions of target team {}: {}; rewriting all",
                    matched.target.slug, e
                );
                HashMap::new()
            }
        }
    }
}
