/*!
    Migration orchestrator.

    Reads the source organization, then drives the target organization toward
    the same team hierarchy, repository permissions and memberships. Nothing is
    ever written to the source. In dry-run mode the target is wrapped in
    [`DryRunApi`] so every write becomes a logged intent while reads, and the
    report, stay the same.
*/

use crate::api::OrgApi;
use crate::dry_run::DryRunApi;
use crate::error::AppResult;
use crate::hierarchy::TeamReconciler;
use crate::identity::IdentityResolver;
use crate::mapping::IdentityMapping;
use crate::membership::MembershipReconciler;
use crate::permissions::PermissionReconciler;
use crate::report::MigrationReport;
use crate::retry::ConsistencyPolicy;
use log::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    pub dry_run: bool,
    pub allow_login_fallback: bool,
    pub consistency: ConsistencyPolicy,
}

pub struct Migrator<'a> {
    source: &'a dyn OrgApi,
    target: &'a dyn OrgApi,
    mapping: IdentityMapping,
    options: MigrationOptions,
}

impl<'a> Migrator<'a> {
    pub fn new(
        source: &'a dyn OrgApi,
        target: &'a dyn OrgApi,
        mapping: IdentityMapping,
        options: MigrationOptions,
    ) -> Self {
        Migrator {
            source,
            target,
            mapping,
            options,
        }
    }

    ///
    /// Run one full migration pass.
    ///
    /// Errors are returned only when a whole phase cannot start (the source
    /// teams, the target teams, target repositories or target members cannot
    /// be read). Failures of single teams, bindings or members end up in the
    /// report.
    ///
    pub async fn run(self) -> AppResult<MigrationReport> {
        let dry_run_target = DryRunApi::new(self.target);
        let target: &dyn OrgApi = if self.options.dry_run {
            info!("Running in dry-run mode; no changes will be applied to {}", self.target.org());
            &dry_run_target
        } else {
            info!("Running in apply mode; changes will be applied to {}", self.target.org());
            self.target
        };
        let mut report = MigrationReport::new(self.options.dry_run);

        let source_teams = self.source.list_teams().await?;
        info!("{} has {} team(s)", self.source.org(), source_teams.len());

        let resolver =
            IdentityResolver::load(self.mapping, target, self.options.allow_login_fallback).await?;

        info!("Reconciling team hierarchy");
        let matched = TeamReconciler::new(self.source.org(), target, self.options.consistency)
            .reconcile(&source_teams, &mut report)
            .await?;

        info!("Reconciling repository permissions for {} team(s)", matched.len());
        PermissionReconciler::new(self.source, target)
            .reconcile(&matched, &mut report)
            .await?;

        info!("Reconciling team memberships for {} team(s)", matched.len());
        MembershipReconciler::new(self.source, target, &resolver)
            .reconcile(&matched, &mut report)
            .await;

        info!(
            "Migration from {} to {} finished with {} failure(s)",
            self.source.org(),
            target.org(),
            report.failures.len()
        );
        Ok(report)
    }
}
