//! Replication of team memberships through the identity resolver.

use crate::api::OrgApi;
use crate::hierarchy::{MatchedTeam, TeamOrigin};
use crate::identity::{IdentityResolver, UnresolvedReason};
use crate::model::{correlation_key, TeamRole};
use crate::report::{AddedMember, DiscrepancyKind, FailureKind, MigrationReport, UnresolvedEntry};
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};

pub struct MembershipReconciler<'a> {
    source: &'a dyn OrgApi,
    target: &'a dyn OrgApi,
    resolver: &'a IdentityResolver,
}

impl<'a> MembershipReconciler<'a> {
    pub fn new(source: &'a dyn OrgApi, target: &'a dyn OrgApi, resolver: &'a IdentityResolver) -> Self {
        MembershipReconciler {
            source,
            target,
            resolver,
        }
    }

    /// Add every resolvable source member to the matching target team with
    /// the same role. Members that cannot be resolved or added are listed as
    /// unresolved; that is a normal outcome, not a run failure.
    ///
    /// The source listing of a team also returns the members of its child
    /// teams, so those members end up as direct members of every ancestor in
    /// the target.
    pub async fn reconcile(&self, teams: &[MatchedTeam], report: &mut MigrationReport) {
        for parent in teams_with_children(teams) {
            warn!(
                "Members listed for team {} include those of its child teams; they are added to {} directly",
                parent, parent
            );
        }
        for matched in teams {
            self.reconcile_team(matched, report).await;
        }
    }

    async fn reconcile_team(&self, matched: &MatchedTeam, report: &mut MigrationReport) {
        let team = &matched.source.name;
        let members = match self.source.list_team_members(&matched.source.slug).await {
            Ok(members) => members,
            Err(e) => {
                error!("Failed to list members of source team {}: {}", team, e);
                report.record_failure(FailureKind::ReadMembers, team.clone(), e);
                return;
            }
        };
        debug!("Source team {} has {} member(s)", team, members.len());

        let current = self.current_members(matched).await;
        for member in members {
            let target_login = match self.resolver.resolve(&member.login) {
                Ok(login) => login,
                Err(reason) => {
                    info!("Cannot place {} in team {}: {}", member.login, team, reason);
                    report.unresolved.push(UnresolvedEntry {
                        team: team.clone(),
                        source_login: member.login,
                        reason,
                    });
                    continue;
                }
            };

            match current.get(&correlation_key(&target_login)) {
                Some(&role) if role == member.role => {
                    debug!("{} is already {} of {}", target_login, role, matched.target.slug);
                    report.members_unchanged += 1;
                    continue;
                }
                Some(&TeamRole::Maintainer) => {
                    warn!(
                        "{} is maintainer of {} in the target but member in the source; leaving it",
                        target_login, matched.target.slug
                    );
                    report.record_discrepancy(
                        DiscrepancyKind::MaintainerRoleKept,
                        team,
                        format!("{} kept as maintainer", target_login),
                    );
                    report.members_unchanged += 1;
                    continue;
                }
                _ => {}
            }

            match self
                .target
                .add_team_member(&matched.target.slug, &target_login, member.role)
                .await
            {
                Ok(()) => report.members_added.push(AddedMember {
                    team: team.clone(),
                    source_login: member.login,
                    target_login,
                    role: member.role,
                }),
                Err(e) => {
                    error!("Failed to add {} to team {}: {}", target_login, matched.target.slug, e);
                    report.unresolved.push(UnresolvedEntry {
                        team: team.clone(),
                        source_login: member.login,
                        reason: UnresolvedReason::MembershipWriteFailed(e.to_string()),
                    });
                }
            }
        }
    }

    async fn current_members(&self, matched: &MatchedTeam) -> HashMap<String, TeamRole> {
        if matched.origin == TeamOrigin::Created {
            return HashMap::new();
        }
        match self.target.list_team_members(&matched.target.slug).await {
            Ok(members) => members
                .into_iter()
                .map(|m| (correlation_key(&m.login), m.role))
                .collect(),
            Err(e) => {
                warn!(
                    "Could not read current members of target team {}: {}; re-adding all",
                    matched.target.slug, e
                );
                HashMap::new()
            }
        }
    }
}

/// Names of the source teams that are the parent of another migrated team.
fn teams_with_children(teams: &[MatchedTeam]) -> Vec<&str> {
    let parents: HashSet<u64> = teams.iter().filter_map(|m| m.source.parent_id).collect();
    teams
        .iter()
        .filter(|m| parents.contains(&m.source.id))
        .map(|m| m.source.name.as_str())
        .collect()
}
