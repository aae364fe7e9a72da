/*!
    Team hierarchy reconciliation.

    Source teams form a forest through their parent references. Teams are
    ordered by depth so that a parent is always matched (found by name or
    created) in the target before any of its children are looked at. Teams
    whose parent chain loops back on itself are excluded; teams whose parent
    could not be matched are still created, without a parent, and reported.
*/

use crate::api::OrgApi;
use crate::error::AppResult;
use crate::model::{correlation_key, NewTeam, Privacy, Team};
use crate::report::{CreatedTeam, DiscrepancyKind, FailureKind, MigrationReport, SkippedTeam};
use crate::retry::ConsistencyPolicy;
use log::{debug, error, info, warn};
use std::collections::HashMap;

/// Where a source team hangs in the source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    Root,
    /// Name of the parent source team.
    Source(String),
    /// Parent id that matches no source team.
    Missing(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTeam {
    pub team: Team,
    pub depth: usize,
    pub parent: ParentLink,
}

#[derive(Debug, Default)]
pub struct HierarchyPlan {
    /// Teams in processing order: non-decreasing depth, source order within
    /// one depth.
    pub ordered: Vec<PlannedTeam>,
    /// Teams on a parent cycle.
    pub cyclic: Vec<Team>,
}

#[derive(Debug, Clone, Copy)]
enum Mark {
    Depth(usize),
    Cyclic,
}

/// Order source teams parent-first for hierarchies of any depth.
///
/// Children of a cyclic team are placed at depth 0: their parent will never
/// be matched, so they do not need to wait for anything.
pub fn plan_hierarchy(teams: &[Team]) -> HierarchyPlan {
    let index_by_id: HashMap<u64, usize> = teams.iter().enumerate().map(|(i, t)| (t.id, i)).collect();
    let parent_of = |i: usize| teams[i].parent_id.and_then(|id| index_by_id.get(&id).copied());

    let mut marks: Vec<Option<Mark>> = vec![None; teams.len()];
    for start in 0..teams.len() {
        if marks[start].is_some() {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        let mut current = start;
        // Depth of the last node in `path`.
        let base = loop {
            if let Some(mark) = marks[current] {
                break match mark {
                    Mark::Depth(d) => d + 1,
                    Mark::Cyclic => 0,
                };
            }
            if let Some(pos) = path.iter().position(|&p| p == current) {
                for &p in &path[pos..] {
                    marks[p] = Some(Mark::Cyclic);
                }
                path.truncate(pos);
                break 0;
            }
            path.push(current);
            match parent_of(current) {
                Some(parent) => current = parent,
                None => break 0,
            }
        };
        for (offset, &node) in path.iter().rev().enumerate() {
            marks[node] = Some(Mark::Depth(base + offset));
        }
    }

    let mut plan = HierarchyPlan::default();
    for (i, team) in teams.iter().enumerate() {
        match marks[i] {
            Some(Mark::Depth(depth)) => {
                let parent = match team.parent_id {
                    None => ParentLink::Root,
                    Some(id) => match index_by_id.get(&id) {
                        Some(&p) => ParentLink::Source(teams[p].name.clone()),
                        None => ParentLink::Missing(id),
                    },
                };
                plan.ordered.push(PlannedTeam {
                    team: team.clone(),
                    depth,
                    parent,
                });
            }
            _ => plan.cyclic.push(team.clone()),
        }
    }
    plan.ordered.sort_by_key(|p| p.depth);
    plan
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamOrigin {
    /// Found by name in the target before this run touched it.
    Existing,
    /// Created by this run.
    Created,
}

/// A source team and the target team it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedTeam {
    pub source: Team,
    pub target: Team,
    pub origin: TeamOrigin,
}

pub struct TeamReconciler<'a> {
    source_org: &'a str,
    target: &'a dyn OrgApi,
    consistency: ConsistencyPolicy,
}

impl<'a> TeamReconciler<'a> {
    pub fn new(source_org: &'a str, target: &'a dyn OrgApi, consistency: ConsistencyPolicy) -> Self {
        TeamReconciler {
            source_org,
            target,
            consistency,
        }
    }

    ///
    /// Match every source team to a target team, creating missing ones.
    ///
    /// Returns the matched teams in processing order. Only failing to read
    /// the target's team list is an error; a team that cannot be created is
    /// recorded in the report and its children are created without a parent.
    ///
    pub async fn reconcile(&self, source_teams: &[Team], report: &mut MigrationReport) -> AppResult<Vec<MatchedTeam>> {
        let plan = plan_hierarchy(source_teams);
        for team in &plan.cyclic {
            warn!(
                "Team {} is part of a parent cycle in {}; excluding it from the migration",
                team.name, self.source_org
            );
            report.record_discrepancy(
                DiscrepancyKind::CyclicHierarchy,
                &team.name,
                "team is on a parent cycle and was not migrated",
            );
        }

        let mut target_by_name = index_by_name(self.target.list_teams().await?);
        let mut matched: Vec<MatchedTeam> = Vec::new();
        let mut matched_index: HashMap<String, usize> = HashMap::new();
        let mut pending: Vec<String> = Vec::new();
        let mut current_depth = 0;

        for planned in &plan.ordered {
            if planned.depth != current_depth {
                current_depth = planned.depth;
                if !pending.is_empty() {
                    self.await_visible(&pending, &mut target_by_name).await;
                    pending.clear();
                }
            }

            let name = &planned.team.name;
            let key = correlation_key(name);
            let parent_target = match &planned.parent {
                ParentLink::Source(parent) => matched_index
                    .get(&correlation_key(parent))
                    .map(|&i| &matched[i].target),
                _ => None,
            };

            if let Some(existing) = target_by_name.get(&key) {
                info!("Team {} already exists in {} as {}", name, self.target.org(), existing.slug);
                check_existing_parent(planned, existing, parent_target, report);
                report.teams_skipped.push(SkippedTeam {
                    team: name.clone(),
                    target_slug: existing.slug.clone(),
                });
                matched_index.insert(key, matched.len());
                matched.push(MatchedTeam {
                    source: planned.team.clone(),
                    target: existing.clone(),
                    origin: TeamOrigin::Existing,
                });
                continue;
            }

            let parent_team_id = match &planned.parent {
                ParentLink::Root => None,
                ParentLink::Missing(id) => {
                    warn!("Parent id {} of team {} is not a team of {}", id, name, self.source_org);
                    report.record_discrepancy(
                        DiscrepancyKind::ParentMissingInSource,
                        name,
                        format!("parent id {} not found; created without parent", id),
                    );
                    None
                }
                ParentLink::Source(parent) => match parent_target {
                    Some(parent_target) => Some(parent_target.id),
                    None => {
                        warn!(
                            "Parent {} of team {} was not migrated; creating {} without a parent",
                            parent, name, name
                        );
                        report.record_discrepancy(
                            DiscrepancyKind::ParentNotMatched,
                            name,
                            format!("parent {} not matched; created without parent", parent),
                        );
                        None
                    }
                },
            };

            let new_team = self.new_team(planned, parent_team_id, report);
            let outcome = match self.target.create_team(&new_team).await {
                Ok(created) => Ok((created, TeamOrigin::Created)),
                Err(e) => match self.find_listed(&key).await {
                    // The POST may have gone through before the error; its
                    // state is unknown, so it is treated as pre-existing.
                    Some(listed) => {
                        warn!(
                            "Creating team {} reported an error ({}) but it is listed in {}; using it",
                            name,
                            e,
                            self.target.org()
                        );
                        Ok((listed, TeamOrigin::Existing))
                    }
                    None => Err(e),
                },
            };
            match outcome {
                Ok((created, origin)) => {
                    info!("Created team {} ({}) in {}", created.name, created.slug, self.target.org());
                    report.teams_created.push(CreatedTeam {
                        team: name.clone(),
                        target_slug: created.slug.clone(),
                        parent: parent_target.map(|p| p.name.clone()),
                    });
                    if origin == TeamOrigin::Created {
                        pending.push(key.clone());
                    }
                    target_by_name.insert(key.clone(), created.clone());
                    matched_index.insert(key, matched.len());
                    matched.push(MatchedTeam {
                        source: planned.team.clone(),
                        target: created,
                        origin,
                    });
                }
                Err(e) => {
                    error!("Failed to create team {} in {}: {}", name, self.target.org(), e);
                    report.record_failure(FailureKind::CreateTeam, name.clone(), e);
                }
            }
        }
        Ok(matched)
    }

    fn new_team(&self, planned: &PlannedTeam, parent_team_id: Option<u64>, report: &mut MigrationReport) -> NewTeam {
        let source = &planned.team;
        let description = if source.description.trim().is_empty() {
            format!("Migrated from {}/{}", self.source_org, source.name)
        } else {
            source.description.clone()
        };
        let mut privacy = source.privacy;
        if parent_team_id.is_some() && privacy == Privacy::Secret {
            debug!("Nested team {} cannot be secret; creating it visible to the org", source.name);
            report.record_discrepancy(
                DiscrepancyKind::PrivacyAdjusted,
                &source.name,
                "secret team nested under a parent is created visible to the org",
            );
            privacy = Privacy::VisibleToOrg;
        }
        NewTeam {
            name: source.name.clone(),
            description,
            privacy,
            parent_team_id,
        }
    }

    /// Look a team up by name in a fresh listing of the target.
    async fn find_listed(&self, key: &str) -> Option<Team> {
        match self.target.list_teams().await {
            Ok(teams) => index_by_name(teams).remove(key),
            Err(e) => {
                warn!("Re-listing teams of {} failed: {}", self.target.org(), e);
                None
            }
        }
    }

    /// Re-list target teams until every just-created team shows up or the
    /// consistency budget runs out. Teams still missing afterwards are kept
    /// from their creation responses.
    async fn await_visible(&self, created: &[String], target_by_name: &mut HashMap<String, Team>) {
        for attempt in 1..=self.consistency.attempts {
            self.consistency.pause().await;
            match self.target.list_teams().await {
                Ok(teams) => {
                    let listed = index_by_name(teams);
                    let missing = created.iter().filter(|k| !listed.contains_key(*k)).count();
                    for (key, team) in listed {
                        target_by_name.insert(key, team);
                    }
                    if missing == 0 {
                        debug!("All {} created team(s) visible after {} listing(s)", created.len(), attempt);
                        return;
                    }
                    debug!("{} created team(s) not listed yet (attempt {})", missing, attempt);
                }
                Err(e) => warn!("Re-listing teams of {} failed: {}", self.target.org(), e),
            }
        }
        warn!(
            "Created teams in {} are not all listed yet; continuing with the ids returned on creation",
            self.target.org()
        );
    }
}

fn index_by_name(teams: Vec<Team>) -> HashMap<String, Team> {
    teams.into_iter().map(|t| (correlation_key(&t.name), t)).collect()
}

/// Name is the only correlation key; an existing team with a different
/// parent is still used, but the operator is told.
fn check_existing_parent(
    planned: &PlannedTeam,
    existing: &Team,
    parent_target: Option<&Team>,
    report: &mut MigrationReport,
) {
    let expected = match &planned.parent {
        ParentLink::Root => None,
        ParentLink::Source(_) => match parent_target {
            Some(parent) => Some(parent.id),
            None => return,
        },
        ParentLink::Missing(_) => return,
    };
    if existing.parent_id != expected {
        warn!(
            "Team {} matched by name to an existing target team with a different parent",
            planned.team.name
        );
        report.record_discrepancy(
            DiscrepancyKind::HierarchyMismatch,
            &planned.team.name,
            format!(
                "target parent id {:?} differs from expected {:?}",
                existing.parent_id, expected
            ),
        );
    }
}
