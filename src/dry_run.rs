//! Write-suppressing wrapper used for `--dry-run`.

use crate::api::OrgApi;
use crate::error::AppResult;
use crate::model::{slugify, NewTeam, OrgMember, Permission, RepoBinding, Repository, Team, TeamMember, TeamRole};
use async_trait::async_trait;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Delegates every read to the wrapped organization and replaces every
/// write with a logged statement of intent.
///
/// Teams that would have been created are remembered and show up in later
/// `list_teams` calls, so hierarchy reconciliation behaves as it would for
/// real. Their repositories and members read back empty.
pub struct DryRunApi<'a> {
    inner: &'a dyn OrgApi,
    planned: Mutex<Vec<Team>>,
    next_id: AtomicU64,
}

impl<'a> DryRunApi<'a> {
    pub fn new(inner: &'a dyn OrgApi) -> Self {
        DryRunApi {
            inner,
            planned: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(u64::MAX),
        }
    }

    fn planned_teams(&self) -> Vec<Team> {
        self.planned.lock().map(|p| p.to_vec()).unwrap_or_default()
    }

    fn is_planned(&self, team_slug: &str) -> bool {
        self.planned_teams().iter().any(|t| t.slug == team_slug)
    }
}

#[async_trait]
impl<'a> OrgApi for DryRunApi<'a> {
    fn org(&self) -> &str {
        self.inner.org()
    }

    async fn list_teams(&self) -> AppResult<Vec<Team>> {
        let mut teams = self.inner.list_teams().await?;
        teams.extend(self.planned_teams());
        Ok(teams)
    }

    async fn create_team(&self, team: &NewTeam) -> AppResult<Team> {
        info!(
            "[Dry Run] Would create team {} in {} (privacy: {}, parent id: {:?})",
            team.name,
            self.org(),
            team.privacy.as_api_str(),
            team.parent_team_id
        );
        let planned = Team {
            id: self.next_id.fetch_sub(1, Ordering::SeqCst),
            name: team.name.clone(),
            slug: slugify(&team.name),
            description: team.description.clone(),
            privacy: team.privacy,
            parent_id: team.parent_team_id,
        };
        if let Ok(mut teams) = self.planned.lock() {
            teams.push(planned.clone());
        }
        Ok(planned)
    }

    async fn list_repos(&self) -> AppResult<Vec<Repository>> {
        self.inner.list_repos().await
    }

    async fn list_team_repos(&self, team_slug: &str) -> AppResult<Vec<RepoBinding>> {
        if self.is_planned(team_slug) {
            return Ok(Vec::new());
        }
        self.inner.list_team_repos(team_slug).await
    }

    async fn set_team_repo_permission(
        &self,
        team_slug: &str,
        repo: &str,
        permission: Permission,
    ) -> AppResult<()> {
        info!(
            "[Dry Run] Would grant team {} {} on {}/{}",
            team_slug,
            permission,
            self.org(),
            repo
        );
        Ok(())
    }

    async fn list_team_members(&self, team_slug: &str) -> AppResult<Vec<TeamMember>> {
        if self.is_planned(team_slug) {
            return Ok(Vec::new());
        }
        self.inner.list_team_members(team_slug).await
    }

    async fn list_members_with_email(&self) -> AppResult<Vec<OrgMember>> {
        self.inner.list_members_with_email().await
    }

    async fn add_team_member(&self, team_slug: &str, login: &str, role: TeamRole) -> AppResult<()> {
        info!(
            "[Dry Run] Would add {} to team {} in {} as {}",
            login,
            team_slug,
            self.org(),
            role
        );
        Ok(())
    }
}
