use crate::error::AppResult;
use crate::model::{NewTeam, OrgMember, Permission, RepoBinding, Repository, Team, TeamMember, TeamRole};
use async_trait::async_trait;

/// Typed operations against one organization.
///
/// An implementation is bound to a single organization and credential for
/// its whole lifetime. The reconcilers hold a read-only handle on the source
/// and a separate handle on the target, so a write can never be issued with
/// the source credential.
#[async_trait]
pub trait OrgApi: Send + Sync {
    /// Login of the organization this handle is bound to.
    fn org(&self) -> &str;

    async fn list_teams(&self) -> AppResult<Vec<Team>>;

    async fn create_team(&self, team: &NewTeam) -> AppResult<Team>;

    async fn list_repos(&self) -> AppResult<Vec<Repository>>;

    async fn list_team_repos(&self, team_slug: &str) -> AppResult<Vec<RepoBinding>>;

    async fn set_team_repo_permission(
        &self,
        team_slug: &str,
        repo: &str,
        permission: Permission,
    ) -> AppResult<()>;

    async fn list_team_members(&self, team_slug: &str) -> AppResult<Vec<TeamMember>>;

    /// All organization members with their public profile email. Costs one
    /// request per member on GitHub.
    async fn list_members_with_email(&self) -> AppResult<Vec<OrgMember>>;

    async fn add_team_member(&self, team_slug: &str, login: &str, role: TeamRole) -> AppResult<()>;
}
