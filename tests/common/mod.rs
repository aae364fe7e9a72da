#![allow(dead_code)]

use async_trait::async_trait;
use gh_org_migrate::api::OrgApi;
use gh_org_migrate::error::{AppError, AppResult};
use gh_org_migrate::model::{
    slugify, NewTeam, OrgMember, Permission, Privacy, RepoBinding, Repository, Team, TeamMember, TeamRole,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Write issued against a fake organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateTeam { name: String, parent_id: Option<u64>, privacy: Privacy },
    SetPermission { team: String, repo: String, permission: Permission },
    AddMember { team: String, login: String, role: TeamRole },
}

#[derive(Default)]
struct State {
    teams: Vec<Team>,
    repos: Vec<Repository>,
    team_repos: HashMap<String, Vec<RepoBinding>>,
    team_members: HashMap<String, Vec<TeamMember>>,
    members: Vec<OrgMember>,
    writes: Vec<Write>,
    next_id: u64,
    failing_bindings: HashSet<(String, String)>,
    /// Created teams stay out of this many following `list_teams` calls.
    listing_lag: u32,
    unlisted: Vec<(u64, u32)>,
    list_teams_calls: u32,
    /// Team name to whether the failed create still went through.
    failing_creates: HashMap<String, bool>,
}

/// In-memory organization that records every write.
pub struct FakeOrg {
    name: String,
    state: Mutex<State>,
}

impl FakeOrg {
    pub fn new(name: &str) -> Self {
        FakeOrg {
            name: name.to_string(),
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with_team(self, id: u64, name: &str, parent_id: Option<u64>) -> Self {
        self.state.lock().unwrap().teams.push(Team {
            id,
            name: name.to_string(),
            slug: slugify(name),
            description: format!("{} team", name),
            privacy: Privacy::VisibleToOrg,
            parent_id,
        });
        self
    }

    pub fn with_repo(self, name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = state.repos.len() as u64 + 1;
            state.repos.push(Repository {
                id,
                name: name.to_string(),
                private: true,
            });
        }
        self
    }

    pub fn with_binding(self, team_slug: &str, repo: &str, permission: Permission) -> Self {
        self.state
            .lock()
            .unwrap()
            .team_repos
            .entry(team_slug.to_string())
            .or_default()
            .push(RepoBinding {
                repo: repo.to_string(),
                permission,
            });
        self
    }

    pub fn with_team_member(self, team_slug: &str, login: &str, role: TeamRole) -> Self {
        self.state
            .lock()
            .unwrap()
            .team_members
            .entry(team_slug.to_string())
            .or_default()
            .push(TeamMember {
                login: login.to_string(),
                role,
            });
        self
    }

    pub fn with_member(self, login: &str, email: Option<&str>) -> Self {
        self.state.lock().unwrap().members.push(OrgMember {
            login: login.to_string(),
            email: email.map(str::to_string),
        });
        self
    }

    pub fn failing_binding(self, team_slug: &str, repo: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_bindings
            .insert((team_slug.to_string(), repo.to_string()));
        self
    }

    pub fn with_listing_lag(self, calls: u32) -> Self {
        self.state.lock().unwrap().listing_lag = calls;
        self
    }

    /// The next create of `name` returns a 502. With `committed` the team is
    /// created anyway, as when the response is lost after the POST landed.
    pub fn failing_create(self, name: &str, committed: bool) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_creates
            .insert(name.to_string(), committed);
        self
    }

    pub fn list_teams_calls(&self) -> u32 {
        self.state.lock().unwrap().list_teams_calls
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn team(&self, name: &str) -> Option<Team> {
        self.state.lock().unwrap().teams.iter().find(|t| t.name == name).cloned()
    }

    pub fn bindings(&self, team_slug: &str) -> Vec<RepoBinding> {
        self.state.lock().unwrap().team_repos.get(team_slug).cloned().unwrap_or_default()
    }

    pub fn team_members(&self, team_slug: &str) -> Vec<TeamMember> {
        self.state.lock().unwrap().team_members.get(team_slug).cloned().unwrap_or_default()
    }

    fn team_exists(state: &State, slug: &str) -> AppResult<()> {
        if state.teams.iter().any(|t| t.slug == slug) {
            Ok(())
        } else {
            Err(AppError::GitHubApi {
                status: 404,
                message: format!("team {} not found", slug),
            })
        }
    }
}

#[async_trait]
impl OrgApi for FakeOrg {
    fn org(&self) -> &str {
        &self.name
    }

    async fn list_teams(&self) -> AppResult<Vec<Team>> {
        let mut state = self.state.lock().unwrap();
        state.list_teams_calls += 1;
        let hidden: Vec<u64> = state.unlisted.iter().map(|(id, _)| *id).collect();
        for (_, remaining) in state.unlisted.iter_mut() {
            *remaining -= 1;
        }
        state.unlisted.retain(|(_, remaining)| *remaining > 0);
        Ok(state.teams.iter().filter(|t| !hidden.contains(&t.id)).cloned().collect())
    }

    async fn create_team(&self, team: &NewTeam) -> AppResult<Team> {
        let mut state = self.state.lock().unwrap();
        let failure = state.failing_creates.remove(&team.name);
        if failure == Some(false) {
            return Err(AppError::GitHubApi {
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }
        state.next_id += 1;
        let created = Team {
            id: state.next_id,
            name: team.name.clone(),
            slug: slugify(&team.name),
            description: team.description.clone(),
            privacy: team.privacy,
            parent_id: team.parent_team_id,
        };
        state.writes.push(Write::CreateTeam {
            name: team.name.clone(),
            parent_id: team.parent_team_id,
            privacy: team.privacy,
        });
        state.teams.push(created.clone());
        if failure == Some(true) {
            return Err(AppError::GitHubApi {
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }
        if state.listing_lag > 0 {
            let lag = state.listing_lag;
            state.unlisted.push((created.id, lag));
        }
        Ok(created)
    }

    async fn list_repos(&self) -> AppResult<Vec<Repository>> {
        Ok(self.state.lock().unwrap().repos.clone())
    }

    async fn list_team_repos(&self, team_slug: &str) -> AppResult<Vec<RepoBinding>> {
        let state = self.state.lock().unwrap();
        FakeOrg::team_exists(&state, team_slug)?;
        Ok(state.team_repos.get(team_slug).cloned().unwrap_or_default())
    }

    async fn set_team_repo_permission(&self, team_slug: &str, repo: &str, permission: Permission) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        FakeOrg::team_exists(&state, team_slug)?;
        if state.failing_bindings.contains(&(team_slug.to_string(), repo.to_string())) {
            return Err(AppError::GitHubApi {
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }
        state.writes.push(Write::SetPermission {
            team: team_slug.to_string(),
            repo: repo.to_string(),
            permission,
        });
        let bindings = state.team_repos.entry(team_slug.to_string()).or_default();
        bindings.retain(|b| b.repo != repo);
        bindings.push(RepoBinding {
            repo: repo.to_string(),
            permission,
        });
        Ok(())
    }

    async fn list_team_members(&self, team_slug: &str) -> AppResult<Vec<TeamMember>> {
        let state = self.state.lock().unwrap();
        FakeOrg::team_exists(&state, team_slug)?;
        Ok(state.team_members.get(team_slug).cloned().unwrap_or_default())
    }

    async fn list_members_with_email(&self) -> AppResult<Vec<OrgMember>> {
        Ok(self.state.lock().unwrap().members.clone())
    }

    async fn add_team_member(&self, team_slug: &str, login: &str, role: TeamRole) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        FakeOrg::team_exists(&state, team_slug)?;
        state.writes.push(Write::AddMember {
            team: team_slug.to_string(),
            login: login.to_string(),
            role,
        });
        let members = state.team_members.entry(team_slug.to_string()).or_default();
        members.retain(|m| m.login != login);
        members.push(TeamMember {
            login: login.to_string(),
            role,
        });
        Ok(())
    }
}
