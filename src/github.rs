/*!
    GitHub API client module.

    `GitHubClient` implements [`OrgApi`] on top of the GitHub REST API. A client
    is bound to one organization and one [`Credential`] when it is constructed
    and never changes either afterwards; migrating between two organizations
    means holding two clients.

    Reads go through `list_all`, which follows page-based pagination. Writes go
    through `write`. Every single request is retried under the client's
    [`RetryPolicy`] when it fails transiently.
*/

use crate::api::OrgApi;
use crate::error::{AppError, AppResult};
use crate::model::{
    MemberResponse, NewTeam, OrgMember, Permission, RepoBinding, RepoResponse, Repository, Team,
    TeamMember, TeamRepoResponse, TeamResponse, TeamRole, UserResponse,
};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;

pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;
const USER_AGENT: &str = "gh-org-migrate";
const API_VERSION: &str = "2022-11-28";

/// Bearer token scoped to one organization.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: &str) -> AppResult<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Config("GitHub token is empty".to_string()));
        }
        if token.contains('\n') || token.contains('\r') {
            return Err(AppError::Config(
                "Invalid characters in token for Authorization header".to_string(),
            ));
        }
        Ok(Credential(token.to_string()))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted, {} chars>)", self.0.len())
    }
}

///
/// Client for one GitHub organization.
///
/// Holds the HTTP client, the organization's credential and the retry policy
/// applied to every request it issues.
///
pub struct GitHubClient {
    /// Reqwest HTTP client for making API requests.
    client: Client,
    /// Token for the organization below. Never logged.
    credential: Credential,
    /// Name of the GitHub organization to operate on.
    org: String,
    /// API root, without trailing slash.
    api_base: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client for `org` against api.github.com.
    pub fn new(credential: Credential, org: &str, retry: RetryPolicy) -> Self {
        GitHubClient::with_api_base(credential, org, GITHUB_API_BASE_URL, retry)
    }

    /// Create a client against a custom API root (GitHub Enterprise Server
    /// or a test server).
    pub fn with_api_base(credential: Credential, org: &str, api_base: &str, retry: RetryPolicy) -> Self {
        GitHubClient {
            client: Client::new(),
            credential,
            org: org.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            retry,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// One attempt of one request. `Ok(None)` means a success status with an
    /// empty body (GitHub answers most PUTs with 204).
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> AppResult<Option<Value>> {
        debug!("{} {}", method, url);
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(reqwest::header::AUTHORIZATION, self.credential.bearer())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(body) = body {
            debug!("{} body: {}", method, body);
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    error!("{} {} failed to connect: {}", method, url, e);
                } else if e.is_timeout() {
                    error!("{} {} timed out: {}", method, url, e);
                } else {
                    error!("{} {} failed: {}", method, url, e);
                }
                return Err(AppError::from(e));
            }
        };

        let status = response.status();
        debug!("{} {} returned status: {}", method, url, status);
        let text = response.text().await?;
        if !status.is_success() {
            error!("{} {} failed with status {}: {}", method, url, status, text);
            return Err(AppError::GitHubApi {
                status: status.as_u16(),
                message: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&text).map_err(|e| {
            AppError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e))
        })?;
        Ok(Some(value))
    }

    async fn get_json(&self, path: &str) -> AppResult<Option<Value>> {
        let url = self.url(path);
        let label = format!("GET {}", url);
        self.retry.run(&label, || self.send(Method::GET, &url, None)).await
    }

    ///
    /// Read every item of a paginated collection.
    ///
    /// Pages are requested with a fixed page size until a page comes back
    /// short or empty. Each page is retried on its own, so a transient failure
    /// restarts only the page that failed.
    ///
    pub async fn list_all(&self, path: &str) -> AppResult<Vec<Value>> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let paged = format!("{}{}per_page={}&page={}", path, separator, PAGE_SIZE, page);
            let batch = match self.get_json(&paged).await? {
                Some(Value::Array(batch)) => batch,
                None => Vec::new(),
                Some(other) => {
                    return Err(AppError::InvalidResponse(format!(
                        "Expected a JSON array from {}, got: {}",
                        path, other
                    )))
                }
            };
            let count = batch.len();
            items.extend(batch);
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        debug!("{} returned {} item(s) over {} page(s)", path, items.len(), page);
        Ok(items)
    }

    ///
    /// Issue a single POST or PUT.
    ///
    /// Transient failures are retried up to the policy's ceiling; the final
    /// error is handed back to the caller, which decides whether it is fatal.
    ///
    pub async fn write(&self, method: Method, path: &str, body: Value) -> AppResult<Option<Value>> {
        let url = self.url(path);
        let label = format!("{} {}", method, url);
        self.retry
            .run(&label, || self.send(method.clone(), &url, Some(&body)))
            .await
    }

    async fn list_typed<T: DeserializeOwned>(&self, path: &str) -> AppResult<Vec<T>> {
        self.list_all(path)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(AppError::from))
            .collect()
    }

    async fn get_user(&self, login: &str) -> AppResult<OrgMember> {
        match self.get_json(&format!("/users/{}", login)).await {
            Ok(Some(value)) => Ok(serde_json::from_value::<UserResponse>(value)?.into()),
            Ok(None) => Err(AppError::InvalidResponse(format!("Empty profile for user {}", login))),
            Err(e) if e.is_not_found() => {
                warn!("Profile for {} not found; treating as having no public email", login);
                Ok(OrgMember {
                    login: login.to_string(),
                    email: None,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl OrgApi for GitHubClient {
    fn org(&self) -> &str {
        &self.org
    }

    async fn list_teams(&self) -> AppResult<Vec<Team>> {
        let teams: Vec<TeamResponse> = self.list_typed(&format!("/orgs/{}/teams", self.org)).await?;
        Ok(teams.into_iter().map(Team::from).collect())
    }

    async fn create_team(&self, team: &NewTeam) -> AppResult<Team> {
        let mut body = json!({
            "name": team.name,
            "description": team.description,
            "privacy": team.privacy.as_api_str(),
        });
        if let Some(parent_id) = team.parent_team_id {
            body["parent_team_id"] = json!(parent_id);
        }
        info!("Creating team {} in {}", team.name, self.org);
        let created = self
            .write(Method::POST, &format!("/orgs/{}/teams", self.org), body)
            .await?
            .ok_or_else(|| {
                AppError::InvalidResponse(format!("Empty response creating team {}", team.name))
            })?;
        let created: TeamResponse = serde_json::from_value(created)?;
        Ok(created.into())
    }

    async fn list_repos(&self) -> AppResult<Vec<Repository>> {
        let repos: Vec<RepoResponse> = self
            .list_typed(&format!("/orgs/{}/repos?type=all", self.org))
            .await?;
        Ok(repos.into_iter().map(Repository::from).collect())
    }

    async fn list_team_repos(&self, team_slug: &str) -> AppResult<Vec<RepoBinding>> {
        let repos: Vec<TeamRepoResponse> = self
            .list_typed(&format!("/orgs/{}/teams/{}/repos", self.org, team_slug))
            .await?;
        Ok(repos.into_iter().map(RepoBinding::from).collect())
    }

    async fn set_team_repo_permission(
        &self,
        team_slug: &str,
        repo: &str,
        permission: Permission,
    ) -> AppResult<()> {
        let path = format!(
            "/orgs/{}/teams/{}/repos/{}/{}",
            self.org, team_slug, self.org, repo
        );
        let body = json!({ "permission": permission.as_api_str() });
        info!(
            "Granting team {} {} on {}/{}",
            team_slug, permission, self.org, repo
        );
        self.write(Method::PUT, &path, body).await?;
        Ok(())
    }

    /// GitHub includes the members of child teams in this listing; it has no
    /// filter for direct members only.
    async fn list_team_members(&self, team_slug: &str) -> AppResult<Vec<TeamMember>> {
        let mut members = Vec::new();
        for role in [TeamRole::Maintainer, TeamRole::Member] {
            let path = format!(
                "/orgs/{}/teams/{}/members?role={}",
                self.org,
                team_slug,
                role.as_api_str()
            );
            let logins: Vec<MemberResponse> = self.list_typed(&path).await?;
            members.extend(logins.into_iter().map(|m| TeamMember { login: m.login, role }));
        }
        Ok(members)
    }

    async fn list_members_with_email(&self) -> AppResult<Vec<OrgMember>> {
        let logins: Vec<MemberResponse> = self
            .list_typed(&format!("/orgs/{}/members", self.org))
            .await?;
        info!(
            "Fetching public profiles for {} member(s) of {}",
            logins.len(),
            self.org
        );
        let mut members = Vec::with_capacity(logins.len());
        for member in logins {
            match self.get_user(&member.login).await {
                Ok(profile) => members.push(profile),
                Err(e) => {
                    warn!(
                        "Could not read the profile of {}: {}; treating it as having no public email",
                        member.login, e
                    );
                    members.push(OrgMember {
                        login: member.login,
                        email: None,
                    });
                }
            }
        }
        Ok(members)
    }

    async fn add_team_member(&self, team_slug: &str, login: &str, role: TeamRole) -> AppResult<()> {
        let path = format!(
            "/orgs/{}/teams/{}/memberships/{}",
            self.org, team_slug, login
        );
        info!("Adding {} to team {} as {}", login, team_slug, role);
        self.write(Method::PUT, &path, json!({ "role": role.as_api_str() }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Privacy;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard, attempts: u32) -> GitHubClient {
        let credential = Credential::new("dummy_token").expect("valid token");
        GitHubClient::with_api_base(credential, "dummy_org", &server.url(), RetryPolicy::immediate(attempts))
    }

    fn page(n: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "100".into()),
            Matcher::UrlEncoded("page".into(), n.into()),
        ])
    }

    #[test]
    fn test_credential_rejects_blank_and_multiline_tokens() {
        assert!(matches!(Credential::new("   "), Err(AppError::Config(_))));
        assert!(matches!(Credential::new("abc\ndef"), Err(AppError::Config(_))));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("ghp_secret").unwrap();
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("ghp_secret"));
        assert!(printed.contains("redacted"));
    }

    #[tokio::test]
    async fn test_list_all_follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        let full: Vec<Value> = (0..100)
            .map(|i| json!({"id": i, "name": format!("repo-{}", i), "private": true}))
            .collect();
        let first = server
            .mock("GET", "/orgs/dummy_org/repos")
            .match_query(page("1"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(Value::Array(full).to_string())
            .create_async()
            .await;
        let second = server
            .mock("GET", "/orgs/dummy_org/repos")
            .match_query(page("2"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id": 100, "name": "last", "private": false}]"#)
            .create_async()
            .await;

        let repos = client(&server, 1).list_repos().await.expect("list repos");
        assert_eq!(repos.len(), 101);
        assert_eq!(repos[100].name, "last");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_transient_read_failure_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/orgs/dummy_org/teams")
            .match_query(page("1"))
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/orgs/dummy_org/teams")
            .match_query(page("1"))
            .with_status(200)
            .with_body(r#"[{"id": 1, "name": "Core", "slug": "core", "privacy": "closed", "parent": null}]"#)
            .expect(1)
            .create_async()
            .await;

        let teams = client(&server, 3).list_teams().await.expect("list teams");
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].privacy, Privacy::VisibleToOrg);
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_gives_up_after_attempt_ceiling() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/orgs/dummy_org/teams/core/repos/dummy_org/api")
            .with_status(500)
            .with_body("boom")
            .expect(3)
            .create_async()
            .await;

        let result = client(&server, 3)
            .set_team_repo_permission("core", "api", Permission::Write)
            .await;
        assert!(matches!(result, Err(AppError::GitHubApi { status: 500, .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_write_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/orgs/dummy_org/teams/core/memberships/ghost")
            .match_body(Matcher::Json(json!({"role": "member"})))
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .expect(1)
            .create_async()
            .await;

        let result = client(&server, 3)
            .add_team_member("core", "ghost", TeamRole::Member)
            .await;
        assert!(result.unwrap_err().is_not_found());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_team_sends_parent_and_privacy() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orgs/dummy_org/teams")
            .match_header("authorization", "Bearer dummy_token")
            .match_body(Matcher::Json(json!({
                "name": "Web",
                "description": "Frontend",
                "privacy": "closed",
                "parent_team_id": 7
            })))
            .with_status(201)
            .with_body(r#"{"id": 12, "name": "Web", "slug": "web", "description": "Frontend", "privacy": "closed", "parent": {"id": 7}}"#)
            .create_async()
            .await;

        let team = client(&server, 1)
            .create_team(&NewTeam {
                name: "Web".into(),
                description: "Frontend".into(),
                privacy: Privacy::VisibleToOrg,
                parent_team_id: Some(7),
            })
            .await
            .expect("create team");
        assert_eq!(team.id, 12);
        assert_eq!(team.slug, "web");
        assert_eq!(team.parent_id, Some(7));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_team_members_carry_roles() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orgs/dummy_org/teams/core/members")
            .match_query(Matcher::UrlEncoded("role".into(), "maintainer".into()))
            .with_status(200)
            .with_body(r#"[{"login": "lead"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/orgs/dummy_org/teams/core/members")
            .match_query(Matcher::UrlEncoded("role".into(), "member".into()))
            .with_status(200)
            .with_body(r#"[{"login": "dev"}]"#)
            .create_async()
            .await;

        let members = client(&server, 1).list_team_members("core").await.expect("members");
        assert_eq!(
            members,
            vec![
                TeamMember { login: "lead".into(), role: TeamRole::Maintainer },
                TeamMember { login: "dev".into(), role: TeamRole::Member },
            ]
        );
    }

    #[tokio::test]
    async fn test_members_with_email_reads_profiles() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orgs/dummy_org/members")
            .match_query(page("1"))
            .with_status(200)
            .with_body(r#"[{"login": "alice2605"}, {"login": "gone"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/users/alice2605")
            .with_status(200)
            .with_body(r#"{"login": "alice2605", "email": "alice@x.com"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/users/gone")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let members = client(&server, 1).list_members_with_email().await.expect("members");
        assert_eq!(members[0].email.as_deref(), Some("alice@x.com"));
        assert_eq!(members[1].email, None);
    }

    #[tokio::test]
    async fn test_failed_profile_read_keeps_the_member_without_email() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orgs/dummy_org/members")
            .match_query(page("1"))
            .with_status(200)
            .with_body(r#"[{"login": "ok"}, {"login": "flaky"}, {"login": "last"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/users/ok")
            .with_status(200)
            .with_body(r#"{"login": "ok", "email": "ok@x.com"}"#)
            .create_async()
            .await;
        let flaky = server
            .mock("GET", "/users/flaky")
            .with_status(500)
            .with_body("boom")
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/users/last")
            .with_status(200)
            .with_body(r#"{"login": "last", "email": "last@x.com"}"#)
            .create_async()
            .await;

        let members = client(&server, 2).list_members_with_email().await.expect("members");
        let logins: Vec<&str> = members.iter().map(|m| m.login.as_str()).collect();
        assert_eq!(logins, vec!["ok", "flaky", "last"]);
        assert_eq!(members[1].email, None);
        assert_eq!(members[2].email.as_deref(), Some("last@x.com"));
        flaky.assert_async().await;
    }
}
