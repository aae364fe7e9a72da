/*!
    Organization entities and the GitHub response shapes they are read from.

    GitHub omits or nulls many fields depending on token scopes and API
    version (permission flags, `role_name`, `parent`, `privacy`, team
    member roles). The raw `*Response` structs keep those fields optional;
    the conversions into the domain types below are the only place the
    defaulting rules live.
*/

use serde::Deserialize;
use std::fmt;

/// Team visibility. GitHub calls the org-visible level `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privacy {
    Secret,
    VisibleToOrg,
}

impl Privacy {
    /// Unknown or blank values fall back to the more restrictive level.
    pub fn from_api(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("closed") | Some("visible") | Some("visible-to-org") => Privacy::VisibleToOrg,
            _ => Privacy::Secret,
        }
    }

    pub fn as_api_str(&self) -> &'static str {
        match self {
            Privacy::Secret => "secret",
            Privacy::VisibleToOrg => "closed",
        }
    }
}

/// Repository permission granted to a team, ordered from least to most
/// privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    Read,
    Triage,
    Write,
    Maintain,
    Admin,
}

impl Permission {
    /// Parses both the role names (`read`, `write`) and the legacy
    /// permission names (`pull`, `push`).
    pub fn from_role_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "read" | "pull" => Some(Permission::Read),
            "triage" => Some(Permission::Triage),
            "write" | "push" => Some(Permission::Write),
            "maintain" => Some(Permission::Maintain),
            "admin" => Some(Permission::Admin),
            _ => None,
        }
    }

    /// Picks the most specific permission a binding exposes: the highest
    /// fine-grained flag set, then the summary role, then `Read`.
    pub fn resolve(flags: Option<&PermissionFlags>, role_name: Option<&str>) -> Self {
        flags
            .and_then(PermissionFlags::highest)
            .or_else(|| role_name.and_then(Permission::from_role_name))
            .unwrap_or(Permission::Read)
    }

    /// Value accepted by the team repository permission endpoint.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Permission::Read => "pull",
            Permission::Triage => "triage",
            Permission::Write => "push",
            Permission::Maintain => "maintain",
            Permission::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::Read => "read",
            Permission::Triage => "triage",
            Permission::Write => "write",
            Permission::Maintain => "maintain",
            Permission::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Fine-grained permission flags as returned on team repository listings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PermissionFlags {
    #[serde(default)]
    pub admin: Option<bool>,
    #[serde(default)]
    pub maintain: Option<bool>,
    #[serde(default)]
    pub push: Option<bool>,
    #[serde(default)]
    pub triage: Option<bool>,
    #[serde(default)]
    pub pull: Option<bool>,
}

impl PermissionFlags {
    pub fn highest(&self) -> Option<Permission> {
        [
            (self.admin, Permission::Admin),
            (self.maintain, Permission::Maintain),
            (self.push, Permission::Write),
            (self.triage, Permission::Triage),
            (self.pull, Permission::Read),
        ]
        .into_iter()
        .find(|(flag, _)| *flag == Some(true))
        .map(|(_, permission)| permission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TeamRole {
    Member,
    Maintainer,
}

impl TeamRole {
    /// Absent, null or unrecognised roles are plain members.
    pub fn from_api(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("maintainer") => TeamRole::Maintainer,
            _ => TeamRole::Member,
        }
    }

    pub fn as_api_str(&self) -> &'static str {
        match self {
            TeamRole::Member => "member",
            TeamRole::Maintainer => "maintainer",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub privacy: Privacy,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub private: bool,
}

/// A team's permission on one repository of the same organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoBinding {
    pub repo: String,
    pub permission: Permission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMember {
    pub login: String,
    pub role: TeamRole,
}

/// Organization member with the public profile email, when one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgMember {
    pub login: String,
    pub email: Option<String>,
}

/// Request body for team creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTeam {
    pub name: String,
    pub description: String,
    pub privacy: Privacy,
    pub parent_team_id: Option<u64>,
}

/// Lowercased key used to correlate names and logins across organizations.
pub fn correlation_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Slug GitHub derives from a team name. Only used to label teams that
/// were planned but not created (dry run).
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !slug.is_empty() {
            slug.push('-');
            dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[derive(Debug, Deserialize)]
pub struct ParentRef {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct TeamResponse {
    pub id: u64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub privacy: Option<String>,
    #[serde(default)]
    pub parent: Option<ParentRef>,
}

impl From<TeamResponse> for Team {
    fn from(raw: TeamResponse) -> Self {
        Team {
            id: raw.id,
            name: raw.name,
            slug: raw.slug,
            description: raw.description.unwrap_or_default(),
            privacy: Privacy::from_api(raw.privacy.as_deref()),
            parent_id: raw.parent.map(|p| p.id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RepoResponse {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub private: bool,
}

impl From<RepoResponse> for Repository {
    fn from(raw: RepoResponse) -> Self {
        Repository {
            id: raw.id,
            name: raw.name,
            private: raw.private,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TeamRepoResponse {
    pub name: String,
    #[serde(default)]
    pub permissions: Option<PermissionFlags>,
    #[serde(default)]
    pub role_name: Option<String>,
}

impl From<TeamRepoResponse> for RepoBinding {
    fn from(raw: TeamRepoResponse) -> Self {
        let permission = Permission::resolve(raw.permissions.as_ref(), raw.role_name.as_deref());
        RepoBinding {
            repo: raw.name,
            permission,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberResponse {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub login: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<UserResponse> for OrgMember {
    fn from(raw: UserResponse) -> Self {
        let email = raw.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        OrgMember {
            login: raw.login,
            email,
        }
    }
}
