//! Resolution of source organization logins to target organization logins.

use crate::api::OrgApi;
use crate::error::AppResult;
use crate::mapping::IdentityMapping;
use crate::model::{correlation_key, OrgMember};
use log::{info, warn};
use std::collections::HashMap;
use std::fmt;

/// Why a source member could not be placed in the target organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The mapping has no row for the login, or the row's email is blank.
    NoMappingEntry,
    /// No target member exposes the mapped email on their public profile.
    EmailNotFoundInTarget,
    /// More than one target member exposes the mapped email.
    AmbiguousEmail,
    /// The identity resolved but adding the membership failed.
    MembershipWriteFailed(String),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NoMappingEntry => f.write_str("NoMappingEntry"),
            UnresolvedReason::EmailNotFoundInTarget => f.write_str("EmailNotFoundInTarget"),
            UnresolvedReason::AmbiguousEmail => f.write_str("AmbiguousEmail"),
            UnresolvedReason::MembershipWriteFailed(e) => write!(f, "MembershipWriteFailed: {}", e),
        }
    }
}

/// Maps source logins to target logins through the correlator email.
///
/// The target member list is read once when the resolver is built; every
/// lookup afterwards is in memory.
#[derive(Debug)]
pub struct IdentityResolver {
    mapping: IdentityMapping,
    logins_by_email: HashMap<String, Vec<String>>,
    target_logins: HashMap<String, String>,
    allow_login_fallback: bool,
}

impl IdentityResolver {
    pub fn new(mapping: IdentityMapping, target_members: Vec<OrgMember>, allow_login_fallback: bool) -> Self {
        let mut logins_by_email: HashMap<String, Vec<String>> = HashMap::new();
        let mut target_logins = HashMap::new();
        for member in target_members {
            if let Some(email) = member.email.as_deref() {
                logins_by_email
                    .entry(correlation_key(email))
                    .or_default()
                    .push(member.login.clone());
            }
            target_logins.insert(correlation_key(&member.login), member.login);
        }
        IdentityResolver {
            mapping,
            logins_by_email,
            target_logins,
            allow_login_fallback,
        }
    }

    /// Build a resolver from the target organization's current members.
    pub async fn load(
        mapping: IdentityMapping,
        target: &dyn OrgApi,
        allow_login_fallback: bool,
    ) -> AppResult<Self> {
        let members = target.list_members_with_email().await?;
        let with_email = members.iter().filter(|m| m.email.is_some()).count();
        info!(
            "{} of {} member(s) of {} have a public email",
            with_email,
            members.len(),
            target.org()
        );
        if with_email == 0 && !members.is_empty() {
            warn!(
                "No member of {} exposes a public email; only login fallback can resolve identities",
                target.org()
            );
        }
        Ok(IdentityResolver::new(mapping, members, allow_login_fallback))
    }

    pub fn resolve(&self, source_login: &str) -> Result<String, UnresolvedReason> {
        let email = match self.mapping.email_for(source_login) {
            Some(email) => email,
            None => return self.login_fallback(source_login),
        };
        match self.logins_by_email.get(&correlation_key(email)).map(Vec::as_slice) {
            Some([login]) => Ok(login.clone()),
            Some([_, _, ..]) => {
                warn!("Email {} mapped from {} matches several target accounts", email, source_login);
                Err(UnresolvedReason::AmbiguousEmail)
            }
            _ => Err(UnresolvedReason::EmailNotFoundInTarget),
        }
    }

    fn login_fallback(&self, source_login: &str) -> Result<String, UnresolvedReason> {
        if !self.allow_login_fallback {
            return Err(UnresolvedReason::NoMappingEntry);
        }
        match self.target_logins.get(&correlation_key(source_login)) {
            Some(login) => {
                warn!(
                    "No mapping entry for {}; assuming target member {} is the same person",
                    source_login, login
                );
                Ok(login.clone())
            }
            None => Err(UnresolvedReason::NoMappingEntry),
        }
    }
}
