//! Copy team hierarchy, repository permissions and team memberships from one
//! GitHub organization to another.

pub mod api;
pub mod config;
pub mod dry_run;
pub mod error;
pub mod github;
pub mod hierarchy;
pub mod identity;
pub mod mapping;
pub mod membership;
pub mod migrator;
pub mod model;
pub mod permissions;
pub mod report;
pub mod retry;
