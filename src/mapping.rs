//! Loading of the source login to email mapping table.

use crate::error::{AppError, AppResult};
use crate::model::correlation_key;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

const LOGIN_HINTS: &[&str] = &["source", "from"];
const LOGIN_FALLBACKS: &[&str] = &["login", "username", "user"];
const EMAIL_HINTS: &[&str] = &["email", "target", "to"];

/// Immutable table of source login to correlator email, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct IdentityMapping {
    entries: HashMap<String, String>,
}

impl IdentityMapping {
    pub fn from_pairs<I, L, E>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, E)>,
        L: AsRef<str>,
        E: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(login, email)| (correlation_key(login.as_ref()), email.as_ref().trim().to_string()))
            .collect();
        IdentityMapping { entries }
    }

    /// Load a CSV mapping file. A missing file, unreadable content or a header
    /// row without recognisable columns is a fatal configuration error.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            AppError::Mapping(format!("Cannot open mapping file {}: {}", path.display(), e))
        })?;
        let mapping = Self::from_reader(file)
            .map_err(|e| AppError::Mapping(format!("{}: {}", path.display(), e)))?;
        info!("Loaded {} identity mapping entries from {}", mapping.len(), path.display());
        Ok(mapping)
    }

    pub fn from_reader<R: Read>(reader: R) -> AppResult<Self> {
        let mut table = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let headers = table.headers()?.clone();
        let (login_col, email_col) = resolve_columns(&headers)?;
        debug!(
            "Mapping columns: login = '{}', email = '{}'",
            &headers[login_col], &headers[email_col]
        );

        let mut entries = HashMap::new();
        for (line, record) in table.records().enumerate() {
            let record = record?;
            let login = record.get(login_col).unwrap_or_default();
            if login.is_empty() {
                debug!("Skipping mapping row {} without a source login", line + 2);
                continue;
            }
            let email = record.get(email_col).unwrap_or_default();
            let key = correlation_key(login);
            if entries.contains_key(&key) {
                warn!("Duplicate mapping entry for {}; keeping the first one", login);
                continue;
            }
            entries.insert(key, email.to_string());
        }
        Ok(IdentityMapping { entries })
    }

    /// Correlator email for a source login; blank entries count as absent.
    pub fn email_for(&self, source_login: &str) -> Option<&str> {
        self.entries
            .get(&correlation_key(source_login))
            .map(String::as_str)
            .filter(|email| !email.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve_columns(headers: &csv::StringRecord) -> AppResult<(usize, usize)> {
    let normalized: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let find = |hints: &[&str], exact: bool, skip: Option<usize>| {
        hints.iter().find_map(|hint| {
            normalized.iter().enumerate().position(|(i, h)| {
                Some(i) != skip && if exact { h.as_str() == *hint } else { h.contains(*hint) }
            })
        })
    };

    let login_col = find(LOGIN_HINTS, false, None)
        .or_else(|| find(LOGIN_FALLBACKS, true, None))
        .ok_or_else(|| {
            AppError::Mapping(format!(
                "No source login column found in header {:?}",
                headers.iter().collect::<Vec<_>>()
            ))
        })?;
    let email_col = find(EMAIL_HINTS, false, Some(login_col)).ok_or_else(|| {
        AppError::Mapping(format!(
            "No email column found in header {:?}",
            headers.iter().collect::<Vec<_>>()
        ))
    })?;
    Ok((login_col, email_col))
}
