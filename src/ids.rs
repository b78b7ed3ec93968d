//! Record ids.
//!
//! Ids look like `bk-01hv3k...`: a level prefix and a lowercase ULID. Lookups
//! accept the full id or any unique prefix of the ULID part.

use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::Level;

const ID_DELIM: char = '-';

/// Generate a fresh id for a record at `level`.
pub fn generate(level: Level) -> String {
    format!(
        "{}{}{}",
        level.id_prefix(),
        ID_DELIM,
        Ulid::new().to_string().to_lowercase()
    )
}

/// Resolve `input` against `candidates`.
///
/// Exact matches on the full id or the suffix win; otherwise a unique suffix
/// prefix is accepted.
pub fn resolve<'a, I>(level: Level, input: &str, candidates: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} id cannot be empty",
            level.noun()
        )));
    }

    let wanted = normalize_id(trimmed);
    let wanted_suffix = suffix_from_id(&wanted).to_string();
    if wanted_suffix.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} id cannot be empty",
            level.noun()
        )));
    }

    let mut exact: Vec<String> = Vec::new();
    let mut matches: Vec<String> = Vec::new();

    for id in candidates {
        let id_norm = normalize_id(id);
        let suffix = suffix_from_id(&id_norm);
        if id_norm == wanted || suffix == wanted {
            exact.push(id.to_string());
            continue;
        }
        if suffix.starts_with(&wanted_suffix) {
            matches.push(id.to_string());
        }
    }

    if exact.len() == 1 {
        return Ok(exact.remove(0));
    }
    if exact.len() > 1 {
        return Err(ambiguous(level, trimmed, &exact));
    }

    matches.sort();
    matches.dedup();
    match matches.len() {
        0 => Err(Error::not_found(level, trimmed)),
        1 => Ok(matches.remove(0)),
        _ => Err(ambiguous(level, trimmed, &matches)),
    }
}

fn ambiguous(level: Level, input: &str, ids: &[String]) -> Error {
    Error::InvalidArgument(format!(
        "ambiguous {} id '{}': {}",
        level.noun(),
        input,
        ids.join(", ")
    ))
}

fn normalize_id(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn suffix_from_id(id_norm: &str) -> &str {
    match id_norm.find(ID_DELIM) {
        Some(idx) => &id_norm[idx + 1..],
        None => id_norm,
    }
}
