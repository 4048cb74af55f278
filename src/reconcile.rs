//! The no-overlap rule for dateframeable siblings.
//!
//! Records attached to one owner and sharing a logical key may not have
//! overlapping validity windows. A candidate overlapping such siblings is
//! merged with them, transitively: `[2010-2015]` and `[2016-2020]` both absorb
//! a `[2014-2017]` candidate into one `[2010-2020]` record.
//!
//! The functions here are pure. Callers re-run them inside whatever locking
//! scope guards the siblings, see [`crate::construct::Database`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::construct::{Dateframeable, HasValidityInterval, KeyHasher, Kept, RecordId};
use crate::error::{PopoloError, Result};
use crate::interval::PartialDateInterval;
use crate::records::{Classification, Identifier};

/// What to do when a candidate overlaps a sibling with the same key.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum OverlapPolicy {
    /// Coalesce the overlapping records into one spanning their union.
    #[default]
    Merge,
    /// Keep the candidate as a separate record regardless.
    Allow,
    /// Refuse the candidate.
    Reject,
}
impl FromStr for OverlapPolicy {
    type Err = PopoloError;
    fn from_str(s: &str) -> Result<OverlapPolicy> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(OverlapPolicy::Merge),
            "allow" => Ok(OverlapPolicy::Allow),
            "reject" => Ok(OverlapPolicy::Reject),
            other => Err(PopoloError::Config(format!(
                "unknown overlap policy '{}', expected merge, allow or reject",
                other
            ))),
        }
    }
}
impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OverlapPolicy::Merge => write!(f, "merge"),
            OverlapPolicy::Allow => write!(f, "allow"),
            OverlapPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Outcome of adding one candidate to a set of siblings.
#[derive(Debug)]
pub enum Reconciliation<R> {
    /// Store the record as a new sibling.
    Accepted { record: R },
    /// Replace sibling `into` with `record` and drop the `superseded` ones.
    Merged {
        into: RecordId,
        record: R,
        superseded: Vec<RecordId>,
    },
    Rejected { error: PopoloError },
}

impl<R> Reconciliation<R> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Reconciliation::Accepted { .. })
    }
    pub fn is_merged(&self) -> bool {
        matches!(self, Reconciliation::Merged { .. })
    }
    pub fn is_rejected(&self) -> bool {
        matches!(self, Reconciliation::Rejected { .. })
    }
    pub fn record(&self) -> Option<&R> {
        match self {
            Reconciliation::Accepted { record } | Reconciliation::Merged { record, .. } => Some(record),
            Reconciliation::Rejected { .. } => None,
        }
    }
    pub fn error(&self) -> Option<&PopoloError> {
        match self {
            Reconciliation::Rejected { error } => Some(error),
            _ => None,
        }
    }
}

/// Reconciles `candidate` against the `existing` siblings of one owner.
///
/// Only siblings whose logical key equals the candidate's are considered.
/// A candidate without a key is rejected, which affects that candidate alone.
/// A sibling with an identical window, and no other sibling overlapping the
/// candidate, is reported as the merge target even under
/// [`OverlapPolicy::Reject`], so adding the same fact twice is a no-op.
pub fn add_record<R: Dateframeable>(
    existing: &[Kept<R>],
    mut candidate: R,
    policy: OverlapPolicy,
) -> Reconciliation<R> {
    let key = match candidate.logical_key() {
        Ok(key) => key,
        Err(error) => return Reconciliation::Rejected { error },
    };
    if policy == OverlapPolicy::Allow {
        return Reconciliation::Accepted { record: candidate };
    }
    let mut remaining: Vec<&Kept<R>> = existing
        .iter()
        .filter(|kept| kept.record().logical_key().ok().as_ref() == Some(&key))
        .collect();

    if policy == OverlapPolicy::Reject {
        let same = remaining.iter().find(|kept| kept.validity() == candidate.validity()).map(|kept| kept.id());
        let clash = remaining
            .iter()
            .find(|kept| Some(kept.id()) != same && kept.validity().overlaps(candidate.validity()));
        if let (Some(into), None) = (same, clash) {
            return Reconciliation::Merged { into, record: candidate, superseded: Vec::new() };
        }
        if let Some(clash) = clash {
            return Reconciliation::Rejected {
                error: PopoloError::OverlappingInterval {
                    kind: R::KIND,
                    record: clash.id(),
                    existing: clash.validity().to_string(),
                    candidate: candidate.validity().to_string(),
                },
            };
        }
        return Reconciliation::Accepted { record: candidate };
    }

    // absorb overlapping siblings until the union stops growing
    let mut span: PartialDateInterval = *candidate.validity();
    let mut absorbed: Vec<RecordId> = Vec::new();
    loop {
        let (hits, rest): (Vec<&Kept<R>>, Vec<&Kept<R>>) =
            remaining.into_iter().partition(|kept| kept.validity().overlaps(&span));
        if hits.is_empty() {
            break;
        }
        for hit in hits {
            span = span.merge(hit.validity());
            absorbed.push(hit.id());
        }
        remaining = rest;
    }
    if absorbed.is_empty() {
        return Reconciliation::Accepted { record: candidate };
    }
    absorbed.sort_unstable();
    let into = absorbed.remove(0);
    debug!(kind = R::KIND, into, superseded = absorbed.len(), span = %span, "overlapping records merged");
    candidate.set_validity(span);
    Reconciliation::Merged { into, record: candidate, superseded: absorbed }
}

/// How an identifier relates to identifiers of the same scheme holding a
/// different value.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum SchemeRule {
    /// Only identifiers with the same value are reconciled.
    #[default]
    Shared,
    /// A scheme holds one value at a time: a candidate overlapping another
    /// value of its scheme is refused.
    Exclusive,
    /// As `Exclusive`, but the overlapping values are dropped in favour of
    /// the candidate.
    Overwrite,
}
impl FromStr for SchemeRule {
    type Err = PopoloError;
    fn from_str(s: &str) -> Result<SchemeRule> {
        match s.trim().to_lowercase().as_str() {
            "shared" => Ok(SchemeRule::Shared),
            "exclusive" => Ok(SchemeRule::Exclusive),
            "overwrite" => Ok(SchemeRule::Overwrite),
            other => Err(PopoloError::Config(format!(
                "unknown scheme rule '{}', expected shared, exclusive or overwrite",
                other
            ))),
        }
    }
}

/// Identifiers of the candidate's scheme holding another value at a time
/// shared with the candidate, by ascending id. Adjacent windows do not count.
pub fn scheme_conflicts(existing: &[Kept<Identifier>], candidate: &Identifier) -> Vec<RecordId> {
    let scheme = candidate.scheme.trim();
    let value = candidate.identifier.trim();
    let mut conflicts: Vec<RecordId> = existing
        .iter()
        .filter(|kept| kept.record().scheme.trim() == scheme && kept.record().identifier.trim() != value)
        .filter(|kept| kept.validity().overlaps(candidate.validity()))
        .map(|kept| kept.id())
        .collect();
    conflicts.sort_unstable();
    conflicts
}

/// Keeps, for every classification scheme outside `multi_valued`, only the
/// candidates carrying the first value seen for that scheme. Returns the kept
/// candidates in order and the number of candidates dropped.
pub fn single_valued_schemes<F>(candidates: Vec<Classification>, multi_valued: F) -> Result<(Vec<Classification>, usize)>
where
    F: Fn(&str) -> bool,
{
    let mut first_values: HashMap<String, <Classification as Dateframeable>::Key, KeyHasher> = HashMap::default();
    let mut kept = Vec::with_capacity(candidates.len());
    let mut dropped = 0;
    for candidate in candidates {
        let key = candidate.logical_key()?;
        if multi_valued(&key.0) {
            kept.push(candidate);
            continue;
        }
        let first = first_values.entry(key.0.clone()).or_insert_with(|| key.clone());
        if *first == key {
            kept.push(candidate);
        } else {
            dropped += 1;
        }
    }
    Ok((kept, dropped))
}

/// Reconciles a full replacement set of siblings among themselves.
///
/// Every candidate must have a key, otherwise nothing is returned but the
/// error. Overlapping candidates sharing a key are merged transitively; the
/// result keeps the order in which each surviving record first appeared.
pub fn replace_all<R: Dateframeable>(candidates: Vec<R>) -> Result<Vec<R>> {
    let mut groups: HashMap<R::Key, Vec<Kept<R>>, KeyHasher> = HashMap::default();
    let mut keyed = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let key = candidate.logical_key()?;
        keyed.push((key, candidate));
    }
    for (position, (key, candidate)) in keyed.into_iter().enumerate() {
        let siblings = groups.entry(key).or_default();
        match add_record(siblings, candidate, OverlapPolicy::Merge) {
            Reconciliation::Accepted { record } => siblings.push(Kept::new(position as RecordId, record)),
            Reconciliation::Merged { into, record, superseded } => {
                siblings.retain(|kept| !superseded.contains(&kept.id()));
                if let Some(slot) = siblings.iter_mut().find(|kept| kept.id() == into) {
                    *slot = Kept::new(into, record);
                }
            }
            Reconciliation::Rejected { error } => return Err(error),
        }
    }
    let mut reconciled: Vec<Kept<R>> = groups.into_values().flatten().collect();
    reconciled.sort_unstable_by_key(|kept| kept.id());
    Ok(reconciled.into_iter().map(Kept::into_record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!("Merge".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Merge);
        assert_eq!(" allow ".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Allow);
        assert_eq!("REJECT".parse::<OverlapPolicy>().unwrap(), OverlapPolicy::Reject);
        assert!("extend".parse::<OverlapPolicy>().is_err());
        assert_eq!("Exclusive".parse::<SchemeRule>().unwrap(), SchemeRule::Exclusive);
        assert!("first".parse::<SchemeRule>().is_err());
    }
}
