use std::sync::{Arc, Mutex};

// record keys are hashed often, but never exposed, so a fast hasher will do
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::HashSet;
use std::hash::Hash;

// used to print out readable forms of a construct
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// our own stuff that we need
use crate::config::Settings;
use crate::error::{PopoloError, Result};
use crate::interval::PartialDateInterval;
use crate::persist::{self, PersistenceMode, Persistor};
use crate::reconcile::{self, OverlapPolicy, Reconciliation, SchemeRule};
use crate::records::{Classification, Identifier, Reference, ReferenceKind};

// ------------- Identities -------------
pub type RecordId = u64;

pub type KeyHasher = BuildHasherDefault<SeaHasher>;

// ------------- EntityKind -------------
/// Type tag of anything that can own attachments.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Post,
    Area,
    Event,
    Membership,
    Ownership,
    ContactDetail,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::Post => "post",
            EntityKind::Area => "area",
            EntityKind::Event => "event",
            EntityKind::Membership => "membership",
            EntityKind::Ownership => "ownership",
            EntityKind::ContactDetail => "contact_detail",
        }
    }
    // memberships, ownerships and contact details live among the records,
    // but may own attachments of their own
    pub fn is_record(&self) -> bool {
        matches!(
            self,
            EntityKind::Membership | EntityKind::Ownership | EntityKind::ContactDetail
        )
    }
}
impl FromStr for EntityKind {
    type Err = PopoloError;
    fn from_str(s: &str) -> Result<EntityKind> {
        match s {
            "person" => Ok(EntityKind::Person),
            "organization" => Ok(EntityKind::Organization),
            "post" => Ok(EntityKind::Post),
            "area" => Ok(EntityKind::Area),
            "event" => Ok(EntityKind::Event),
            "membership" => Ok(EntityKind::Membership),
            "ownership" => Ok(EntityKind::Ownership),
            "contact_detail" => Ok(EntityKind::ContactDetail),
            other => Err(PopoloError::NotFound(format!("entity kind '{}'", other))),
        }
    }
}
impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ------------- OwnerRef -------------
/// Polymorphic reference to the owner of an attached record.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: EntityKind,
    pub id: RecordId,
}
impl OwnerRef {
    pub fn new(kind: EntityKind, id: RecordId) -> Self {
        Self { kind, id }
    }
}
impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.kind, self.id)
    }
}

// ------------- Entity -------------
/// A person, organization, post, area or event.
///
/// Birth and death dates, or founding and dissolution dates, are kept as the
/// validity of the entity.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Entity {
    id: RecordId,
    kind: EntityKind,
    name: String,
    validity: PartialDateInterval,
}
impl Entity {
    pub fn new(id: RecordId, kind: EntityKind, name: String, validity: PartialDateInterval) -> Self {
        Self { id, kind, name, validity }
    }
    pub fn id(&self) -> RecordId {
        self.id
    }
    pub fn kind(&self) -> EntityKind {
        self.kind
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn validity(&self) -> &PartialDateInterval {
        &self.validity
    }
    pub fn owner_ref(&self) -> OwnerRef {
        OwnerRef::new(self.kind, self.id)
    }
}
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} '{}' [{}]", self.kind, self.id, self.name, self.validity)
    }
}

// ------------- Dateframeable -------------
pub trait HasValidityInterval {
    fn validity(&self) -> &PartialDateInterval;
    fn set_validity(&mut self, validity: PartialDateInterval);
}

/// A record with a validity window and a logical-equality key.
///
/// Two records with the same key state the same fact, so their windows may
/// not overlap among the siblings attached to one owner.
pub trait Dateframeable: HasValidityInterval + Clone {
    /// Tag stored alongside the record, also used in error messages.
    const KIND: &'static str;
    type Key: Eq + Hash + Clone + fmt::Debug;
    /// Fails with [`PopoloError::InvalidRecord`] when a key field is missing.
    fn logical_key(&self) -> Result<Self::Key>;
}

// ------------- Kept -------------
/// A record together with the identity it was persisted under.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Kept<R> {
    id: RecordId,
    record: R,
}
impl<R> Kept<R> {
    pub fn new(id: RecordId, record: R) -> Self {
        Self { id, record }
    }
    pub fn id(&self) -> RecordId {
        self.id
    }
    pub fn record(&self) -> &R {
        &self.record
    }
    pub fn into_record(self) -> R {
        self.record
    }
}
impl<R: HasValidityInterval> Kept<R> {
    pub fn validity(&self) -> &PartialDateInterval {
        self.record.validity()
    }
}

// ------------- Database -------------
// Shortcut layer: every reconciliation reads the siblings, decides and writes
// within one transaction on the persistor.
pub struct Database {
    pub persistor: Arc<Mutex<Persistor>>,
    overlap_policy: OverlapPolicy,
    multi_valued_schemes: HashSet<String, KeyHasher>,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Database> {
        let persistor = Persistor::new(&mode)?;
        info!(mode = %mode, "database opened");
        Ok(Database {
            persistor: Arc::new(Mutex::new(persistor)),
            overlap_policy: OverlapPolicy::default(),
            multi_valued_schemes: HashSet::default(),
        })
    }
    pub fn from_settings(settings: &Settings) -> Result<Database> {
        let database = Database::new(settings.persistence_mode()?)?
            .with_overlap_policy(settings.overlap_policy()?)
            .with_multi_valued_schemes(settings.classification.multi_valued_schemes.iter().cloned());
        Ok(database)
    }
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }
    /// Classification schemes for which an owner may hold several values.
    pub fn with_multi_valued_schemes<I: IntoIterator<Item = String>>(mut self, schemes: I) -> Self {
        self.multi_valued_schemes.extend(schemes);
        self
    }
    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap_policy
    }
    pub fn persistor(&self) -> Arc<Mutex<Persistor>> {
        Arc::clone(&self.persistor)
    }

    // ------------- entities -------------
    pub fn create_entity(
        &self,
        kind: EntityKind,
        name: &str,
        validity: PartialDateInterval,
    ) -> Result<Entity> {
        if kind.is_record() {
            return Err(PopoloError::InvalidRecord { kind: kind.as_str(), field: "entity kind" });
        }
        let id = self.persistor.lock()?.persist_entity(kind, name, &validity)?;
        debug!(%kind, id, entity = name, "entity created");
        Ok(Entity::new(id, kind, name.to_string(), validity))
    }
    pub fn entity(&self, owner: OwnerRef) -> Result<Entity> {
        self.persistor.lock()?.entity(owner)
    }

    // ------------- dateframeable records -------------
    pub fn add_record<R>(&self, owner: OwnerRef, candidate: R) -> Result<Reconciliation<Kept<R>>>
    where
        R: Dateframeable + Serialize + DeserializeOwned,
    {
        self.add_record_with(owner, candidate, self.overlap_policy)
    }
    pub fn add_record_with<R>(
        &self,
        owner: OwnerRef,
        candidate: R,
        policy: OverlapPolicy,
    ) -> Result<Reconciliation<Kept<R>>>
    where
        R: Dateframeable + Serialize + DeserializeOwned,
    {
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            reconcile_into(db, owner, candidate, policy)
        })
    }
    /// Adds several records, each one reconciled against the siblings left
    /// by the previous ones. A rejected candidate does not stop the others.
    pub fn add_records<R>(
        &self,
        owner: OwnerRef,
        candidates: Vec<R>,
    ) -> Result<Vec<Reconciliation<Kept<R>>>>
    where
        R: Dateframeable + Serialize + DeserializeOwned,
    {
        let policy = self.overlap_policy;
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            candidates
                .into_iter()
                .map(|candidate| reconcile_into(db, owner, candidate, policy))
                .collect()
        })
    }
    /// Replaces every record of this kind held by the owner. Nothing is
    /// written when any candidate lacks its key.
    ///
    /// A stored record with the same key and an overlapping window is
    /// updated in place, keeping its identity and whatever it owns. Stored
    /// records left unmatched are deleted along with their attachments.
    pub fn replace_all<R>(&self, owner: OwnerRef, candidates: Vec<R>) -> Result<Vec<Kept<R>>>
    where
        R: Dateframeable + Serialize + DeserializeOwned,
    {
        let reconciled = reconcile::replace_all(candidates)?;
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            replace_into(db, owner, reconciled)
        })
    }
    pub fn records<R>(&self, owner: OwnerRef) -> Result<Vec<Kept<R>>>
    where
        R: Dateframeable + DeserializeOwned,
    {
        persist::kept_records(self.persistor.lock()?.connection(), owner, R::KIND)
    }
    /// Records valid on the given day.
    pub fn current_records<R>(&self, owner: OwnerRef, day: NaiveDate) -> Result<Vec<Kept<R>>>
    where
        R: Dateframeable + DeserializeOwned,
    {
        let mut records = self.records::<R>(owner)?;
        records.retain(|kept| kept.validity().is_current_at(day));
        Ok(records)
    }

    // ------------- classifications -------------
    /// Classifies the owner, unless it already holds a classification of the
    /// same scheme. `allow_same_scheme`, or a scheme configured as multi
    /// valued, lifts that restriction. Returns `None` when nothing was added.
    pub fn add_classification(
        &self,
        owner: OwnerRef,
        classification: Classification,
        allow_same_scheme: bool,
    ) -> Result<Option<Reconciliation<Kept<Classification>>>> {
        let key = match classification.logical_key() {
            Ok(key) => key,
            Err(error) => {
                warn!(%owner, kind = Classification::KIND, %error, "record rejected");
                return Ok(Some(Reconciliation::Rejected { error }));
            }
        };
        let multi_valued = allow_same_scheme || self.is_multi_valued(&key.0);
        let policy = self.overlap_policy;
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            let existing = persist::kept_records::<Classification>(db, owner, Classification::KIND)?;
            // the very same classification is reconciled, never blocked
            let blocked = !multi_valued
                && existing.iter().any(|kept| {
                    kept.record().logical_key().is_ok_and(|other| other.0 == key.0 && other != key)
                });
            if blocked {
                debug!(%owner, scheme = %classification.scheme, "same scheme classification exists");
                return Ok(None);
            }
            reconcile_into(db, owner, classification, policy).map(Some)
        })
    }

    /// Replaces the owner's classifications. Unless `allow_same_scheme` is
    /// set or the scheme is multi valued, only the first value given for a
    /// scheme is kept and later values of that scheme are skipped.
    pub fn update_classifications(
        &self,
        owner: OwnerRef,
        classifications: Vec<Classification>,
        allow_same_scheme: bool,
    ) -> Result<Vec<Kept<Classification>>> {
        let (candidates, dropped) =
            reconcile::single_valued_schemes(classifications, |scheme| allow_same_scheme || self.is_multi_valued(scheme))?;
        if dropped > 0 {
            debug!(%owner, dropped, "same scheme classifications skipped");
        }
        self.replace_all(owner, candidates)
    }
    fn is_multi_valued(&self, scheme: &str) -> bool {
        self.multi_valued_schemes.contains(scheme)
    }

    // ------------- identifiers -------------
    /// Adds an identifier, first checking it against identifiers of the same
    /// scheme that hold another value, as `rule` says.
    pub fn add_identifier(
        &self,
        owner: OwnerRef,
        identifier: Identifier,
        rule: SchemeRule,
    ) -> Result<Reconciliation<Kept<Identifier>>> {
        if let Err(error) = identifier.logical_key() {
            warn!(%owner, kind = Identifier::KIND, %error, "record rejected");
            return Ok(Reconciliation::Rejected { error });
        }
        let policy = self.overlap_policy;
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            let existing = persist::kept_records::<Identifier>(db, owner, Identifier::KIND)?;
            let conflicts = reconcile::scheme_conflicts(&existing, &identifier);
            match (rule, conflicts.first()) {
                (SchemeRule::Shared, _) | (_, None) => {}
                (SchemeRule::Exclusive, Some(&first)) => {
                    let clash = existing.iter().find(|kept| kept.id() == first);
                    let error = PopoloError::OverlappingInterval {
                        kind: Identifier::KIND,
                        record: first,
                        existing: clash.map(|kept| kept.validity().to_string()).unwrap_or_default(),
                        candidate: identifier.validity().to_string(),
                    };
                    warn!(%owner, scheme = %identifier.scheme, %error, "identifier rejected");
                    return Ok(Reconciliation::Rejected { error });
                }
                (SchemeRule::Overwrite, Some(_)) => {
                    persist::delete_records(db, Identifier::KIND, &conflicts)?;
                    info!(%owner, scheme = %identifier.scheme, overwritten = conflicts.len(), "identifiers overwritten");
                }
            }
            reconcile_into(db, owner, identifier, policy)
        })
    }

    // ------------- links and sources -------------
    pub fn add_link(&self, owner: OwnerRef, url: &str, note: &str) -> Result<Kept<Reference>> {
        self.add_reference(owner, ReferenceKind::Link, url, note)
    }
    pub fn add_source(&self, owner: OwnerRef, url: &str, note: &str) -> Result<Kept<Reference>> {
        self.add_reference(owner, ReferenceKind::Source, url, note)
    }
    pub fn links(&self, owner: OwnerRef) -> Result<Vec<Kept<Reference>>> {
        persist::references(self.persistor.lock()?.connection(), owner, ReferenceKind::Link)
    }
    pub fn sources(&self, owner: OwnerRef) -> Result<Vec<Kept<Reference>>> {
        persist::references(self.persistor.lock()?.connection(), owner, ReferenceKind::Source)
    }
    /// Relates exactly the given links to the owner, dropping the others.
    pub fn update_links(&self, owner: OwnerRef, links: Vec<Reference>) -> Result<Vec<Kept<Reference>>> {
        self.update_references(owner, ReferenceKind::Link, links)
    }
    /// Relates exactly the given sources to the owner, dropping the others.
    pub fn update_sources(&self, owner: OwnerRef, sources: Vec<Reference>) -> Result<Vec<Kept<Reference>>> {
        self.update_references(owner, ReferenceKind::Source, sources)
    }
    fn add_reference(
        &self,
        owner: OwnerRef,
        kind: ReferenceKind,
        url: &str,
        note: &str,
    ) -> Result<Kept<Reference>> {
        let reference = Reference::new(url, note)?;
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            let id = persist::keep_reference(db, kind, &reference)?;
            persist::relate_reference(db, owner, id)?;
            Ok(Kept::new(id, reference))
        })
    }
    fn update_references(
        &self,
        owner: OwnerRef,
        kind: ReferenceKind,
        references: Vec<Reference>,
    ) -> Result<Vec<Kept<Reference>>> {
        for reference in &references {
            reference.validate()?;
        }
        self.persistor.lock()?.atomically(|db| {
            persist::ensure_owner(db, owner)?;
            persist::unrelate_references(db, owner, kind)?;
            let mut kept: Vec<Kept<Reference>> = Vec::with_capacity(references.len());
            for reference in references {
                let id = persist::keep_reference(db, kind, &reference)?;
                persist::relate_reference(db, owner, id)?;
                if !kept.iter().any(|k| k.id() == id) {
                    kept.push(Kept::new(id, reference));
                }
            }
            Ok(kept)
        })
    }
}

// Runs one candidate against the owner's persisted siblings and writes the outcome.
fn reconcile_into<R>(
    db: &rusqlite::Connection,
    owner: OwnerRef,
    candidate: R,
    policy: OverlapPolicy,
) -> Result<Reconciliation<Kept<R>>>
where
    R: Dateframeable + Serialize + DeserializeOwned,
{
    let existing = persist::kept_records::<R>(db, owner, R::KIND)?;
    match reconcile::add_record(&existing, candidate, policy) {
        Reconciliation::Accepted { record } => {
            let id = persist::persist_record(db, owner, &record)?;
            debug!(%owner, kind = R::KIND, id, "record accepted");
            Ok(Reconciliation::Accepted { record: Kept::new(id, record) })
        }
        Reconciliation::Merged { into, record, superseded } => {
            persist::update_record(db, into, &record)?;
            persist::reparent_attachments(db, R::KIND, &superseded, into)?;
            persist::delete_records(db, R::KIND, &superseded)?;
            debug!(%owner, kind = R::KIND, into, superseded = superseded.len(), "record merged");
            Ok(Reconciliation::Merged { into, record: Kept::new(into, record), superseded })
        }
        Reconciliation::Rejected { error } => {
            warn!(%owner, kind = R::KIND, %error, "record rejected");
            Ok(Reconciliation::Rejected { error })
        }
    }
}

// Writes an already reconciled replacement set, reusing the stored records it
// matches.
fn replace_into<R>(db: &rusqlite::Connection, owner: OwnerRef, reconciled: Vec<R>) -> Result<Vec<Kept<R>>>
where
    R: Dateframeable + Serialize + DeserializeOwned,
{
    let mut unmatched = persist::kept_records::<R>(db, owner, R::KIND)?;
    let mut kept = Vec::with_capacity(reconciled.len());
    let (mut updated, mut inserted) = (0, 0);
    for record in reconciled {
        let key = record.logical_key()?;
        let same_key = |stored: &Kept<R>| stored.record().logical_key().ok().as_ref() == Some(&key);
        // an identical window is the best match, any overlapping one will do
        let matched = unmatched
            .iter()
            .position(|stored| same_key(stored) && stored.validity() == record.validity())
            .or_else(|| {
                unmatched
                    .iter()
                    .position(|stored| same_key(stored) && stored.validity().overlaps(record.validity()))
            });
        match matched {
            Some(position) => {
                let id = unmatched.swap_remove(position).id();
                persist::update_record(db, id, &record)?;
                updated += 1;
                kept.push(Kept::new(id, record));
            }
            None => {
                let id = persist::persist_record(db, owner, &record)?;
                inserted += 1;
                kept.push(Kept::new(id, record));
            }
        }
    }
    let stale: Vec<RecordId> = unmatched.iter().map(Kept::id).collect();
    persist::delete_records(db, R::KIND, &stale)?;
    info!(%owner, kind = R::KIND, updated, inserted, removed = stale.len(), "records replaced");
    Ok(kept)
}
