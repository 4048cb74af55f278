// used for persistence
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::construct::{Dateframeable, Entity, EntityKind, Kept, OwnerRef, RecordId};
use crate::datatype::PartialDate;
use crate::error::{PopoloError, Result};
use crate::interval::PartialDateInterval;
use crate::records::{Reference, ReferenceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}
impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PersistenceMode::InMemory => write!(f, "memory"),
            PersistenceMode::File(path) => write!(f, "file:{}", path),
        }
    }
}

// ------------- Persistence -------------
pub struct Persistor {
    db: Connection,
}
impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Persistor> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // Records of every kind share one table, keyed by their owner's tag and
        // identity, so that any entity can carry any kind of attachment.
        connection.execute_batch(
            "
            create table if not exists Entity (
                Entity_Identity integer not null,
                EntityKind text not null,
                Name text not null,
                StartDate text null,
                EndDate text null,
                constraint referenceable_Entity_Identity primary key (
                    Entity_Identity
                )
            );
            create table if not exists Record (
                Record_Identity integer not null,
                RecordKind text not null,
                Owner_Kind text not null,
                Owner_Identity integer not null,
                Payload text not null,
                StartDate text null,
                EndDate text null,
                constraint referenceable_Record_Identity primary key (
                    Record_Identity
                )
            );
            create index if not exists Record_by_Owner on Record (
                Owner_Kind,
                Owner_Identity,
                RecordKind
            );
            create table if not exists Reference (
                Reference_Identity integer not null,
                ReferenceKind text not null,
                Url text not null,
                Note text not null,
                constraint referenceable_Reference_Identity primary key (
                    Reference_Identity
                ),
                constraint unique_Reference unique (
                    ReferenceKind,
                    Url,
                    Note
                )
            );
            create table if not exists ReferenceRel (
                Owner_Kind text not null,
                Owner_Identity integer not null,
                Reference_Identity integer not null,
                constraint ReferenceRel_is_Reference foreign key (
                    Reference_Identity
                ) references Reference(Reference_Identity),
                constraint unique_ReferenceRel primary key (
                    Owner_Kind,
                    Owner_Identity,
                    Reference_Identity
                )
            );
            ",
        )?;
        Ok(Persistor { db: connection })
    }
    pub fn connection(&self) -> &Connection {
        &self.db
    }
    /// Runs `work` in an immediate transaction, committing only on success.
    ///
    /// The write lock is taken up front, so two writers cannot both read the
    /// same siblings and decide independently.
    pub fn atomically<T>(&mut self, work: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = work(&tx)?;
        tx.commit()?;
        Ok(result)
    }
    pub fn persist_entity(
        &mut self,
        kind: EntityKind,
        name: &str,
        validity: &PartialDateInterval,
    ) -> Result<RecordId> {
        self.db
            .prepare_cached(
                "
                insert into Entity (
                    EntityKind,
                    Name,
                    StartDate,
                    EndDate
                ) values (?, ?, ?, ?)
            ",
            )?
            .execute(params![kind.as_str(), name, validity.start(), validity.end()])?;
        Ok(self.db.last_insert_rowid() as RecordId)
    }
    pub fn entity(&self, owner: OwnerRef) -> Result<Entity> {
        let row = self
            .db
            .prepare_cached(
                "
                select Name, StartDate, EndDate
                    from Entity
                    where Entity_Identity = ?
                    and EntityKind = ?
            ",
            )?
            .query_row(params![owner.id, owner.kind.as_str()], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<PartialDate>>(1)?,
                    r.get::<_, Option<PartialDate>>(2)?,
                ))
            })
            .optional()?;
        let (name, start, end) = row.ok_or_else(|| PopoloError::NotFound(format!("entity {}", owner)))?;
        Ok(Entity::new(owner.id, owner.kind, name, PartialDateInterval::new(start, end)?))
    }
}

// The functions below run on a plain connection or on an open transaction.

/// Fails with `NotFound` unless the owner exists, either as an entity or,
/// for record kinds, as a record of that kind.
pub fn ensure_owner(db: &Connection, owner: OwnerRef) -> Result<()> {
    let sql = if owner.kind.is_record() {
        "select 1 from Record where Record_Identity = ? and RecordKind = ?"
    } else {
        "select 1 from Entity where Entity_Identity = ? and EntityKind = ?"
    };
    let found = db
        .prepare_cached(sql)?
        .query_row(params![owner.id, owner.kind.as_str()], |_| Ok(()))
        .optional()?;
    found.ok_or_else(|| PopoloError::NotFound(format!("owner {}", owner)))
}

pub fn kept_records<R>(db: &Connection, owner: OwnerRef, kind: &str) -> Result<Vec<Kept<R>>>
where
    R: Dateframeable + DeserializeOwned,
{
    let mut statement = db.prepare_cached(
        "
        select Record_Identity, Payload
            from Record
            where Owner_Kind = ?
            and Owner_Identity = ?
            and RecordKind = ?
            order by Record_Identity
    ",
    )?;
    let rows = statement.query_map(params![owner.kind.as_str(), owner.id, kind], |r| {
        Ok((r.get::<_, RecordId>(0)?, r.get::<_, String>(1)?))
    })?;
    let mut kept = Vec::new();
    for row in rows {
        let (id, payload) = row?;
        kept.push(Kept::new(id, serde_json::from_str::<R>(&payload)?));
    }
    Ok(kept)
}

pub fn persist_record<R>(db: &Connection, owner: OwnerRef, record: &R) -> Result<RecordId>
where
    R: Dateframeable + Serialize,
{
    let payload = serde_json::to_string(record)?;
    db.prepare_cached(
        "
        insert into Record (
            RecordKind,
            Owner_Kind,
            Owner_Identity,
            Payload,
            StartDate,
            EndDate
        ) values (?, ?, ?, ?, ?, ?)
    ",
    )?
    .execute(params![
        R::KIND,
        owner.kind.as_str(),
        owner.id,
        payload,
        record.validity().start(),
        record.validity().end()
    ])?;
    Ok(db.last_insert_rowid() as RecordId)
}

pub fn update_record<R>(db: &Connection, id: RecordId, record: &R) -> Result<()>
where
    R: Dateframeable + Serialize,
{
    let payload = serde_json::to_string(record)?;
    let changed = db
        .prepare_cached(
            "
            update Record
                set Payload = ?, StartDate = ?, EndDate = ?
                where Record_Identity = ?
                and RecordKind = ?
        ",
        )?
        .execute(params![payload, record.validity().start(), record.validity().end(), id, R::KIND])?;
    if changed == 0 {
        return Err(PopoloError::NotFound(format!("{} record {}", R::KIND, id)));
    }
    Ok(())
}

/// Deletes records of one kind together with everything they own: records
/// attached to them, recursively, and their relations to links and sources.
pub fn delete_records(db: &Connection, kind: &str, ids: &[RecordId]) -> Result<()> {
    // only some record kinds can own attachments
    let owner_kind = kind.parse::<EntityKind>().ok().filter(EntityKind::is_record);
    for &id in ids {
        if let Some(owner_kind) = owner_kind {
            let owner = OwnerRef::new(owner_kind, id);
            for (owned_kind, owned) in owned_records(db, owner)? {
                delete_records(db, &owned_kind, &[owned])?;
            }
            db.prepare_cached(
                "
                delete from ReferenceRel
                    where Owner_Kind = ?
                    and Owner_Identity = ?
            ",
            )?
            .execute(params![owner.kind.as_str(), owner.id])?;
        }
        db.prepare_cached("delete from Record where Record_Identity = ? and RecordKind = ?")?
            .execute(params![id, kind])?;
    }
    Ok(())
}

fn owned_records(db: &Connection, owner: OwnerRef) -> Result<Vec<(String, RecordId)>> {
    let mut statement = db.prepare_cached(
        "
        select RecordKind, Record_Identity
            from Record
            where Owner_Kind = ?
            and Owner_Identity = ?
    ",
    )?;
    let rows = statement.query_map(params![owner.kind.as_str(), owner.id], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, RecordId>(1)?))
    })?;
    let mut owned = Vec::new();
    for row in rows {
        owned.push(row?);
    }
    Ok(owned)
}

/// Moves everything owned by the records `from` of one kind over to record
/// `into` of that kind. Relations `into` already has are kept once.
pub fn reparent_attachments(db: &Connection, kind: &str, from: &[RecordId], into: RecordId) -> Result<()> {
    let Some(owner_kind) = kind.parse::<EntityKind>().ok().filter(EntityKind::is_record) else {
        return Ok(());
    };
    for &id in from {
        db.prepare_cached(
            "
            update Record
                set Owner_Identity = ?
                where Owner_Kind = ?
                and Owner_Identity = ?
        ",
        )?
        .execute(params![into, owner_kind.as_str(), id])?;
        db.prepare_cached(
            "
            update or ignore ReferenceRel
                set Owner_Identity = ?
                where Owner_Kind = ?
                and Owner_Identity = ?
        ",
        )?
        .execute(params![into, owner_kind.as_str(), id])?;
        // whatever was ignored duplicates a relation of `into`
        db.prepare_cached(
            "
            delete from ReferenceRel
                where Owner_Kind = ?
                and Owner_Identity = ?
        ",
        )?
        .execute(params![owner_kind.as_str(), id])?;
        debug!(kind, from = id, into, "attachments moved");
    }
    Ok(())
}

/// Returns the identity of the reference, creating it when unseen.
pub fn keep_reference(db: &Connection, kind: ReferenceKind, reference: &Reference) -> Result<RecordId> {
    db.prepare_cached(
        "
        insert or ignore into Reference (
            ReferenceKind,
            Url,
            Note
        ) values (?, ?, ?)
    ",
    )?
    .execute(params![kind.as_str(), reference.url, reference.note])?;
    let id = db
        .prepare_cached(
            "
            select Reference_Identity
                from Reference
                where ReferenceKind = ?
                and Url = ?
                and Note = ?
        ",
        )?
        .query_row(params![kind.as_str(), reference.url, reference.note], |r| r.get(0))?;
    Ok(id)
}

pub fn relate_reference(db: &Connection, owner: OwnerRef, reference: RecordId) -> Result<()> {
    db.prepare_cached(
        "
        insert or ignore into ReferenceRel (
            Owner_Kind,
            Owner_Identity,
            Reference_Identity
        ) values (?, ?, ?)
    ",
    )?
    .execute(params![owner.kind.as_str(), owner.id, reference])?;
    Ok(())
}

pub fn unrelate_references(db: &Connection, owner: OwnerRef, kind: ReferenceKind) -> Result<usize> {
    let removed = db
        .prepare_cached(
            "
            delete from ReferenceRel
                where Owner_Kind = ?
                and Owner_Identity = ?
                and Reference_Identity in (
                    select Reference_Identity from Reference where ReferenceKind = ?
                )
        ",
        )?
        .execute(params![owner.kind.as_str(), owner.id, kind.as_str()])?;
    Ok(removed)
}

pub fn references(db: &Connection, owner: OwnerRef, kind: ReferenceKind) -> Result<Vec<Kept<Reference>>> {
    let mut statement = db.prepare_cached(
        "
        select r.Reference_Identity, r.Url, r.Note
            from ReferenceRel rel
            join Reference r
            on r.Reference_Identity = rel.Reference_Identity
            where rel.Owner_Kind = ?
            and rel.Owner_Identity = ?
            and r.ReferenceKind = ?
            order by r.Reference_Identity
    ",
    )?;
    let rows = statement.query_map(params![owner.kind.as_str(), owner.id, kind.as_str()], |r| {
        Ok(Kept::new(
            r.get::<_, RecordId>(0)?,
            Reference { url: r.get(1)?, note: r.get(2)? },
        ))
    })?;
    let mut kept = Vec::new();
    for row in rows {
        kept.push(row?);
    }
    Ok(kept)
}
