//! Popolo – people, organizations, posts and their relationships in time.
//!
//! The [Popolo](http://www.popoloproject.com/) data model attaches many small
//! facts to its entities: identifiers, other names, contact details,
//! memberships, ownerships and classifications. Each such fact is
//! *dateframeable*: it holds within a validity window whose ends are
//! possibly partial dates, such as `1994`, `2004-06` or `2004-06-19`.
//!
//! ## Modules
//! * [`datatype`] – [`datatype::PartialDate`], a date of year, month or day
//!   precision that covers the span of days it leaves unspecified.
//! * [`interval`] – [`interval::PartialDateInterval`], an open or closed validity
//!   window with overlap detection and merging.
//! * [`construct`] – owners, entities, the [`construct::Dateframeable`]
//!   capability and the [`construct::Database`] shortcut layer.
//! * [`records`] – the concrete Popolo records and their logical keys.
//! * [`reconcile`] – the rule keeping windows of same-key siblings disjoint.
//! * [`persist`] – SQLite storage of entities, records, links and sources.
//! * [`config`] – settings and tracing setup.
//!
//! ## Reconciliation
//! Two records attached to one owner and sharing a logical key (the same
//! identifier scheme and value, the same name and name type, ...) may not hold
//! at overlapping times. Adding a record that overlaps such siblings merges
//! them all into one record spanning their union, unless overlap is explicitly
//! allowed or rejected, see [`reconcile::OverlapPolicy`].
//!
//! ## Quick Start
//! ```
//! use popolo::construct::{Database, EntityKind};
//! use popolo::interval::PartialDateInterval;
//! use popolo::persist::PersistenceMode;
//! use popolo::records::Identifier;
//!
//! let db = Database::new(PersistenceMode::InMemory).unwrap();
//! let person = db
//!     .create_entity(EntityKind::Person, "Ada", PartialDateInterval::unbounded())
//!     .unwrap()
//!     .owner_ref();
//! let early = PartialDateInterval::parse(Some("2010"), Some("2015")).unwrap();
//! let late = PartialDateInterval::parse(Some("2014-06"), Some("2020")).unwrap();
//! db.add_record(person, Identifier::new("TAX", "ADA-1", early)).unwrap();
//! let outcome = db.add_record(person, Identifier::new("TAX", "ADA-1", late)).unwrap();
//! assert!(outcome.is_merged());
//! let kept = db.records::<Identifier>(person).unwrap();
//! assert_eq!(kept.len(), 1);
//! assert_eq!(kept[0].validity().to_string(), "2010 => 2020");
//! ```

pub mod config;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod interval;
pub mod persist;
pub mod reconcile;
pub mod records;

pub use error::{PopoloError, Result};
