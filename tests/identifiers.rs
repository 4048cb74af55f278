use popolo::PopoloError;
use popolo::construct::{Database, EntityKind, OwnerRef};
use popolo::interval::PartialDateInterval;
use popolo::persist::PersistenceMode;
use popolo::reconcile::SchemeRule;
use popolo::records::Identifier;

fn span(start: &str, end: &str) -> PartialDateInterval {
    PartialDateInterval::parse(Some(start), Some(end)).expect("valid interval")
}

fn setup() -> (Database, OwnerRef) {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let org = db
        .create_entity(EntityKind::Organization, "Acme S.r.l.", PartialDateInterval::unbounded())
        .expect("organization")
        .owner_ref();
    db.add_record(org, Identifier::new("VAT", "IT0001", span("2001", "2010"))).unwrap();
    (db, org)
}

#[test]
fn shared_schemes_hold_several_values() {
    let (db, org) = setup();
    let outcome = db
        .add_identifier(org, Identifier::new("VAT", "IT0002", span("2005", "2015")), SchemeRule::Shared)
        .unwrap();
    assert!(outcome.is_accepted());
    assert_eq!(db.records::<Identifier>(org).unwrap().len(), 2);
}

#[test]
fn exclusive_schemes_refuse_a_second_value_at_the_same_time() {
    let (db, org) = setup();
    let outcome = db
        .add_identifier(org, Identifier::new("VAT", "IT0002", span("2005", "2015")), SchemeRule::Exclusive)
        .unwrap();
    assert!(matches!(
        outcome.error(),
        Some(PopoloError::OverlappingInterval { kind: "identifier", .. })
    ));
    // a later value, another scheme and the same value all pass
    for (scheme, value, start, end) in [
        ("VAT", "IT0002", "2011", "2015"),
        ("TAX", "ACME01", "2005", "2015"),
        ("VAT", "IT0001", "2009", "2010-06"),
    ] {
        let outcome = db
            .add_identifier(org, Identifier::new(scheme, value, span(start, end)), SchemeRule::Exclusive)
            .unwrap();
        assert!(!outcome.is_rejected(), "{} {}", scheme, value);
    }
    let kept = db.records::<Identifier>(org).unwrap();
    assert_eq!(kept.len(), 3);
    assert_eq!(kept[0].validity(), &span("2001", "2010"));
}

#[test]
fn overwriting_replaces_the_overlapping_values() {
    let (db, org) = setup();
    db.add_record(org, Identifier::new("VAT", "IT0003", span("2012", "2014"))).unwrap();
    let outcome = db
        .add_identifier(org, Identifier::new("VAT", "IT0002", span("2005", "2013")), SchemeRule::Overwrite)
        .unwrap();
    assert!(outcome.is_accepted());
    let kept = db.records::<Identifier>(org).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].record().identifier, "IT0002");
    assert_eq!(kept[0].validity(), &span("2005", "2013"));
}

#[test]
fn keyless_identifiers_are_rejected_alone() {
    let (db, org) = setup();
    let outcome = db
        .add_identifier(org, Identifier::new("VAT", " ", span("2005", "2015")), SchemeRule::Exclusive)
        .unwrap();
    assert!(matches!(outcome.error(), Some(PopoloError::InvalidRecord { field: "identifier", .. })));
    assert_eq!(db.records::<Identifier>(org).unwrap().len(), 1);
}
