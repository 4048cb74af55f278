use chrono::NaiveDate;
use popolo::PopoloError;
use popolo::construct::{Database, EntityKind, OwnerRef, RecordId};
use popolo::datatype::Percentage;
use popolo::interval::PartialDateInterval;
use popolo::persist::PersistenceMode;
use popolo::reconcile::{OverlapPolicy, Reconciliation};
use popolo::records::{ContactDetail, ContactType, Identifier, Membership, OtherName, OtherNameType, Ownership};

fn span(start: &str, end: &str) -> PartialDateInterval {
    PartialDateInterval::parse(Some(start), Some(end)).expect("valid interval")
}

fn setup() -> (Database, OwnerRef) {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let person = db
        .create_entity(EntityKind::Person, "Maria Rossi", span("1950-03-12", "2020"))
        .expect("person")
        .owner_ref();
    (db, person)
}

#[test]
fn overlapping_identifiers_are_stored_once() {
    let (db, person) = setup();
    db.add_record(person, Identifier::new("TAX", "RSSMRA", span("2010", "2015"))).unwrap();
    db.add_record(person, Identifier::new("TAX", "RSSMRA", span("2016", "2020"))).unwrap();
    assert_eq!(db.records::<Identifier>(person).unwrap().len(), 2);

    let outcome = db
        .add_record(person, Identifier::new("TAX", "RSSMRA", span("2014", "2017")))
        .unwrap();
    assert!(outcome.is_merged());
    let kept = db.records::<Identifier>(person).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].validity(), &span("2010", "2020"));
    assert_eq!(outcome.record().unwrap().id(), kept[0].id());
}

#[test]
fn disjoint_and_allowed_records_stay_separate() {
    let (db, person) = setup();
    db.add_record(person, Identifier::new("TAX", "RSSMRA", span("2010", "2015"))).unwrap();
    assert!(db
        .add_record(person, Identifier::new("TAX", "RSSMRA", span("2020", "2025")))
        .unwrap()
        .is_accepted());
    assert!(db
        .add_record_with(person, Identifier::new("TAX", "RSSMRA", span("2012", "2013")), OverlapPolicy::Allow)
        .unwrap()
        .is_accepted());
    assert_eq!(db.records::<Identifier>(person).unwrap().len(), 3);
}

#[test]
fn rejecting_database_keeps_existing_records() {
    let (db, person) = setup();
    let db = db.with_overlap_policy(OverlapPolicy::Reject);
    db.add_record(person, OtherName::new("Mary", OtherNameType::Nickname, span("1970", "1980"))).unwrap();
    let outcome = db
        .add_record(person, OtherName::new("Mary", OtherNameType::Nickname, span("1975", "1990")))
        .unwrap();
    assert!(matches!(outcome.error(), Some(PopoloError::OverlappingInterval { .. })));
    let kept = db.records::<OtherName>(person).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].validity(), &span("1970", "1980"));
}

#[test]
fn records_of_other_kinds_and_owners_do_not_interfere() {
    let (db, person) = setup();
    let other = db
        .create_entity(EntityKind::Person, "Luca Bianchi", PartialDateInterval::unbounded())
        .unwrap()
        .owner_ref();
    db.add_record(person, ContactDetail::new(ContactType::Email, "maria@example.org", span("2010", "2015")))
        .unwrap();
    let outcome = db
        .add_record(other, ContactDetail::new(ContactType::Email, "maria@example.org", span("2012", "2018")))
        .unwrap();
    assert!(outcome.is_accepted());
    assert!(db.records::<Identifier>(person).unwrap().is_empty());
    assert_eq!(db.records::<ContactDetail>(person).unwrap().len(), 1);
}

#[test]
fn batch_add_skips_only_the_broken_candidate() {
    let (db, person) = setup();
    let outcomes = db
        .add_records(
            person,
            vec![
                Identifier::new("TAX", "RSSMRA", span("2010", "2015")),
                Identifier::new("", "RSSMRA", span("2010", "2015")),
                Identifier::new("TAX", "RSSMRA", span("2015-06", "2018")),
                Identifier::new("PASSPORT", "YA123", span("2019", "2029")),
            ],
        )
        .unwrap();
    assert!(outcomes[0].is_accepted());
    assert!(matches!(outcomes[1].error(), Some(PopoloError::InvalidRecord { field: "scheme", .. })));
    assert!(outcomes[2].is_merged());
    assert!(outcomes[3].is_accepted());
    let kept = db.records::<Identifier>(person).unwrap();
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].validity(), &span("2010", "2018"));
}

#[test]
fn replacing_with_nothing_removes_every_record() {
    let (db, person) = setup();
    db.add_record(person, Identifier::new("TAX", "RSSMRA", span("2010", "2015"))).unwrap();
    db.add_record(person, Identifier::new("VAT", "IT0001", span("2010", "2015"))).unwrap();
    db.add_record(person, OtherName::new("Mary", OtherNameType::Alternate, span("1970", "1980"))).unwrap();

    let kept = db.replace_all::<Identifier>(person, Vec::new()).unwrap();
    assert!(kept.is_empty());
    assert!(db.records::<Identifier>(person).unwrap().is_empty());
    // other kinds are left alone
    assert_eq!(db.records::<OtherName>(person).unwrap().len(), 1);
}

#[test]
fn replacement_is_all_or_nothing() {
    let (db, person) = setup();
    db.add_record(person, Identifier::new("TAX", "RSSMRA", span("2010", "2015"))).unwrap();
    let result = db.replace_all(
        person,
        vec![
            Identifier::new("VAT", "IT0001", span("2010", "2015")),
            Identifier::new("VAT", "", span("2016", "2017")),
        ],
    );
    assert!(matches!(result, Err(PopoloError::InvalidRecord { .. })));
    let kept = db.records::<Identifier>(person).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].record().scheme, "TAX");
}

#[test]
fn replacement_merges_and_keeps_order() {
    let (db, person) = setup();
    db.add_record(person, Identifier::new("OLD", "1", span("1990", "1991"))).unwrap();
    let kept = db
        .replace_all(
            person,
            vec![
                Identifier::new("VAT", "IT0001", span("2016", "2020")),
                Identifier::new("TAX", "RSSMRA", span("2010", "2015")),
                Identifier::new("VAT", "IT0001", span("2012", "2016-02")),
            ],
        )
        .unwrap();
    let schemes: Vec<&str> = kept.iter().map(|k| k.record().scheme.as_str()).collect();
    assert_eq!(schemes, vec!["VAT", "TAX"]);
    assert_eq!(kept[0].validity(), &span("2012", "2020"));
    assert_eq!(db.records::<Identifier>(person).unwrap(), kept);
}

#[test]
fn current_records_follow_partial_spans() {
    let (db, person) = setup();
    db.add_record(person, ContactDetail::new(ContactType::Phone, "+39 06 1234", span("2010", "2015"))).unwrap();
    db.add_record(person, ContactDetail::new(ContactType::Phone, "+39 06 9876", span("2015-06", "2016"))).unwrap();
    let day = NaiveDate::from_ymd_opt(2015, 7, 1).unwrap();
    assert_eq!(db.current_records::<ContactDetail>(person, day).unwrap().len(), 2);
    let later = NaiveDate::from_ymd_opt(2016, 12, 31).unwrap();
    let current = db.current_records::<ContactDetail>(person, later).unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].record().value, "+39 06 9876");
}

#[test]
fn memberships_need_an_organization() {
    let (db, person) = setup();
    let org = db
        .create_entity(EntityKind::Organization, "Camera dei Deputati", PartialDateInterval::unbounded())
        .unwrap();
    db.add_record(person, Membership::new(org.id(), span("2008", "2013"))).unwrap();
    let merged = db.add_record(person, Membership::new(org.id(), span("2013", "2018"))).unwrap();
    assert!(merged.is_merged());

    let mut orphan = Membership::new(org.id(), span("2019", "2020"));
    orphan.organization = None;
    let outcome = db.add_record(person, orphan).unwrap();
    assert!(matches!(outcome.error(), Some(PopoloError::InvalidRecord { field: "organization", .. })));
}

#[test]
fn memberships_can_own_contact_details() {
    let (db, person) = setup();
    let org = db
        .create_entity(EntityKind::Organization, "Senato", PartialDateInterval::unbounded())
        .unwrap();
    let membership = db.add_record(person, Membership::new(org.id(), span("2008", "2013"))).unwrap();
    let membership = OwnerRef::new(EntityKind::Membership, membership.record().unwrap().id());
    let outcome = db
        .add_record(membership, ContactDetail::new(ContactType::Email, "m.rossi@senato.it", span("2008", "2013")))
        .unwrap();
    assert!(outcome.is_accepted());
}

#[test]
fn stakes_in_one_organization_are_reconciled_whatever_the_share() {
    let (db, person) = setup();
    let org = db
        .create_entity(EntityKind::Organization, "Rossi S.p.A.", PartialDateInterval::unbounded())
        .unwrap();
    let other = db
        .create_entity(EntityKind::Organization, "Bianchi S.r.l.", PartialDateInterval::unbounded())
        .unwrap();
    let half: Percentage = "50".parse().unwrap();
    let quarter: Percentage = "25.00".parse().unwrap();
    db.add_record(person, Ownership::new(org.id(), half.clone(), span("2000", "2010"))).unwrap();
    let outcome = db
        .add_record(person, Ownership::new(org.id(), quarter.clone(), span("2005", "2012")))
        .unwrap();
    assert!(outcome.is_merged());
    let kept = db.records::<Ownership>(person).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].validity(), &span("2000", "2012"));
    assert_eq!(kept[0].record().percentage, quarter);

    // a later, separate stake in the same organization stays apart
    assert!(db
        .add_record(person, Ownership::new(org.id(), half.clone(), span("2015", "2020")))
        .unwrap()
        .is_accepted());
    assert!(db
        .add_record(person, Ownership::new(other.id(), half, span("2005", "2012")))
        .unwrap()
        .is_accepted());
    assert_eq!(db.records::<Ownership>(person).unwrap().len(), 3);

    assert!(matches!("120".parse::<Percentage>(), Err(PopoloError::InvalidPercentage(_))));
    assert!(matches!("-1".parse::<Percentage>(), Err(PopoloError::InvalidPercentage(_))));
}

fn membership_with_attachments(db: &Database, person: OwnerRef, org: RecordId, validity: PartialDateInterval) -> OwnerRef {
    let membership = db.add_record(person, Membership::new(org, validity)).unwrap();
    let membership = OwnerRef::new(EntityKind::Membership, membership.record().unwrap().id());
    db.add_record(membership, ContactDetail::new(ContactType::Email, "m.rossi@camera.it", validity))
        .unwrap();
    db.add_link(membership, "https://example.org/camera/rossi", "").unwrap();
    membership
}

fn count(db: &Database, sql: &str) -> i64 {
    db.persistor.lock().unwrap().connection().query_row(sql, [], |r| r.get(0)).unwrap()
}

#[test]
fn replacing_an_unchanged_membership_keeps_what_it_owns() {
    let (db, person) = setup();
    let org = db
        .create_entity(EntityKind::Organization, "Camera dei Deputati", PartialDateInterval::unbounded())
        .unwrap();
    let membership = membership_with_attachments(&db, person, org.id(), span("2008", "2013"));

    let mut relabelled = Membership::new(org.id(), span("2008", "2013"));
    relabelled.label = Some("Deputy".to_string());
    let kept = db.replace_all(person, vec![relabelled]).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id(), membership.id);
    assert_eq!(kept[0].record().label.as_deref(), Some("Deputy"));
    assert_eq!(db.records::<ContactDetail>(membership).unwrap().len(), 1);
    assert_eq!(db.links(membership).unwrap().len(), 1);
}

#[test]
fn dropping_a_membership_drops_what_it_owns() {
    let (db, person) = setup();
    let org = db
        .create_entity(EntityKind::Organization, "Camera dei Deputati", PartialDateInterval::unbounded())
        .unwrap();
    let membership = membership_with_attachments(&db, person, org.id(), span("2008", "2013"));
    let phone = db
        .add_record(membership, ContactDetail::new(ContactType::Phone, "+39 06 6760", span("2008", "2013")))
        .unwrap();
    let phone = OwnerRef::new(EntityKind::ContactDetail, phone.record().unwrap().id());
    db.add_source(phone, "https://example.org/camera/phones", "").unwrap();

    assert!(db.replace_all::<Membership>(person, Vec::new()).unwrap().is_empty());
    assert_eq!(count(&db, "select count(*) from Record"), 0);
    assert_eq!(count(&db, "select count(*) from ReferenceRel"), 0);
    assert!(matches!(db.links(membership), Ok(links) if links.is_empty()));
}

#[test]
fn merged_memberships_hand_over_what_they_own() {
    let (db, person) = setup();
    let org = db
        .create_entity(EntityKind::Organization, "Senato", PartialDateInterval::unbounded())
        .unwrap();
    let early = membership_with_attachments(&db, person, org.id(), span("2008", "2010"));
    let late = membership_with_attachments(&db, person, org.id(), span("2012", "2014"));
    db.add_link(late, "https://example.org/senato/2012", "").unwrap();

    let outcome = db.add_record(person, Membership::new(org.id(), span("2009", "2013"))).unwrap();
    match outcome {
        Reconciliation::Merged { into, superseded, .. } => {
            assert_eq!(into, early.id);
            assert_eq!(superseded, vec![late.id]);
        }
        other => panic!("expected a merge, got {:?}", other),
    }
    // both emails moved over, the shared link is related once
    assert_eq!(db.records::<ContactDetail>(early).unwrap().len(), 2);
    assert_eq!(db.links(early).unwrap().len(), 2);
    assert!(db.records::<ContactDetail>(late).unwrap().is_empty());
    let left = format!(
        "select count(*) from ReferenceRel where Owner_Kind = 'membership' and Owner_Identity = {}",
        late.id
    );
    assert_eq!(count(&db, &left), 0);
}

#[test]
fn unknown_owners_are_reported() {
    let (db, _) = setup();
    let ghost = OwnerRef::new(EntityKind::Organization, 4242);
    let result = db.add_record(ghost, Identifier::new("TAX", "X", span("2010", "2011")));
    assert!(matches!(result, Err(PopoloError::NotFound(_))));
    assert!(matches!(db.entity(ghost), Err(PopoloError::NotFound(_))));
    let not_a_membership = OwnerRef::new(EntityKind::Membership, 1);
    assert!(matches!(
        db.add_record(not_a_membership, Identifier::new("TAX", "X", span("2010", "2011"))),
        Err(PopoloError::NotFound(_))
    ));
}

#[test]
fn entities_keep_their_life_span() {
    let (db, person) = setup();
    let entity = db.entity(person).unwrap();
    assert_eq!(entity.name(), "Maria Rossi");
    assert_eq!(entity.validity(), &span("1950-03-12", "2020"));
    assert!(db
        .create_entity(EntityKind::Membership, "not an entity", PartialDateInterval::unbounded())
        .is_err());
}
