use chrono::NaiveDate;
use holdall::{
    Backend, Behavior, Comparator, Criterion, Entry, HoldallError, SchemaSettings, SqlBackend,
    Store, Value,
};

fn store(behavior: Behavior) -> Store<SqlBackend> {
    let backend = SqlBackend::open_in_memory(SchemaSettings::default()).expect("sqlite");
    Store::new(backend, behavior).expect("sql store")
}

#[test]
fn saved_entries_round_trip_with_fresh_ids() {
    let mut store = store(Behavior::new());
    let moment = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(8, 30, 0))
        .unwrap();
    let a = store.save(&Entry::new("a", "one")).unwrap();
    let b = store.save(&Entry::new("b", moment).child_of(&a)).unwrap();
    let c = store.save(&Entry::new("c", vec![0xCAu8, 0xFE])).unwrap();
    assert_eq!((a.id, b.id, c.id), (1, 2, 3));

    let b = store.get(b.id).unwrap().unwrap();
    assert_eq!(b.value, Value::datetime(moment));
    assert_eq!(b.parent, Some(a.id));
    assert_eq!(store.render(&c.value).unwrap(), "cafe");
    assert_eq!(store.get(a.id).unwrap().unwrap().children, vec![b.detached()]);
}

#[test]
fn saving_twice_updates_in_place() {
    let mut store = store(Behavior::new());
    let first = store.save(&Entry::new("counter", 1)).unwrap();
    let mut changed = first.clone();
    changed.value = Value::text("many");
    let second = store.save(&changed).unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.value, Value::text("many"));
    assert_eq!(store.save(&second).unwrap(), second);
    let all = store
        .query(&Criterion::identifier(Comparator::GreaterThan, 0))
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn deletes_orphan_or_cascade() {
    let mut orphaning = store(Behavior::new());
    let root = orphaning.save(&Entry::new("root", Value::None)).unwrap();
    let child = orphaning.save(&Entry::new("child", 1).child_of(&root)).unwrap();
    orphaning.delete(&root).unwrap();
    assert_eq!(orphaning.get(child.id).unwrap().unwrap().parent, None);

    let mut cascading = store(Behavior::new().cascade_delete(true));
    let root = cascading.save(&Entry::new("root", Value::None)).unwrap();
    let child = cascading.save(&Entry::new("child", 1).child_of(&root)).unwrap();
    cascading.save(&Entry::new("grandchild", 2).child_of(&child)).unwrap();
    let deleted = cascading.delete(&root).unwrap().unwrap();
    assert_eq!(deleted.children.len(), 1);
    let left = cascading
        .query(&Criterion::identifier(Comparator::GreaterThan, 0))
        .unwrap();
    assert!(left.is_empty());
}

#[test]
fn ids_restart_after_the_maximum() {
    let mut store = store(Behavior::new());
    let a = store.save(&Entry::new("a", 1)).unwrap();
    let b = store.save(&Entry::new("b", 2)).unwrap();
    store.delete(&b).unwrap();
    let c = store.save(&Entry::new("c", 3)).unwrap();
    assert_eq!(c.id, b.id);
    assert!(a.id < c.id);
}

#[test]
fn folding_behavior_is_refused() {
    let backend = || SqlBackend::open_in_memory(SchemaSettings::default()).unwrap();
    assert!(matches!(
        Store::new(backend(), Behavior::new().ignore_case(true)),
        Err(HoldallError::Unsupported(_))
    ));
    assert!(matches!(
        Store::new(backend(), Behavior::new().ignore_diacritics(true)),
        Err(HoldallError::Unsupported(_))
    ));
    assert!(Store::new(backend(), Behavior::new().cascade_delete(true)).is_ok());
}

#[test]
fn patterns_match_exactly() {
    let mut store = store(Behavior::new());
    store.save(&Entry::new("discount", "50% off_today")).unwrap();
    store.save(&Entry::new("other", "500 offXtoday")).unwrap();
    store.save(&Entry::new("shout", "50% OFF_TODAY")).unwrap();

    let found = store
        .query(&Criterion::value(Comparator::Contains, "% off_"))
        .unwrap();
    let names: Vec<&str> = found.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["discount"]);

    let starts = store
        .query(&Criterion::value(Comparator::StartsWith, "50"))
        .unwrap();
    assert_eq!(starts.len(), 3);
    let ends = store
        .query(&Criterion::value(Comparator::EndsWith, "TODAY"))
        .unwrap();
    assert_eq!(ends.len(), 1);
}

#[test]
fn value_criteria_only_match_the_literal_kind() {
    let mut store = store(Behavior::new());
    store.save(&Entry::new("number", 5)).unwrap();
    store.save(&Entry::new("text", "5")).unwrap();
    store.save(&Entry::new("flag", true)).unwrap();
    store.save(&Entry::new("empty", Value::None)).unwrap();

    let numbers = store.query(&Criterion::value(Comparator::NotEqual, 7)).unwrap();
    assert_eq!(numbers.len(), 1);
    assert_eq!(numbers[0].name, "number");
    let flags = store.query(&Criterion::value(Comparator::Equal, true)).unwrap();
    assert_eq!(flags[0].name, "flag");
    assert!(matches!(
        store.query(&Criterion::value(Comparator::Equal, Value::None)),
        Err(HoldallError::Incomparable(_))
    ));
}

#[test]
fn entries_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("holdall.db");
    let root_id = {
        let backend = SqlBackend::open(&path, SchemaSettings::default()).unwrap();
        let mut store = Store::new(backend, Behavior::new()).unwrap();
        let root = store.save(&Entry::new("root", Value::None)).unwrap();
        store.save(&Entry::new("leaf", 2.5).child_of(&root)).unwrap();
        root.id
    };
    let backend = SqlBackend::open(&path, SchemaSettings::default()).unwrap();
    let store = Store::new(backend, Behavior::new()).unwrap();
    let root = store.get(root_id).unwrap().expect("root was persisted");
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].value, Value::number(2.5));
}

#[test]
fn custom_layouts_are_honored() {
    let schema = SchemaSettings {
        table: "STASH".into(),
        value_text: "TXT".into(),
        ..SchemaSettings::default()
    };
    let backend = SqlBackend::open_in_memory(schema).unwrap();
    let mut store = Store::new(backend, Behavior::new()).unwrap();
    store.save(&Entry::new("greeting", "hello")).unwrap();
    let text: String = store
        .backend()
        .connection()
        .query_row("SELECT TXT FROM STASH", [], |row| row.get(0))
        .unwrap();
    assert_eq!(text, "hello");
}

#[test]
fn non_finite_numbers_are_refused() {
    let mut store = store(Behavior::new());
    for number in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(matches!(
            store.save(&Entry::new("broken", number)),
            Err(HoldallError::Validation(_))
        ));
    }
    let mut backend = SqlBackend::open_in_memory(SchemaSettings::default()).unwrap();
    assert!(matches!(
        backend.insert(&mut Entry::new("broken", f64::NAN)),
        Err(HoldallError::Validation(_))
    ));
    store.save(&Entry::new("fine", 1.5)).unwrap();
    let all = store
        .query(&Criterion::identifier(Comparator::GreaterThan, 0))
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn a_failed_orphaning_changes_nothing() {
    let mut store = store(Behavior::new());
    let root = store.save(&Entry::new("root", Value::None)).unwrap();
    let fine = store.save(&Entry::new("fine", 1).child_of(&root)).unwrap();
    // a child whose alias cannot be rewritten, written past the store's checks
    store
        .backend()
        .connection()
        .execute(
            "INSERT INTO TB_GUARDA_TUDO (ID, ID_DO_PAI, NOME, TIPO, VALOR_REFERENCIA, VALOR_NUMERICO) \
             VALUES (3, ?1, 'stale', 'Reference', 99, 5)",
            [root.id as i64],
        )
        .unwrap();

    assert!(matches!(
        store.delete(&root),
        Err(HoldallError::DanglingReference(99))
    ));
    assert!(store.get(root.id).unwrap().is_some());
    assert_eq!(store.get(3).unwrap().unwrap().parent, Some(root.id));
    assert_eq!(store.get(fine.id).unwrap().unwrap().parent, Some(root.id));
    assert_eq!(store.children(root.id).unwrap().len(), 2);
}
