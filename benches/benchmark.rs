use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use holdall::{
    Backend, Behavior, Comparator, Entry, MemoryBackend, SchemaSettings, SqlBackend, Store, Value,
};

// ------------- Fixtures -------------
// A forest of `roots` roots, each with ten numbered children and one alias
// pointing back at the first child.
fn populate<B: Backend>(store: &mut Store<B>, roots: usize) {
    for r in 0..roots {
        let root = store
            .save(&Entry::new(format!("root{r}"), Value::None))
            .expect("root");
        let mut first = None;
        for c in 0..10 {
            let child = store
                .save(&Entry::new(format!("child{c}"), (r * 10 + c) as f64).child_of(&root))
                .expect("child");
            first.get_or_insert(child.id);
        }
        if let Some(target) = first {
            store
                .save(&Entry::new("alias", Value::reference(target)).child_of(&root))
                .expect("alias");
        }
    }
}

fn filter() -> holdall::Criterion {
    holdall::Criterion::name(Comparator::StartsWith, "child")
        .and(holdall::Criterion::value(Comparator::GreaterOrEqual, 500))
        .or(holdall::Criterion::name(Comparator::Equal, "alias"))
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for roots in [10, 100] {
        let mut memory = Store::new(MemoryBackend::new(), Behavior::new()).expect("memory");
        populate(&mut memory, roots);
        let mut sql = Store::new(
            SqlBackend::open_in_memory(SchemaSettings::default()).expect("sqlite"),
            Behavior::new(),
        )
        .expect("sql");
        populate(&mut sql, roots);
        let criterion = filter();

        c.bench_function(&format!("memory query {roots} roots"), |b| {
            b.iter(|| memory.query(black_box(&criterion)).expect("query"))
        });
        c.bench_function(&format!("sql query {roots} roots"), |b| {
            b.iter(|| sql.query(black_box(&criterion)).expect("query"))
        });
    }

    let mut sql = Store::new(
        SqlBackend::open_in_memory(SchemaSettings::default()).expect("sqlite"),
        Behavior::new(),
    )
    .expect("sql");
    let target = sql.save(&Entry::new("target", 0)).expect("target");
    for n in 0..100 {
        sql.save(&Entry::new(format!("alias{n}"), Value::reference(target.id)))
            .expect("alias");
    }
    let mut next = target.clone();
    let mut counter = 0.0;
    c.bench_function("sql update with 100 aliases", |b| {
        b.iter(|| {
            counter += 1.0;
            next.value.set_number(counter);
            sql.save(black_box(&next)).expect("update")
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
