//! Convergence of replicas exchanging updates in arbitrary order.

use std::sync::{Arc, Mutex};

use relay_crdt::{DocumentFactory, RgaFactory, TextDocument, UpdateCallback};

type Outbox = Arc<Mutex<Vec<Vec<u8>>>>;

fn recorder() -> (UpdateCallback, Outbox) {
    let outbox: Outbox = Arc::default();
    let sink = Arc::clone(&outbox);
    (
        Box::new(move |u: &[u8]| sink.lock().unwrap().push(u.to_vec())),
        outbox,
    )
}

fn drain(outbox: &Outbox) -> Vec<Vec<u8>> {
    std::mem::take(&mut *outbox.lock().unwrap())
}

/// A replica seeded with `text` and its encoded state.
fn seeded(text: &str) -> Vec<u8> {
    let mut doc = RgaFactory.create(Box::new(|_: &[u8]| {}));
    doc.insert_text(0, text).unwrap();
    doc.encode_state().unwrap()
}

fn replica(state: &[u8]) -> (Box<dyn TextDocument>, Outbox) {
    let (cb, outbox) = recorder();
    (RgaFactory.load(cb, state).unwrap(), outbox)
}

#[test]
fn test_hello_cross_insert() {
    let state = seeded("hello");
    let (mut a, out_a) = replica(&state);
    let (mut b, out_b) = replica(&state);

    a.insert_text(0, "X").unwrap();
    b.insert_text(5, "Y").unwrap();

    for u in drain(&out_a) {
        b.apply_update(&u).unwrap();
    }
    for u in drain(&out_b) {
        a.apply_update(&u).unwrap();
    }
    assert_eq!(a.text(), b.text());
    assert_eq!(a.text(), "XhelloY");
}

#[test]
fn test_same_index_inserts_converge() {
    let state = seeded("hello");
    let (mut a, out_a) = replica(&state);
    let (mut b, out_b) = replica(&state);

    a.insert_text(0, "X").unwrap();
    b.insert_text(0, "Y").unwrap();

    for u in drain(&out_a) {
        b.apply_update(&u).unwrap();
    }
    for u in drain(&out_b) {
        a.apply_update(&u).unwrap();
    }
    assert_eq!(a.text(), b.text());
    assert!(["XYhello", "YXhello"].contains(&a.text().as_str()));
}

#[test]
fn test_apply_twice_equals_apply_once() {
    let state = seeded("abc");
    let (mut a, out_a) = replica(&state);
    let (mut b, _) = replica(&state);
    let (mut c, _) = replica(&state);

    a.insert_text(1, "zz").unwrap();
    a.delete_text(0, 1).unwrap();
    let updates = drain(&out_a);

    for u in &updates {
        b.apply_update(u).unwrap();
        c.apply_update(u).unwrap();
        c.apply_update(u).unwrap();
    }
    for u in updates.iter().rev() {
        c.apply_update(u).unwrap();
    }
    assert_eq!(b.text(), "zzbc");
    assert_eq!(c.text(), b.text());
    assert_eq!(c.encode_state().unwrap(), b.encode_state().unwrap());
}

#[test]
fn test_order_independence_across_permutations() {
    let state = seeded("the quick brown fox");
    let (mut p1, o1) = replica(&state);
    let (mut p2, o2) = replica(&state);
    let (mut p3, o3) = replica(&state);

    p1.insert_text(0, ">> ").unwrap();
    p2.insert_text(10, "red ").unwrap();
    p3.delete_text(16, 3).unwrap();
    p3.insert_text(16, "cat").unwrap();

    let updates: Vec<Vec<u8>> = [drain(&o1), drain(&o2), drain(&o3)].concat();
    assert_eq!(updates.len(), 4);

    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
    let mut results = Vec::new();
    for order in orders {
        let (mut doc, _) = replica(&state);
        for i in order {
            doc.apply_update(&updates[i]).unwrap();
        }
        results.push(doc.text());
    }
    assert!(results.iter().all(|t| t == &results[0]), "{results:?}");
    assert_eq!(results[0], ">> the quick red brown cat");
}

#[test]
fn test_large_single_insert() {
    let (mut a, out_a) = replica(&seeded(""));
    let word = "w".repeat(50_000);
    a.insert_text(0, &word).unwrap();
    let updates = drain(&out_a);
    assert_eq!(updates.len(), 1);

    let (mut b, _) = replica(&seeded(""));
    b.apply_update(&updates[0]).unwrap();
    assert_eq!(b.len(), 50_000);
    assert_eq!(b.text(), word);
}
