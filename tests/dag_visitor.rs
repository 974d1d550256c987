//! End-to-end scenario for `DAGVisitor` from the public crate API:
//! predecessor-before-successor ordering over a topologically sorted
//! input stream (spec §8's universal DAGVisitor property).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use snapvault::context::Context;
use snapvault::graph::dag_visit;

#[test]
fn visits_respect_predecessor_order_on_a_diamond() {
    // D depends on B and C; both depend on A. Topological order: A,B,C,D.
    let ctx = Context::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    for n in ['A', 'B', 'C', 'D'] {
        tx.send(n).unwrap();
    }
    drop(tx);

    let mut parents = HashMap::new();
    parents.insert('A', vec!['B', 'C']);
    parents.insert('B', vec!['D']);
    parents.insert('C', vec!['D']);
    let sf = move |_ctx: &Context, node: &char| -> anyhow::Result<Vec<char>> {
        Ok(parents.get(node).cloned().unwrap_or_default())
    };

    let order = Arc::new(Mutex::new(Vec::new()));
    let order2 = order.clone();
    let visitor = move |_ctx: &Context, node: &char| -> anyhow::Result<()> {
        order2.lock().unwrap().push(*node);
        Ok(())
    };

    dag_visit(&ctx, rx, &sf, &visitor, 4).unwrap();

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 4);
    let pos = |c: char| order.iter().position(|&x| x == c).unwrap();
    assert!(pos('B') > pos('A'));
    assert!(pos('C') > pos('A'));
    assert!(pos('D') > pos('B'));
    assert!(pos('D') > pos('C'));
}

#[test]
fn first_visitor_error_is_returned() {
    let ctx = Context::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    tx.send('X').unwrap();
    drop(tx);
    let sf = |_ctx: &Context, _node: &char| -> anyhow::Result<Vec<char>> { Ok(vec![]) };
    let visitor = |_ctx: &Context, _node: &char| -> anyhow::Result<()> { Err(anyhow::anyhow!("broke")) };
    let result = dag_visit(&ctx, rx, &sf, &visitor, 2);
    assert_eq!(result.unwrap_err().to_string(), "broke");
}
