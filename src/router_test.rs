//! # Row Router Test Suite
//!
//! - **Distribute**: every record reaches exactly one Row Set, balanced
//! - **Copy**: every record reaches every Row Set, including each target copy
//! - **Targeted emit**: `route_to` and unknown targets
//! - **Stop**: a stopped run reports undelivered records

use crate::graph::DistributionMode;
use crate::router::{OutputHop, RowRouter};
use crate::row_set::{Endpoint, RowSet};
use crate::signal::StopSignal;
use crate::test_nodes::{name_records, names_schema};
use crate::value::{Record, Value};
use std::sync::Arc;

fn row_sets(target: &str, copies: usize, stop: &StopSignal) -> Vec<Arc<RowSet>> {
  (0..copies)
    .map(|copy| {
      Arc::new(RowSet::new(
        Endpoint::new("producer", 0),
        Endpoint::new(target, copy),
        100,
        stop.clone(),
      ))
    })
    .collect()
}

fn drain(row_set: &RowSet) -> Vec<Record> {
  std::iter::from_fn(|| row_set.try_get().map(|(_, r)| r)).collect()
}

#[tokio::test]
async fn test_distribute_is_balanced_over_all_row_sets() {
  let stop = StopSignal::new();
  let a = row_sets("a", 2, &stop);
  let b = row_sets("b", 1, &stop);
  let mut router = RowRouter::new(
    DistributionMode::Distribute,
    vec![OutputHop::new("a", a.clone()), OutputHop::new("b", b.clone())],
  );
  assert_eq!(router.row_sets().len(), 3);

  let schema = names_schema();
  let names: Vec<String> = (0..10).map(|i| format!("r{}", i)).collect();
  let refs: Vec<&str> = names.iter().map(String::as_str).collect();
  for record in name_records(&refs) {
    assert_eq!(router.route(&schema, record).await, 1);
  }

  let counts: Vec<usize> = a.iter().chain(&b).map(|rs| rs.len()).collect();
  assert_eq!(counts.iter().sum::<usize>(), 10);
  assert!(counts.iter().all(|&n| n == 3 || n == 4), "unbalanced: {:?}", counts);
  assert_eq!(drain(&a[0])[0].get(0), Some(&Value::from("r0")));
  assert_eq!(drain(&a[1])[0].get(0), Some(&Value::from("r1")));
}

#[tokio::test]
async fn test_copy_reaches_every_row_set() {
  let stop = StopSignal::new();
  let a = row_sets("a", 2, &stop);
  let b = row_sets("b", 1, &stop);
  let mut router = RowRouter::new(
    DistributionMode::Copy,
    vec![OutputHop::new("a", a.clone()), OutputHop::new("b", b.clone())],
  );

  let schema = names_schema();
  for record in name_records(&["x", "y", "z", "w"]) {
    assert_eq!(router.route(&schema, record).await, 3);
  }

  let expected = vec![Value::from("x"), Value::from("y"), Value::from("z"), Value::from("w")];
  for row_set in a.iter().chain(&b) {
    let seen: Vec<Value> = drain(row_set).into_iter().filter_map(|r| r.get(0).cloned()).collect();
    assert_eq!(seen, expected, "row set {}", row_set.name());
  }
}

#[tokio::test]
async fn test_copy_to_one_hop_feeds_every_target_copy() {
  let stop = StopSignal::new();
  let a = row_sets("a", 2, &stop);
  let mut router = RowRouter::new(DistributionMode::Copy, vec![OutputHop::new("a", a.clone())]);
  let schema = names_schema();
  for record in name_records(&["p", "q", "r", "s"]) {
    assert_eq!(router.route(&schema, record).await, 2);
  }
  assert_eq!(a[0].len(), 4);
  assert_eq!(a[1].len(), 4);
}

#[tokio::test]
async fn test_route_to_single_target() {
  let stop = StopSignal::new();
  let a = row_sets("a", 1, &stop);
  let b = row_sets("b", 1, &stop);
  let mut router = RowRouter::new(
    DistributionMode::Copy,
    vec![OutputHop::new("a", a.clone()), OutputHop::new("b", b.clone())],
  );
  let schema = names_schema();
  let mut records = name_records(&["only-b", "nowhere"]).into_iter();

  assert_eq!(router.route_to("b", &schema, records.next().unwrap()).await, Some(true));
  assert_eq!(router.route_to("c", &schema, records.next().unwrap()).await, None);
  assert!(a[0].is_empty());
  assert_eq!(b[0].len(), 1);
  assert_eq!(router.targets().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_mark_done_closes_every_row_set() {
  let stop = StopSignal::new();
  let a = row_sets("a", 3, &stop);
  let router = RowRouter::new(DistributionMode::Distribute, vec![OutputHop::new("a", a.clone())]);
  router.mark_done();
  assert!(a.iter().all(|rs| rs.is_done()));
}

#[tokio::test]
async fn test_stopped_run_delivers_nothing() {
  let stop = StopSignal::new();
  let a = Arc::new(RowSet::new(Endpoint::new("p", 0), Endpoint::new("a", 0), 1, stop.clone()));
  let mut router = RowRouter::new(DistributionMode::Distribute, vec![OutputHop::new("a", vec![Arc::clone(&a)])]);
  let schema = names_schema();
  assert_eq!(router.route(&schema, Record::from(vec![Value::from("fits")])).await, 1);

  stop.raise();
  assert_eq!(router.route(&schema, Record::from(vec![Value::from("full")])).await, 0);
}

#[test]
fn test_empty_router() {
  let router = RowRouter::new(DistributionMode::Distribute, Vec::new());
  assert!(router.is_empty());
  assert_eq!(router.mode(), DistributionMode::Distribute);
}
