use parking_lot::Mutex;
use simbroker::error::StoreError;
use simbroker::store::{Column, Projection, ResultRow};
use simbroker::{Broker, BrokerConfig, BrokerState, Filter, MemoryStore, Producer, Store};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

const REPLY_DEADLINE: Duration = Duration::from_millis(400);

/// Store wrapper that keeps a handle on the relation so tests can inspect
/// it after the broker has stopped.
#[derive(Clone, Default)]
struct SharedStore(Arc<Mutex<MemoryStore>>);

impl SharedStore {
    fn row_count(&self) -> usize {
        self.0.lock().len()
    }

    fn energy_of(&self, aid: i64) -> Option<i32> {
        self.0
            .lock()
            .rows()
            .find(|r| r.aid == aid)
            .map(|r| r.energy)
    }
}

impl Store for SharedStore {
    fn execute_read(
        &mut self,
        filter: Option<&Filter>,
        projection: &Projection,
    ) -> Result<Vec<ResultRow>, StoreError> {
        self.0.lock().execute_read(filter, projection)
    }

    fn execute_write(
        &mut self,
        filter: Option<&Filter>,
        assignments: &[(Column, String)],
    ) -> Result<usize, StoreError> {
        self.0.lock().execute_write(filter, assignments)
    }

    fn execute_insert(
        &mut self,
        columns: &[Column],
        values: &[String],
    ) -> Result<(), StoreError> {
        self.0.lock().execute_insert(columns, values)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.0.lock().commit()
    }
}

fn test_config() -> BrokerConfig {
    BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    }
}

fn start_broker<S: Store + 'static>(store: S) -> Broker {
    Broker::start(test_config(), store).expect("broker failed to start")
}

fn producer_for(broker: &Broker) -> Producer {
    Producer::bind("127.0.0.1:0", broker.local_addr()).expect("producer failed to bind")
}

const ALL_COLUMNS: [&str; 7] = ["tick", "aid", "role", "state", "energy", "x_pos", "y_pos"];

#[test]
fn scenario_a_select_all_on_empty_store() {
    let mut broker = start_broker(MemoryStore::new());
    let producer = producer_for(&broker);

    producer.select(None, &["*"]).unwrap();
    let rows = producer.recv_rows(REPLY_DEADLINE).unwrap();
    assert!(rows.is_empty());

    broker.stop().unwrap();
}

#[test]
fn scenario_b_insert_then_select_all() {
    let mut broker = start_broker(MemoryStore::new());
    let producer = producer_for(&broker);

    producer
        .insert(&ALL_COLUMNS, &["1", "1", "1", "1", "100", "0.0", "0.0"])
        .unwrap();
    producer.select(None, &["*"]).unwrap();

    let rows = producer.recv_rows(REPLY_DEADLINE).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].aid, 1);
    assert_eq!(rows[0].attributes, ALL_COLUMNS);
    assert_eq!(rows[0].values, vec!["1", "1", "1", "1", "100", "0", "0"]);

    broker.stop().unwrap();
}

#[test]
fn scenario_c_filtered_update_leaves_other_rows_alone() {
    let store = SharedStore::default();
    let mut broker = start_broker(store.clone());
    let producer = producer_for(&broker);

    producer
        .insert(&ALL_COLUMNS, &["1", "1", "1", "1", "100", "0.0", "0.0"])
        .unwrap();
    producer
        .insert(&ALL_COLUMNS, &["1", "2", "1", "1", "100", "0.0", "0.0"])
        .unwrap();
    producer.update(Some("aid=1"), &[("energy", "50")]).unwrap();

    producer.select(Some("aid=1"), &["energy"]).unwrap();
    let rows = producer.recv_rows(REPLY_DEADLINE).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec!["50"]);

    assert_eq!(store.energy_of(1), Some(50));
    assert_eq!(store.energy_of(2), Some(100));

    broker.stop().unwrap();
}

#[test]
fn scenario_e_malformed_request_is_dropped() {
    let store = SharedStore::default();
    let mut broker = start_broker(store.clone());
    let producer = producer_for(&broker);

    // Missing the attribute field entirely.
    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
    raw.send_to(b"U#cond", broker.local_addr()).unwrap();

    // A valid select behind it acts as a fence: FIFO means the malformed
    // datagram was handled once the reply comes back.
    producer.select(None, &["*"]).unwrap();
    let rows = producer.recv_rows(REPLY_DEADLINE).unwrap();
    assert!(rows.is_empty());

    assert_eq!(store.row_count(), 0);
    let stats = broker.stats();
    assert_eq!(stats.requests_dropped, 1);
    assert_eq!(stats.operations_applied, 1); // just the select

    broker.stop().unwrap();
}

#[test]
fn fifo_order_from_a_single_producer() {
    let store = SharedStore::default();
    let mut broker = start_broker(store.clone());
    let producer = producer_for(&broker);

    producer
        .insert(&ALL_COLUMNS, &["1", "1", "1", "1", "0", "0.0", "0.0"])
        .unwrap();
    for energy in 1..=50 {
        producer
            .update(Some("aid=1"), &[("energy", &energy.to_string())])
            .unwrap();
    }
    producer.select(None, &["*"]).unwrap();
    let rows = producer.recv_rows(REPLY_DEADLINE).unwrap();
    assert_eq!(rows.len(), 1);

    // Applied in send order, the last update wins.
    assert_eq!(store.energy_of(1), Some(50));

    broker.stop().unwrap();
}

#[test]
fn terminate_drains_queued_operations_before_stopping() {
    let store = SharedStore::default();
    let mut broker = start_broker(store.clone());
    let producer = producer_for(&broker);

    for tick in 1..=20 {
        producer
            .insert(
                &ALL_COLUMNS,
                &[&tick.to_string(), "1", "1", "1", "100", "0.0", "0.0"],
            )
            .unwrap();
    }
    producer.terminate().unwrap();

    broker.wait();
    assert_eq!(broker.state(), BrokerState::Stopped);
    assert_eq!(store.row_count(), 20);
}

#[test]
fn stopping_twice_is_a_no_op() {
    let mut broker = start_broker(MemoryStore::new());
    broker.stop().unwrap();
    assert_eq!(broker.state(), BrokerState::Stopped);

    broker.stop().unwrap();
    assert_eq!(broker.state(), BrokerState::Stopped);

    // A stray Terminate datagram at the now-dead address changes nothing.
    let _ = simbroker::send_request(broker.local_addr(), &simbroker::Request::terminate());
    assert_eq!(broker.state(), BrokerState::Stopped);
}

#[test]
fn bind_failure_is_fatal() {
    let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let config = BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: addr.port(),
        ..Default::default()
    };
    let result = Broker::start(config, MemoryStore::new());
    assert!(matches!(result, Err(simbroker::Error::Io(_))));
}

#[test]
fn duplicate_key_insert_does_not_halt_the_broker() {
    let store = SharedStore::default();
    let mut broker = start_broker(store.clone());
    let producer = producer_for(&broker);

    let row = ["1", "1", "1", "1", "100", "0.0", "0.0"];
    producer.insert(&ALL_COLUMNS, &row).unwrap();
    producer.insert(&ALL_COLUMNS, &row).unwrap(); // constraint violation
    producer
        .insert(&ALL_COLUMNS, &["2", "1", "1", "1", "100", "0.0", "0.0"])
        .unwrap();

    producer.select(None, &["*"]).unwrap();
    let rows = producer.recv_rows(REPLY_DEADLINE).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(store.row_count(), 2);

    broker.stop().unwrap();
}
