use parking_lot::Mutex;
use simbroker::error::StoreError;
use simbroker::store::{Column, Projection, ResultRow};
use simbroker::{
    Broker, BrokerConfig, ControlListener, ControlMessage, Filter, MemoryStore, Producer, Store,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const EXPECTED_CAPACITY: usize = 100;
const BURST: usize = 1000;

/// Store that takes a beat per operation, so the queue actually builds up
/// behind a fast producer.
#[derive(Clone, Default)]
struct SlowStore {
    inner: Arc<Mutex<MemoryStore>>,
    delay: Duration,
}

impl SlowStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::default(),
            delay,
        }
    }

    fn row_count(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Store for SlowStore {
    fn execute_read(
        &mut self,
        filter: Option<&Filter>,
        projection: &Projection,
    ) -> Result<Vec<ResultRow>, StoreError> {
        self.inner.lock().execute_read(filter, projection)
    }

    fn execute_write(
        &mut self,
        filter: Option<&Filter>,
        assignments: &[(Column, String)],
    ) -> Result<usize, StoreError> {
        thread::sleep(self.delay);
        self.inner.lock().execute_write(filter, assignments)
    }

    fn execute_insert(
        &mut self,
        columns: &[Column],
        values: &[String],
    ) -> Result<(), StoreError> {
        thread::sleep(self.delay);
        self.inner.lock().execute_insert(columns, values)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.lock().commit()
    }
}

fn start_broker(store: SlowStore) -> Broker {
    let config = BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        expected_queue_len: EXPECTED_CAPACITY,
        ..Default::default()
    };
    Broker::start(config, store).expect("broker failed to start")
}

const ALL_COLUMNS: [&str; 7] = ["tick", "aid", "role", "state", "energy", "x_pos", "y_pos"];

fn send_burst(producer: &Producer) {
    for tick in 0..BURST {
        producer
            .insert(
                &ALL_COLUMNS,
                &[&tick.to_string(), "1", "1", "1", "100", "0.0", "0.0"],
            )
            .unwrap();
    }
}

#[test]
fn burst_sender_is_paused_before_the_hundredth_insert_lands() {
    let store = SlowStore::new(Duration::from_millis(1));
    let mut broker = start_broker(store.clone());
    let producer = Producer::bind("127.0.0.1:0", broker.local_addr()).unwrap();

    send_burst(&producer);

    let pause = producer
        .recv_control(Duration::from_secs(2))
        .unwrap()
        .expect("no pause notification arrived");
    assert_eq!(pause, ControlMessage::Pause);
    assert!(
        store.row_count() < EXPECTED_CAPACITY,
        "pause came only after {} inserts were applied",
        store.row_count()
    );

    broker.stop().unwrap();
    assert!(broker.stats().pauses_sent >= 1);
    // The transport may shed datagrams under a burst like this; everything
    // that reached the queue has been applied by now.
    assert!(store.row_count() >= EXPECTED_CAPACITY);
}

#[test]
fn listeners_hear_continue_once_the_queue_drains() {
    let store = SlowStore::new(Duration::from_millis(1));
    let mut broker = start_broker(store.clone());
    let listener = ControlListener::register("127.0.0.1:0", broker.local_addr()).unwrap();
    let producer = Producer::bind("127.0.0.1:0", broker.local_addr()).unwrap();

    send_burst(&producer);

    let message = listener
        .recv_timeout(Duration::from_secs(10))
        .expect("no broadcast arrived");
    assert_eq!(message, ControlMessage::Continue);

    broker.stop().unwrap();

    // The terminate broadcast reaches the listener and ends its thread.
    let mut saw_terminate = false;
    while let Some(message) = listener.recv_timeout(Duration::from_secs(2)) {
        if message == ControlMessage::Terminate {
            saw_terminate = true;
            break;
        }
    }
    assert!(saw_terminate);
    listener.join();
}

#[test]
fn quiet_producers_are_never_paused() {
    let store = SlowStore::new(Duration::ZERO);
    let mut broker = start_broker(store);
    let producer = Producer::bind("127.0.0.1:0", broker.local_addr()).unwrap();

    for tick in 0..5 {
        producer
            .insert(
                &ALL_COLUMNS,
                &[&tick.to_string(), "1", "1", "1", "100", "0.0", "0.0"],
            )
            .unwrap();
        // A paced producer never sees the queue reach the watermark.
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(producer.recv_control(Duration::from_millis(200)).unwrap(), None);
    broker.stop().unwrap();
    assert_eq!(broker.stats().pauses_sent, 0);
}
