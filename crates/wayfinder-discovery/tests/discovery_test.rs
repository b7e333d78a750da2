// Integration tests for ServiceDiscovery
// Tests the publish / lookup / bind / release flow end to end

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use wayfinder_discovery::{
    BroadcastNotifier, DiscoveryError, DiscoveryOptions, FileBackend, Filter, HttpEndpoint,
    Notification, NoopNotifier, Record, ServiceDiscovery, ServiceObject, Status, downcast,
};

struct HttpClient {
    endpoint: String,
    timeout_ms: u64,
}

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    closed: AtomicUsize,
}

fn register_http_client(discovery: &ServiceDiscovery) -> Arc<Counters> {
    let counters = Arc::new(Counters::default());
    let built = counters.clone();
    let closed = counters.clone();

    discovery.service_types().register_factory(
        "http-endpoint",
        move |config: &Map<String, Value>| {
            built.built.fetch_add(1, Ordering::SeqCst);
            let endpoint = config
                .get("endpoint")
                .and_then(Value::as_str)
                .ok_or_else(|| DiscoveryError::ServiceConstruction("no endpoint".to_string()))?;
            let client = HttpClient {
                endpoint: endpoint.to_string(),
                timeout_ms: config.get("timeout-ms").and_then(Value::as_u64).unwrap_or(1000),
            };
            Ok(Arc::new(client) as ServiceObject)
        },
        move |_: &ServiceObject| {
            closed.closed.fetch_add(1, Ordering::SeqCst);
        },
    );
    counters
}

fn create_discovery() -> (ServiceDiscovery, broadcast::Receiver<Notification>) {
    let notifier = BroadcastNotifier::default();
    let rx = notifier.subscribe();
    let options = DiscoveryOptions::default().with_name("consumer-1");
    (ServiceDiscovery::from_options(options, Arc::new(notifier)), rx)
}

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn test_publish_lookup_bind_release() {
    let (discovery, mut rx) = create_discovery();
    let counters = register_http_client(&discovery);

    let record = HttpEndpoint::create_record("orders", false, "10.0.0.1", 8080, "/api", None);
    let published = discovery.publish(record).await.unwrap();

    let found = discovery
        .lookup(&Filter::json(json!({"name": "orders"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, published);

    let mut config = Map::new();
    config.insert("timeout-ms".to_string(), json!(250));
    let reference = discovery.get_reference(&found, Some(config)).unwrap();
    let object = reference.get().unwrap();
    let client = downcast::<HttpClient>(&object).unwrap();
    assert_eq!(client.endpoint, "http://10.0.0.1:8080/api");
    assert_eq!(client.timeout_ms, 250);

    assert!(discovery.release(&reference));
    assert!(!discovery.release(&reference));
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let messages = drain(&mut rx);
    let topics: Vec<&str> = messages.iter().map(|m| m.topic.as_str()).collect();
    assert_eq!(
        topics,
        vec![
            "wayfinder.discovery.announce",
            "wayfinder.discovery.usage",
            "wayfinder.discovery.usage",
        ]
    );
    assert_eq!(messages[1].payload["type"], "bind");
    assert_eq!(messages[1].payload["id"], "consumer-1");
    assert_eq!(messages[2].payload["type"], "release");
}

#[tokio::test]
async fn test_release_by_service_object() {
    let (discovery, _rx) = create_discovery();
    let counters = register_http_client(&discovery);
    let published = discovery
        .publish(HttpEndpoint::create_record("orders", false, "10.0.0.1", 8080, "/", None))
        .await
        .unwrap();

    let reference = discovery.get_reference(&published, None).unwrap();
    let object = reference.get().unwrap();

    assert!(discovery.release_service_object(&object));
    assert!(reference.is_released());
    assert!(!discovery.release_service_object(&object));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_status_filtering() {
    let (discovery, _rx) = create_discovery();
    let mut published = discovery.publish(Record::new("orders")).await.unwrap();
    published.status = Status::OutOfService;
    discovery.update(&published).await.unwrap();

    assert!(discovery.lookup(&Filter::all()).await.unwrap().is_none());
    let any = discovery
        .lookup_all(&Filter::json(json!({"status": "*"})))
        .await
        .unwrap();
    assert_eq!(any.len(), 1);
    let maintenance = discovery
        .lookup_all(&Filter::json(json!({"status": "OUT_OF_SERVICE"})))
        .await
        .unwrap();
    assert_eq!(maintenance.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumers_balance_out() {
    let discovery = Arc::new(ServiceDiscovery::from_options(
        DiscoveryOptions::default(),
        Arc::new(NoopNotifier),
    ));
    let counters = register_http_client(&discovery);
    let published = discovery
        .publish(HttpEndpoint::create_record("orders", false, "10.0.0.1", 8080, "/", None))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let discovery = discovery.clone();
        let record = published.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..100 {
                let reference = discovery.get_reference(&record, None).unwrap();
                let object = reference.get().unwrap();
                assert!(downcast::<HttpClient>(&object).is_some());
                assert!(discovery.release(&reference));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(discovery.bindings().is_empty());
    let built = counters.built.load(Ordering::SeqCst);
    assert!(built >= 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), built);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_consumers_share_one_object() {
    let discovery = Arc::new(ServiceDiscovery::from_options(
        DiscoveryOptions::default(),
        Arc::new(NoopNotifier),
    ));
    let counters = register_http_client(&discovery);
    let published = discovery
        .publish(HttpEndpoint::create_record("orders", false, "10.0.0.1", 8080, "/", None))
        .await
        .unwrap();

    // Both consumers hold their handle before either releases
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let discovery = discovery.clone();
            let record = published.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                let reference = discovery.get_reference(&record, None).unwrap();
                let object = reference.get().unwrap();
                barrier.wait().await;
                (reference, object)
            })
        })
        .collect();
    let mut held = Vec::new();
    for consumer in consumers {
        held.push(consumer.await.unwrap());
    }
    let (a, a_object) = held.remove(0);
    let (b, b_object) = held.remove(0);

    assert!(Arc::ptr_eq(&a_object, &b_object));
    assert_eq!(counters.built.load(Ordering::SeqCst), 1);

    assert!(discovery.release(&a));
    assert!(!discovery.release(&a));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&b.get().unwrap(), &b_object));

    assert!(discovery.release(&b));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert!(discovery.bindings().is_empty());
}

#[tokio::test]
async fn test_close_releases_outstanding_references() {
    let (discovery, mut rx) = create_discovery();
    let counters = register_http_client(&discovery);
    let published = discovery
        .publish(HttpEndpoint::create_record("orders", false, "10.0.0.1", 8080, "/", None))
        .await
        .unwrap();

    let first = discovery.get_reference(&published, None).unwrap();
    let second = discovery.get_reference(&published, None).unwrap();
    assert!(first.same_reference(&second));
    first.get().unwrap();
    let _ = drain(&mut rx);

    discovery.close().await;
    assert!(first.is_released());
    assert!(discovery.bindings().is_empty());
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let releases: Vec<Notification> = drain(&mut rx)
        .into_iter()
        .filter(|m| m.payload["type"] == "release")
        .collect();
    assert_eq!(releases.len(), 1);

    // Silent from now on
    discovery.unpublish(published.registration().unwrap()).await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_closed_instance_rejects_new_bindings() {
    let (discovery, _rx) = create_discovery();
    register_http_client(&discovery);
    let published = discovery
        .publish(HttpEndpoint::create_record("orders", false, "10.0.0.1", 8080, "/", None))
        .await
        .unwrap();

    discovery.close().await;
    let err = discovery.get_reference(&published, None).unwrap_err();
    assert!(matches!(err, DiscoveryError::Configuration(_)));
    assert!(discovery.bindings().is_empty());
}

#[tokio::test]
async fn test_file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let discovery = ServiceDiscovery::new(
            DiscoveryOptions::default(),
            Arc::new(FileBackend::new(dir.path())),
            Arc::new(NoopNotifier),
        );
        let published = discovery.publish(Record::new("orders")).await.unwrap();
        discovery.close().await;
        published.registration().unwrap().to_string()
    };

    let discovery = ServiceDiscovery::new(
        DiscoveryOptions::default(),
        Arc::new(FileBackend::new(dir.path())),
        Arc::new(NoopNotifier),
    );
    let record = discovery.registry().record(&id).await.unwrap().unwrap();
    assert_eq!(record.name, "orders");
    assert_eq!(record.status, Status::Up);
}
