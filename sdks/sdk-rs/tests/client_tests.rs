use std::net::SocketAddr;
use std::sync::Arc;

use eventstore_bin::{DcbEventStoreServer, Service};
use eventstore_sdk_rs::{ClientError, EventInput, EventStore, Selector};
use tokio::task::JoinHandle;

async fn spawn_server() -> (String, JoinHandle<()>) {
    let store = eventstore_backend_memory::InMemoryStore::new();
    let port = portpicker::pick_unused_port().expect("a free port");
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let svc = Service {
        store: store as Arc<dyn eventstore_core::DcbRecorder>,
    };

    let handle = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(DcbEventStoreServer::new(svc))
            .serve(addr)
            .await
            .expect("server should run cleanly");
    });

    // Give the listener a moment to bind before clients connect.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let (addr, _jh) = spawn_server().await;
    let mut client = EventStore::connect(addr).await.unwrap();

    let pos = client
        .put(vec![EventInput::new("Type1", b"a".to_vec(), ["tagX"])])
        .await
        .unwrap();
    assert_eq!(pos, 1);

    let (events, head) = client
        .get(vec![Selector::with_tags(["tagX"])], None, None)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].position, 1);
    assert_eq!(head, Some(1));
}

#[tokio::test]
async fn course_booking_sequence_rejects_replay() {
    let (addr, _jh) = spawn_server().await;
    let mut client = EventStore::connect(addr).await.unwrap();

    client
        .put(vec![EventInput::new(
            "StudentRegistered",
            vec![],
            ["student-S"],
        )])
        .await
        .unwrap();
    client
        .put(vec![EventInput::new(
            "CourseRegistered",
            vec![],
            ["course-C"],
        )])
        .await
        .unwrap();

    let cb = vec![Selector::with_tags(["student-S", "course-C"])];
    let (_, head) = client.get(cb.clone(), None, None).await.unwrap();

    client
        .put_if(
            vec![EventInput::new(
                "StudentJoinedCourse",
                vec![],
                ["student-S", "course-C"],
            )],
            cb.clone(),
            head,
        )
        .await
        .unwrap();

    let err = client
        .put_if(
            vec![EventInput::new(
                "StudentJoinedCourse",
                vec![],
                ["student-S", "course-C"],
            )],
            cb,
            head,
        )
        .await
        .expect_err("re-running the same join should conflict");
    assert!(matches!(err, ClientError::Integrity));
}
