use eventstore_sdk_rs::{EventInput, EventStore, Selector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let addr = std::env::var("EVENTSTORE_ADDR")
        .unwrap_or_else(|_| "http://localhost:50051".to_string());
    let mut client = EventStore::connect(addr).await?;

    let student = "student-S";
    let course = "course-C";

    client
        .put(vec![EventInput::new(
            "StudentRegistered",
            b"{}".to_vec(),
            [student],
        )])
        .await?;

    client
        .put(vec![EventInput::new(
            "CourseRegistered",
            b"{}".to_vec(),
            [course],
        )])
        .await?;

    let cb = vec![Selector::with_tags([student, course])];
    let (_, head) = client.get(cb.clone(), None, None).await?;

    client
        .put_if(
            vec![EventInput::new(
                "StudentJoinedCourse",
                b"{}".to_vec(),
                [student, course],
            )],
            cb,
            head,
        )
        .await?;

    let (events, _) = client
        .get(vec![Selector::with_tags([student])], None, None)
        .await?;
    println!("events for {student}: {}", events.len());

    Ok(())
}
