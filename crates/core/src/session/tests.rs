use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatline_model::{ErrorKind, ModelFinishReason, Turn};
use chatline_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use tokio::task::yield_now;
use tokio::time::timeout;

use crate::{ExchangeStage, FailurePolicy, SessionBuilder, SessionError};

fn slow_provider() -> TestModelProvider {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_delay(Duration::from_millis(50));
    model_provider
}

#[tokio::test]
async fn test_simple_exchange() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hello".to_owned()),
        PresetEvent::MessageDelta(" world".to_owned()),
    ]));

    let session =
        SessionBuilder::with_model_provider(model_provider.clone()).build();
    assert_eq!(session.stage(), ExchangeStage::Idle);

    let fragments = Arc::new(Mutex::new(Vec::new()));
    let outcome = session
        .submit("Hi", {
            let fragments = Arc::clone(&fragments);
            move |fragment| fragments.lock().unwrap().push(fragment)
        })
        .await
        .unwrap();

    assert_eq!(outcome.text, "Hello world");
    assert_eq!(outcome.finish_reason, Some(ModelFinishReason::Stop));
    assert_eq!(outcome.malformed_units, 0);
    assert_eq!(*fragments.lock().unwrap(), ["Hello", " world"]);
    assert_eq!(session.stage(), ExchangeStage::Completed);
    assert_eq!(
        session.history(),
        vec![Turn::user("Hi"), Turn::assistant("Hello world")]
    );
}

#[tokio::test]
async fn test_full_transcript_is_sent() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::with_text("One"));
    model_provider.push_response(PresetResponse::with_text("Two"));

    let session =
        SessionBuilder::with_model_provider(model_provider.clone()).build();
    session.submit("First", |_| {}).await.unwrap();
    session.submit("Second", |_| {}).await.unwrap();

    let requests = model_provider.received_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].turns, vec![Turn::user("First")]);
    assert_eq!(
        requests[1].turns,
        vec![
            Turn::user("First"),
            Turn::assistant("One"),
            Turn::user("Second"),
        ]
    );
}

#[tokio::test]
async fn test_empty_reply_adds_no_turn() {
    let model_provider = TestModelProvider::default();
    model_provider
        .push_response(PresetResponse::with_events(Vec::<PresetEvent>::new()));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    let outcome = session.submit("Hi", |_| {}).await.unwrap();
    assert_eq!(outcome.text, "");
    assert_eq!(session.history(), vec![Turn::user("Hi")]);
}

#[tokio::test]
async fn test_failure_keeps_user_turn() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::refused(
        ErrorKind::Transport,
        "Connection failed",
    ));
    model_provider.push_response(PresetResponse::with_text("Back again"));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    let err = session.submit("hi", |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Transport));
    assert_eq!(err.to_string(), "Connection failed");
    assert_eq!(session.stage(), ExchangeStage::Failed);
    assert_eq!(session.history(), vec![Turn::user("hi")]);

    // The session accepts the next message after a failure.
    session.submit("retry", |_| {}).await.unwrap();
    assert_eq!(
        session.history(),
        vec![
            Turn::user("hi"),
            Turn::user("retry"),
            Turn::assistant("Back again"),
        ]
    );
}

#[tokio::test]
async fn test_stream_failure_delivers_fragments() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Par".to_owned()),
        PresetEvent::Fail {
            kind: ErrorKind::Service,
            message: "overloaded".to_owned(),
        },
    ]));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    let fragments = Arc::new(Mutex::new(Vec::new()));
    let err = session
        .submit("Hi", {
            let fragments = Arc::clone(&fragments);
            move |fragment| fragments.lock().unwrap().push(fragment)
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Service));
    assert_eq!(*fragments.lock().unwrap(), ["Par"]);
    assert_eq!(session.history(), vec![Turn::user("Hi")]);
}

#[tokio::test]
async fn test_failure_rolls_back() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::with_text("Hello"));
    model_provider
        .push_response(PresetResponse::refused(ErrorKind::Transport, "down"));

    let session = SessionBuilder::with_model_provider(model_provider)
        .with_failure_policy(FailurePolicy::RollBack)
        .build();
    assert_eq!(session.failure_policy(), FailurePolicy::RollBack);

    session.submit("Hi", |_| {}).await.unwrap();
    let before = session.history();
    session.submit("Again", |_| {}).await.unwrap_err();
    assert_eq!(session.history(), before);
}

#[tokio::test]
async fn test_not_configured() {
    let mut model_provider = TestModelProvider::default();
    model_provider.set_configured(false);

    let session =
        SessionBuilder::with_model_provider(model_provider.clone()).build();
    let err = session.submit("Hi", |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Configuration));
    assert!(session.history().is_empty());
    assert_eq!(session.stage(), ExchangeStage::Idle);
    assert!(model_provider.received_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_busy() {
    let model_provider = slow_provider();
    model_provider.push_response(PresetResponse::with_text("Hello"));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    let (first, second) = tokio::join!(session.submit("Hi", |_| {}), async {
        yield_now().await;
        // The first exchange is in flight, its user turn is visible.
        assert_eq!(session.stage(), ExchangeStage::AwaitingResponse);
        assert_eq!(session.history(), vec![Turn::user("Hi")]);
        session.submit("Me too", |_| {}).await
    });

    assert_eq!(first.unwrap().text, "Hello");
    assert!(matches!(second, Err(SessionError::Busy)));
    assert_eq!(
        session.history(),
        vec![Turn::user("Hi"), Turn::assistant("Hello")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_abort() {
    let model_provider = slow_provider();
    model_provider.push_response(PresetResponse::with_text("Too late"));
    model_provider.push_response(PresetResponse::with_text("Hello"));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    assert!(!session.abort());

    let (result, aborted) =
        tokio::join!(session.submit("Hi", |_| {}), async {
            yield_now().await;
            session.abort()
        });
    assert!(aborted);
    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(err.kind(), Some(ErrorKind::Cancelled));
    assert_eq!(session.stage(), ExchangeStage::Failed);
    assert_eq!(session.history(), vec![Turn::user("Hi")]);

    let outcome = session.submit("Again", |_| {}).await.unwrap();
    assert_eq!(outcome.text, "Hello");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_exchange() {
    let model_provider = slow_provider();
    model_provider.push_response(PresetResponse::with_text("Too late"));

    let session = SessionBuilder::with_model_provider(model_provider)
        .with_failure_policy(FailurePolicy::RollBack)
        .build();
    let result =
        timeout(Duration::from_millis(5), session.submit("Hi", |_| {})).await;
    assert!(result.is_err());

    assert_eq!(session.stage(), ExchangeStage::Failed);
    assert!(session.history().is_empty());
    assert!(!session.abort());
}

#[tokio::test]
async fn test_reset() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::with_text("Hello"));
    model_provider.push_response(PresetResponse::with_text("Fresh"));

    let session =
        SessionBuilder::with_model_provider(model_provider.clone()).build();
    session.submit("Hi", |_| {}).await.unwrap();
    session.reset();
    assert!(session.history().is_empty());

    session.submit("New topic", |_| {}).await.unwrap();
    let requests = model_provider.received_requests();
    assert_eq!(requests[1].turns, vec![Turn::user("New topic")]);
}

#[tokio::test(start_paused = true)]
async fn test_reset_while_awaiting_response() {
    let model_provider = slow_provider();
    model_provider.push_response(PresetResponse::with_text("Hello"));
    model_provider.push_response(PresetResponse::with_events([
        PresetEvent::Fail {
            kind: ErrorKind::Service,
            message: "overloaded".to_owned(),
        },
    ]));

    let session = SessionBuilder::with_model_provider(model_provider)
        .with_failure_policy(FailurePolicy::RollBack)
        .build();

    // The reply still reaches the caller, but not the cleared transcript.
    let (result, _) = tokio::join!(session.submit("Hi", |_| {}), async {
        yield_now().await;
        session.reset();
    });
    assert_eq!(result.unwrap().text, "Hello");
    assert!(session.history().is_empty());
    assert_eq!(session.stage(), ExchangeStage::Completed);

    let (result, _) = tokio::join!(session.submit("Hi", |_| {}), async {
        yield_now().await;
        session.reset();
    });
    assert_eq!(result.unwrap_err().kind(), Some(ErrorKind::Service));
    assert!(session.history().is_empty());
    assert_eq!(session.stage(), ExchangeStage::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_switch_model() {
    let model_provider = slow_provider();
    model_provider.push_response(PresetResponse::with_text("Hello"));

    let other_provider = TestModelProvider::default();
    other_provider.push_response(PresetResponse::with_text("Hi from another"));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    let (first, switched) =
        tokio::join!(session.submit("Hi", |_| {}), async {
            yield_now().await;
            session.switch_model(TestModelProvider::default())
        });
    first.unwrap();
    assert!(matches!(switched, Err(SessionError::Busy)));
    assert_eq!(session.history().len(), 2);

    session.switch_model(other_provider.clone()).unwrap();
    assert!(session.history().is_empty());

    let outcome = session.submit("Who are you?", |_| {}).await.unwrap();
    assert_eq!(outcome.text, "Hi from another");
    assert_eq!(
        other_provider.received_requests()[0].turns,
        vec![Turn::user("Who are you?")]
    );
}

#[tokio::test]
async fn test_settled_stages_accept_next_submit() {
    let model_provider = TestModelProvider::default();
    model_provider.push_response(PresetResponse::with_text("One"));
    model_provider
        .push_response(PresetResponse::refused(ErrorKind::Transport, "down"));
    model_provider.push_response(PresetResponse::with_text("Three"));

    let session = SessionBuilder::with_model_provider(model_provider).build();
    assert!(session.stage().accepts_submit());

    session.submit("1", |_| {}).await.unwrap();
    assert_eq!(session.stage(), ExchangeStage::Completed);
    assert!(session.stage().accepts_submit());

    session.submit("2", |_| {}).await.unwrap_err();
    assert_eq!(session.stage(), ExchangeStage::Failed);
    assert!(session.stage().accepts_submit());

    session.submit("3", |_| {}).await.unwrap();
    assert_eq!(session.stage(), ExchangeStage::Completed);
    assert!(!ExchangeStage::AwaitingResponse.accepts_submit());
}
