use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use codepair::models::{Session, DEFAULT_CODE, DEFAULT_LANGUAGE};
use codepair::palette::{HOST_COLOR, PARTICIPANT_COLORS};
use codepair::session::SessionService;

fn recorder() -> (Arc<Mutex<Vec<Session>>>, impl Fn(&Session) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |s: &Session| sink.lock().unwrap().push(s.clone()))
}

#[tokio::test]
async fn test_create_session_has_single_host() {
    let service = SessionService::new();
    let session = service.create_session("Interview", "Alice").await.unwrap();

    assert_eq!(session.participants.len(), 1);
    let host = session.host().unwrap();
    assert!(host.is_host);
    assert_eq!(host.name, "Alice");
    assert_eq!(host.color, HOST_COLOR);
    assert_eq!(session.code, DEFAULT_CODE);
    assert_eq!(session.language, DEFAULT_LANGUAGE);
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let service = SessionService::new();
    let mut ids = std::collections::HashSet::new();
    for i in 0..200 {
        let session = service
            .create_session(&format!("Room {i}"), "Host")
            .await
            .unwrap();
        assert!(ids.insert(session.id), "session id issued twice");
    }
}

#[tokio::test]
async fn test_blank_names_are_rejected() {
    let service = SessionService::new();
    assert!(service.create_session("  ", "Alice").await.is_err());
    assert!(service.create_session("Room", "").await.is_err());

    let session = service.create_session("Room", "Alice").await.unwrap();
    assert!(service.join_session(&session.id, "   ").await.is_err());
}

#[tokio::test]
async fn test_join_then_leave_restores_participants() {
    let service = SessionService::new();
    let session = service.create_session("Pairing", "Alice").await.unwrap();

    let bob = service
        .join_session(&session.id, "Bob")
        .await
        .unwrap()
        .unwrap();
    assert!(!bob.is_host);
    assert!(PARTICIPANT_COLORS.contains(&bob.color.as_str()));

    let joined = service.get_session(&session.id).await.unwrap();
    assert_eq!(joined.participants.len(), 2);
    assert_eq!(joined.participant(&bob.id).map(|p| p.name.as_str()), Some("Bob"));

    assert!(service.leave_session(&session.id, &bob.id).await);
    let after = service.get_session(&session.id).await.unwrap();
    assert_eq!(after.participants, session.participants);

    // Leaving again is a successful no-op.
    assert!(service.leave_session(&session.id, &bob.id).await);
    let again = service.get_session(&session.id).await.unwrap();
    assert_eq!(again.participants, session.participants);
}

#[tokio::test]
async fn test_missing_session_operations() {
    let service = SessionService::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let _sub = service.subscribe("nope", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(service.get_session("nope").await.is_none());
    assert_eq!(service.join_session("nope", "Bob").await.unwrap(), None);
    assert!(!service.leave_session("nope", "someone").await);
    assert!(!service.update_code("nope", "x").await);
    assert!(!service.update_language("nope", "python").await);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_snapshots_mirror_mutations_in_order() {
    let service = SessionService::new();
    let session = service.create_session("Live", "Alice").await.unwrap();
    let (seen, observer) = recorder();
    let _sub = service.subscribe(&session.id, observer);

    let bob = service
        .join_session(&session.id, "Bob")
        .await
        .unwrap()
        .unwrap();
    service.update_code(&session.id, "a").await;
    service.update_code(&session.id, "b").await;
    service.update_language(&session.id, "cobol").await;
    service.leave_session(&session.id, &bob.id).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[0].participants.len(), 2);
    assert_eq!(seen[1].code, "a");
    assert_eq!(seen[2].code, "b");
    assert_eq!(seen[3].language, "cobol");
    assert_eq!(seen[4].participants.len(), 1);

    let latest = service.get_session(&session.id).await.unwrap();
    assert_eq!(latest.code, "b");
    assert_eq!(&latest, seen.last().unwrap());
}

#[tokio::test]
async fn test_observers_are_scoped_to_their_session() {
    let service = SessionService::new();
    let first = service.create_session("One", "Alice").await.unwrap();
    let second = service.create_session("Two", "Carol").await.unwrap();
    let (seen_first, observer_first) = recorder();
    let (seen_second, observer_second) = recorder();
    let _a = service.subscribe(&first.id, observer_first);
    let _b = service.subscribe(&second.id, observer_second);

    service.update_code(&first.id, "only first").await;

    assert_eq!(seen_first.lock().unwrap().len(), 1);
    assert!(seen_second.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let service = SessionService::new();
    let session = service.create_session("Room", "Alice").await.unwrap();
    let (seen, observer) = recorder();
    let sub = service.subscribe(&session.id, observer);

    service.update_code(&session.id, "one").await;
    sub.unsubscribe();
    sub.unsubscribe();
    assert!(!sub.is_active());
    service.update_code(&session.id, "two").await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].code, "one");
}

#[tokio::test]
async fn test_panicking_observer_does_not_block_others() {
    let service = SessionService::new();
    let session = service.create_session("Room", "Alice").await.unwrap();
    let _bad = service.subscribe(&session.id, |_| panic!("observer failure"));
    let (seen, observer) = recorder();
    let _good = service.subscribe(&session.id, observer);

    assert!(service.update_code(&session.id, "still delivered").await);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_writers_settle_on_one_value() {
    let service = Arc::new(SessionService::new());
    let session = service.create_session("Race", "Alice").await.unwrap();
    let (seen, observer) = recorder();
    let _sub = service.subscribe(&session.id, observer);

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        let id = session.id.clone();
        handles.push(tokio::spawn(async move {
            service.update_code(&id, &format!("write {i}")).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 16);
    let latest = service.get_session(&session.id).await.unwrap();
    // The last delivered snapshot is the state that won.
    assert_eq!(latest.code, seen.last().unwrap().code);
}
