use super::*;

#[tokio::test]
async fn every_session_receives_the_change() {
    let broadcaster = Broadcaster::new(8);
    let mut first = broadcaster.subscribe();
    let mut second = broadcaster.subscribe();
    assert_ne!(first.session_id(), second.session_id());

    broadcaster.on_state_change(PsuState::with_gpio(false));

    for session in [&mut first, &mut second] {
        let message = session.recv().await.expect("message");
        assert_eq!(message, PluginMessage::state(PsuState::with_gpio(false)));
    }
}

#[tokio::test]
async fn dropping_subscription_unregisters_session() {
    let broadcaster = Broadcaster::new(8);
    let first = broadcaster.subscribe();
    let second = broadcaster.subscribe();
    assert_eq!(broadcaster.session_count(), 2);

    drop(first);
    assert_eq!(broadcaster.session_count(), 1);
    drop(second);
    assert_eq!(broadcaster.session_count(), 0);
}

#[tokio::test]
async fn lagging_session_skips_forward_in_order() {
    let broadcaster = Broadcaster::new(2);
    let mut session = broadcaster.subscribe();

    for is_on in [true, false, true, false] {
        broadcaster.on_state_change(PsuState::with_gpio(is_on));
    }

    assert_eq!(
        session.recv().await.map(|m| m.data),
        Some(PsuState::with_gpio(true))
    );
    assert_eq!(
        session.recv().await.map(|m| m.data),
        Some(PsuState::with_gpio(false))
    );
}

#[tokio::test]
async fn send_without_sessions_is_harmless() {
    let broadcaster = Broadcaster::new(2);
    broadcaster.on_state_change(PsuState::without_gpio());
    assert_eq!(broadcaster.session_count(), 0);
}
