use super::*;
use axum::{body, body::Body, http::Request};
use gpio::{GpioController, LineConfig, PinHandle, SimulatedLine};
use server_api::{Broadcaster, IdleSettings, ServiceOptions, StateStore};
use tower::ServiceExt;

fn options() -> ServiceOptions {
    ServiceOptions {
        line: LineConfig::default(),
        ui: UiSettings {
            enable_power_off_warning_dialog: true,
        },
        idle: IdleSettings::default(),
        shutdown_command: None,
        broadcast_capacity: 16,
    }
}

async fn test_app(line: Option<&SimulatedLine>) -> (Router, ApiContext) {
    let store = Arc::new(StateStore::new(Broadcaster::new(16)));
    let controller = line.map(|line| {
        let handle = PinHandle::new(Box::new(line.clone()), 17, false);
        GpioController::new(handle, store.clone(), Duration::from_millis(200))
    });
    let api = ApiContext::with_controller(store, controller, options())
        .seeded()
        .await;
    let app = build_router(Arc::new(AppState { api: api.clone() }));
    (app, api)
}

fn command(name: &str) -> Request<Body> {
    Request::post(PLUGIN_ROUTE)
        .header("content-type", "application/json; charset=UTF-8")
        .body(Body::from(
            serde_json::json!({ "command": name }).to_string(),
        ))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _api) = test_app(None).await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn get_state_command_returns_current_state() {
    let line = SimulatedLine::new(false);
    let (app, _api) = test_app(Some(&line)).await;

    let response = app.oneshot(command("getPSUState")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "hasGPIO": true, "isOn": true })
    );
}

#[tokio::test]
async fn plain_get_matches_get_state_command() {
    let line = SimulatedLine::new(true);
    let (app, _api) = test_app(Some(&line)).await;

    let request = Request::get(PLUGIN_ROUTE)
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "hasGPIO": true, "isOn": false })
    );
}

#[tokio::test]
async fn turn_off_acks_with_empty_object_and_pushes_state() {
    let line = SimulatedLine::new(false);
    let (app, api) = test_app(Some(&line)).await;
    let mut session = api.subscribe();

    let response = app.oneshot(command("turn_psu_off")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({}));

    let pushed = tokio::time::timeout(Duration::from_secs(1), session.recv())
        .await
        .expect("push")
        .expect("message");
    assert_eq!(
        serde_json::to_value(pushed).expect("json"),
        serde_json::json!({ "plugin": "psuoff", "data": { "hasGPIO": true, "isOn": false } })
    );
    assert!(line.level_high());
}

#[tokio::test]
async fn legacy_turn_off_spelling_is_accepted() {
    let line = SimulatedLine::new(false);
    let (app, api) = test_app(Some(&line)).await;

    let response = app.oneshot(command("turnPSUOff")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!get_psu_state(&api).is_on);
}

#[tokio::test]
async fn unknown_command_is_bad_request() {
    let line = SimulatedLine::new(false);
    let (app, api) = test_app(Some(&line)).await;

    let response = app
        .oneshot(command("shutdownPlanet"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "invalid_command");
    assert_eq!(get_psu_state(&api), PsuState::with_gpio(true));
    assert_eq!(line.write_count(), 0);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (app, _api) = test_app(None).await;
    let request = Request::post(PLUGIN_ROUTE)
        .header("content-type", "application/json")
        .body(Body::from("{\"command\":"))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hardware_fault_is_service_unavailable() {
    let line = SimulatedLine::new(false);
    let (app, api) = test_app(Some(&line)).await;
    line.set_failing(true);

    let response = app.oneshot(command("turn_psu_off")).await.expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "hardware_unavailable");
    assert!(get_psu_state(&api).is_on);
}

#[tokio::test]
async fn without_gpio_turn_off_is_acknowledged() {
    let (app, api) = test_app(None).await;

    let response = app
        .clone()
        .oneshot(command("turn_psu_off"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(command("getPSUState")).await.expect("response");
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "hasGPIO": false, "isOn": false })
    );
    assert!(!api.has_gpio());
}

#[tokio::test]
async fn settings_route_exposes_warning_dialog_flag() {
    let (app, _api) = test_app(None).await;
    let request = Request::get(format!("{PLUGIN_ROUTE}/settings"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({ "enablePowerOffWarningDialog": true })
    );
}

#[tokio::test]
async fn activity_route_accepts_gcode() {
    let line = SimulatedLine::new(false);
    let (app, _api) = test_app(Some(&line)).await;
    let request = Request::post(format!("{PLUGIN_ROUTE}/activity"))
        .header("content-type", "application/json")
        .body(Body::from(r#"{"gcode":"G28"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (app, _api) = test_app(None).await;
    let request = Request::post(PLUGIN_ROUTE)
        .header("content-type", "application/json")
        .body(Body::from(vec![b' '; MAX_BODY_BYTES + 1]))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

async fn next_frame<S>(socket: &mut S) -> serde_json::Value
where
    S: futures::Stream<
            Item = Result<
                tokio_tungstenite::tungstenite::Message,
                tokio_tungstenite::tungstenite::Error,
            >,
        > + Unpin,
{
    use futures::StreamExt;
    use tokio_tungstenite::tungstenite::Message as Frame;

    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .expect("frame");
        if let Frame::Text(text) = frame {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

#[tokio::test]
async fn ws_session_receives_current_state_then_pushes() {
    use futures::SinkExt;

    let line = SimulatedLine::new(false);
    let (app, api) = test_app(Some(&line)).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let router = app.clone();
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");

    assert_eq!(
        next_frame(&mut socket).await,
        serde_json::json!({ "plugin": "psuoff", "data": { "hasGPIO": true, "isOn": true } })
    );
    assert_eq!(api.store.broadcaster().session_count(), 1);

    let response = app
        .oneshot(command("turn_psu_off"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        next_frame(&mut socket).await,
        serde_json::json!({ "plugin": "psuoff", "data": { "hasGPIO": true, "isOn": false } })
    );

    socket.close(None).await.expect("close");
    let unregistered = tokio::time::timeout(Duration::from_secs(2), async {
        while api.store.broadcaster().session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(unregistered.is_ok(), "session still registered after close");

    server.abort();
}
