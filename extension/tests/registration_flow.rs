// End-to-end router scenarios with in-memory storage and a scripted monitoring service

use async_trait::async_trait;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use yad2_monitor_extension::clock::ManualClock;
use yad2_monitor_extension::error::{Error, Result};
use yad2_monitor_extension::protocol::{AuthIdentity, Credentials};
use yad2_monitor_extension::services::badge::NoBadge;
use yad2_monitor_extension::services::monitor_api::{
    MonitorApi, RegisterRequest, RegistrationResponse,
};
use yad2_monitor_extension::services::storage::MemoryStorage;
use yad2_monitor_extension::{DeploymentConfig, MessageRouter, MessageSender};

const CONTACT_CONFIG: &str = r#"
[target]
host = "www.yad2.co.il"
path_prefix = "/realestate"

[api]
default_base_url = "http://monitor.test/api"

[registration]
variant = "contact"
"#;

const SEARCH: &str = "https://www.yad2.co.il/realestate/forsale?city=5";

#[derive(Default)]
struct ScriptedService {
    responses: RefCell<VecDeque<Result<RegistrationResponse>>>,
    calls: RefCell<Vec<RegisterRequest>>,
}

impl ScriptedService {
    fn answer(&self, response: Result<RegistrationResponse>) {
        self.responses.borrow_mut().push_back(response);
    }
}

#[async_trait(?Send)]
impl MonitorApi for ScriptedService {
    async fn authenticate(&self, _: &str, credentials: &Credentials) -> Result<AuthIdentity> {
        Ok(AuthIdentity {
            authenticated: true,
            username: Some(credentials.username.clone()),
        })
    }

    async fn register(&self, _: &str, request: &RegisterRequest) -> Result<RegistrationResponse> {
        self.calls.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(Error::remote("no scripted response")))
    }
}

fn response(user_id: &str, preference_id: &str, link: Option<&str>) -> RegistrationResponse {
    RegistrationResponse {
        user_id: user_id.into(),
        preference_id: preference_id.into(),
        telegram_deep_link: link.map(str::to_string),
        telegram_qr_code: None,
        message: None,
    }
}

struct Background {
    router: MessageRouter,
    service: Rc<ScriptedService>,
    storage: Rc<MemoryStorage>,
}

fn background() -> Background {
    let config = DeploymentConfig::from_toml_str(CONTACT_CONFIG).unwrap();
    let service = Rc::new(ScriptedService::default());
    let storage = Rc::new(MemoryStorage::new());
    let router = MessageRouter::new(
        &config,
        storage.clone(),
        service.clone(),
        Rc::new(NoBadge),
        Rc::new(ManualClock::new(1_700_000_000_000)),
    );
    Background {
        router,
        service,
        storage,
    }
}

async fn send(bg: &Background, message: Value, sender: MessageSender) -> Value {
    bg.router
        .handle(message, sender)
        .expect("message should be answered")
        .await
}

async fn report(bg: &Background, url: &str, params: Value, tab_id: i64) -> Value {
    send(
        bg,
        json!({"type": "YAD2_URL_DETECTED", "payload": {"url": url, "params": params}}),
        MessageSender::tab(tab_id),
    )
    .await
}

async fn register_email(bg: &Background, email: &str) -> Value {
    send(
        bg,
        json!({"type": "REGISTER_USER", "payload": {"email": email}}),
        MessageSender::extension(),
    )
    .await
}

#[tokio::test]
async fn detection_lifecycle_follows_the_owning_tab() {
    let bg = background();
    let get = json!({"type": "GET_DETECTION"});

    assert_eq!(
        send(&bg, get.clone(), MessageSender::extension()).await,
        json!({"detection": null})
    );

    assert_eq!(report(&bg, SEARCH, json!({"city": "5"}), 7).await, json!({"ok": true}));
    assert_eq!(
        send(&bg, get.clone(), MessageSender::extension()).await,
        json!({"detection": {
            "url": SEARCH,
            "params": {"city": "5"},
            "tabId": 7,
            "detectedAt": 1_700_000_000_000i64
        }})
    );

    bg.router.on_tab_removed(7);
    assert_eq!(
        send(&bg, get, MessageSender::extension()).await,
        json!({"detection": null})
    );
}

#[tokio::test]
async fn most_recent_detection_wins_across_tabs() {
    let bg = background();
    report(&bg, SEARCH, json!({"city": "5"}), 1).await;
    report(&bg, "https://www.yad2.co.il/realestate/rent", json!({}), 2).await;

    // closing the older tab does not touch the newer record
    bg.router.on_tab_removed(1);
    let reply = send(&bg, json!({"type": "GET_DETECTION"}), MessageSender::extension()).await;
    assert_eq!(reply["detection"]["tabId"], 2);
}

#[tokio::test]
async fn register_without_detection_fails_without_remote_call() {
    let bg = background();
    let reply = register_email(&bg, "a@b.com").await;

    assert_eq!(reply, json!({"ok": false, "error": "No Yad2 search detected yet."}));
    assert!(bg.service.calls.borrow().is_empty());
}

#[tokio::test]
async fn successful_registration_is_stored_under_user_id() {
    let bg = background();
    report(&bg, SEARCH, json!({"city": "5"}), 7).await;
    bg.service.answer(Ok(response("u1", "p1", Some("tg://x"))));

    let reply = register_email(&bg, "a@b.com").await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["data"]["user_id"], "u1");
    assert_eq!(reply["data"]["telegram_deep_link"], "tg://x");

    let sent = &bg.service.calls.borrow()[0];
    assert_eq!(sent.search_url, SEARCH);
    assert_eq!(serde_json::to_value(&sent.query_params).unwrap(), json!({"city": "5"}));
    assert_eq!(sent.identity.email.as_deref(), Some("a@b.com"));

    let stored = bg.storage.snapshot("registrations").unwrap();
    assert_eq!(stored["u1"]["telegramLink"], "tg://x");
    assert_eq!(stored["u1"]["preferenceId"], "p1");
    assert_eq!(stored["u1"]["email"], "a@b.com");

    let listed = send(&bg, json!({"type": "GET_REGISTRATIONS"}), MessageSender::extension()).await;
    assert_eq!(listed["registrations"]["u1"]["userId"], "u1");
}

#[tokio::test]
async fn remote_rejection_leaves_store_unchanged() {
    let bg = background();
    report(&bg, SEARCH, json!({"city": "5"}), 7).await;
    bg.service.answer(Err(Error::remote("duplicate")));

    let reply = register_email(&bg, "a@b.com").await;
    assert_eq!(reply, json!({"ok": false, "error": "duplicate"}));
    assert!(bg.storage.snapshot("registrations").is_none());
}

#[tokio::test]
async fn re_registration_replaces_the_whole_record() {
    let bg = background();
    report(&bg, SEARCH, json!({"city": "5"}), 7).await;

    bg.service.answer(Ok(response("u1", "p1", Some("tg://x"))));
    send(
        &bg,
        json!({"type": "REGISTER_USER", "payload": {
            "email": "a@b.com",
            "display_name": "Dana",
            "label": "North"
        }}),
        MessageSender::extension(),
    )
    .await;

    bg.service.answer(Ok(response("u1", "p2", None)));
    register_email(&bg, "a@b.com").await;

    let stored = bg.storage.snapshot("registrations").unwrap();
    let record = stored["u1"].as_object().unwrap();
    assert_eq!(record["preferenceId"], "p2");
    assert_eq!(record["telegramLink"], Value::Null);
    assert!(!record.contains_key("displayName"));
    assert!(!record.contains_key("label"));
}

#[tokio::test]
async fn different_users_accumulate() {
    let bg = background();
    report(&bg, SEARCH, json!({"city": "5"}), 7).await;

    bg.service.answer(Ok(response("u1", "p1", None)));
    register_email(&bg, "a@b.com").await;
    bg.service.answer(Ok(response("u2", "p9", None)));
    register_email(&bg, "c@d.com").await;

    let stored = bg.storage.snapshot("registrations").unwrap();
    assert_eq!(stored.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn registration_uses_detection_at_submit_time() {
    let bg = background();
    report(&bg, SEARCH, json!({"city": "5"}), 7).await;
    report(
        &bg,
        "https://www.yad2.co.il/realestate/rent?rooms=3&rooms=4",
        json!({"rooms": ["3", "4"]}),
        7,
    )
    .await;
    bg.service.answer(Ok(response("u1", "p1", None)));

    register_email(&bg, "a@b.com").await;

    let sent = &bg.service.calls.borrow()[0];
    assert_eq!(
        sent.search_url,
        "https://www.yad2.co.il/realestate/rent?rooms=3&rooms=4"
    );
    assert_eq!(
        serde_json::to_value(&sent.query_params).unwrap(),
        json!({"rooms": ["3", "4"]})
    );
}

#[tokio::test]
async fn unknown_messages_are_not_answered() {
    let bg = background();
    assert!(bg
        .router
        .handle(json!({"type": "OPEN_SIDE_PANEL"}), MessageSender::extension())
        .is_none());
}
