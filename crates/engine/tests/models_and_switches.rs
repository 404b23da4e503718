use std::sync::Arc;
use std::thread;
use xforms_controls::{ControlDescriptor, ControlKind};
use xforms_dom::{CacheKey, ConnectionResult, InstanceCache, XmlTree};
use xforms_engine::{ActionElement, ClientEvent, ContainingDocument, EngineConfig, EventHandler, FormDefinition};
use xforms_model::{Bind, InstanceDescriptor, ModelDescriptor, ResourceResolver, SchemaValidator, XFormsError, XFormsEvent};
use xforms_xpath::SimpleEvaluator;

const CODES_URI: &str = "https://example.com/codes.xml";

/// Serves one currency list and nothing else.
struct Catalog;

impl ResourceResolver for Catalog {
    fn fetch(&self, uri: &str) -> anyhow::Result<ConnectionResult> {
        anyhow::ensure!(uri == CODES_URI, "unknown resource `{uri}`");
        Ok(ConnectionResult::ok(uri, XmlTree::parse("<codes><code>EUR</code></codes>")?))
    }

    fn schema(&self, uris: &str) -> anyhow::Result<Arc<dyn SchemaValidator>> {
        anyhow::bail!("no schema `{uris}`")
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn currency_form() -> FormDefinition {
    FormDefinition::new()
        .model(
            ModelDescriptor::new("main")
                .instance(InstanceDescriptor::inline("data", "<data/>"))
                .instance(InstanceDescriptor::external("codes", CODES_URI).shared(None)),
        )
        .control(ControlDescriptor::new(ControlKind::Input, "code").bound("instance('codes')/code"))
}

fn currency_document(cache: &Arc<InstanceCache>) -> ContainingDocument {
    let mut document = ContainingDocument::new(
        currency_form(),
        EngineConfig::default(),
        Arc::new(SimpleEvaluator::new()),
        Arc::new(Catalog),
        Arc::clone(cache),
    );
    document.initialize().unwrap();
    document
}

#[test]
fn shared_instance_is_copied_on_write() {
    init_logging();
    let cache = Arc::new(InstanceCache::new(8));

    let (edited, untouched) = thread::scope(|scope| {
        let editor = scope.spawn(|| {
            let mut document = currency_document(&cache);
            document
                .handle_client_event(ClientEvent::ValueChange {
                    control: "code".to_owned(),
                    value: "USD".to_owned(),
                })
                .unwrap();
            document.evaluate("instance('codes')/code").unwrap()
        });
        let reader = scope.spawn(|| currency_document(&cache).evaluate("instance('codes')/code").unwrap());
        (editor.join().unwrap(), reader.join().unwrap())
    });

    assert_eq!(edited, "USD");
    assert_eq!(untouched, "EUR");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.misses(), 1);
    let shared = cache.peek(&CacheKey::new("codes", CODES_URI)).unwrap();
    assert_eq!(shared.string_value(shared.document_element().unwrap()), "EUR");
}

fn broken_form() -> FormDefinition {
    FormDefinition::new().model(
        ModelDescriptor::new("main").instance(InstanceDescriptor::external("codes", "https://example.com/missing.xml")),
    )
}

#[test]
fn unhandled_link_exception_is_fatal() {
    init_logging();
    let mut document = ContainingDocument::standalone(broken_form(), EngineConfig::default());
    let error = document.initialize().unwrap_err();
    assert!(error.downcast_ref::<XFormsError>().is_some_and(XFormsError::is_link));
    assert!(!document.is_ready());
}

#[test]
fn handled_link_exception_lets_the_document_start() {
    init_logging();
    let form = broken_form().handler(EventHandler::new(
        XFormsEvent::LinkException,
        "main",
        ActionElement::block(Vec::new()),
    ));
    let mut document = ContainingDocument::standalone(form, EngineConfig::default());
    document.initialize().unwrap();
    assert!(document.is_ready());
}

/// A panel whose switch is only relevant once `enabled` is `yes`.
fn panel_form() -> FormDefinition {
    FormDefinition::new()
        .model(
            ModelDescriptor::new("main")
                .instance(InstanceDescriptor::inline("data", "<form><flag/><enabled>no</enabled></form>"))
                .bind(Bind::new("flag").relevant("../enabled = 'yes'")),
        )
        .control(
            ControlDescriptor::new(ControlKind::Switch, "panel")
                .bound("flag")
                .child(ControlDescriptor::new(ControlKind::Case, "closed"))
                .child(ControlDescriptor::new(ControlKind::Case, "open")),
        )
        .control(ControlDescriptor::new(ControlKind::Trigger, "open-button"))
        .control(ControlDescriptor::new(ControlKind::Trigger, "enable"))
        .handler(EventHandler::new(
            XFormsEvent::DomActivate,
            "open-button",
            ActionElement::toggle("open"),
        ))
        .handler(EventHandler::new(
            XFormsEvent::DomActivate,
            "enable",
            ActionElement::set_literal("enabled", "yes"),
        ))
}

#[test]
fn toggle_on_a_non_relevant_switch_is_ignored() {
    init_logging();
    let mut document = ContainingDocument::standalone(panel_form(), EngineConfig::default());
    document.initialize().unwrap();
    assert_eq!(document.control("panel").map(|panel| panel.relevant), Some(false));

    let open = ClientEvent::Activate {
        control: "open-button".to_owned(),
    };
    document.handle_client_event(open.clone()).unwrap();
    assert_ne!(document.selected_case("panel"), Some("open"));

    document
        .handle_client_event(ClientEvent::Activate {
            control: "enable".to_owned(),
        })
        .unwrap();
    assert_eq!(document.control("panel").map(|panel| panel.relevant), Some(true));
    document.handle_client_event(open).unwrap();
    assert_eq!(document.selected_case("panel"), Some("open"));
}
