use xforms_controls::{ClientUpdate, ControlDescriptor, ControlKind};
use xforms_engine::{
    ActionElement, ActionKind, ClientEvent, ContainingDocument, EngineConfig, EventHandler, FormDefinition,
    InsertPlace, LoadRequest, LoadShow,
};
use xforms_model::{Bind, InstanceDescriptor, ModelDescriptor, Phase, XFormsError, XFormsEvent};

const ORDER: &str = "<order><note>rush</note><line><qty>1</qty></line><line><qty>2</qty></line><total/></order>";

fn activate(observer: &str, action: ActionElement) -> EventHandler {
    EventHandler::new(XFormsEvent::DomActivate, observer, action)
}

fn trigger(id: &str) -> ControlDescriptor {
    ControlDescriptor::new(ControlKind::Trigger, id)
}

/// An order with lines, a computed total and a few triggers.
fn order_form() -> FormDefinition {
    FormDefinition::new()
        .model(
            ModelDescriptor::new("order")
                .instance(InstanceDescriptor::inline("main", ORDER))
                .bind(Bind::new("total").calculate("sum(../line/qty)")),
        )
        .control(
            ControlDescriptor::new(ControlKind::Repeat, "lines")
                .bound("line")
                .child(ControlDescriptor::new(ControlKind::Input, "qty").bound("qty")),
        )
        .control(ControlDescriptor::new(ControlKind::Output, "total").bound("total"))
        .control(trigger("add"))
        .control(trigger("remove"))
        .control(trigger("same"))
        .control(trigger("last"))
        .control(trigger("go"))
        .control(trigger("tenfold"))
        .handler(activate(
            "add",
            ActionElement::insert("line", Some("index('lines')"), InsertPlace::After),
        ))
        .handler(activate("remove", ActionElement::delete("line", Some("index('lines')"))))
        .handler(activate("same", ActionElement::set_literal("note", "rush")))
        .handler(activate("last", ActionElement::set_index("lines", "99")))
        .handler(activate("go", ActionElement::load("https://example.com/{note}")))
        .handler(activate(
            "tenfold",
            ActionElement::set_value(".", ". * 10").iterate("line/qty"),
        ))
        .handler(EventHandler::new(
            XFormsEvent::ScrollLast,
            "lines",
            ActionElement::set_literal("note", "scrolled"),
        ))
}

fn ready(form: FormDefinition) -> ContainingDocument {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig::new(true, 16, None, true, true);
    let mut document = ContainingDocument::standalone(form, config);
    document.initialize().unwrap();
    document
}

fn click(document: &mut ContainingDocument, control: &str) -> xforms_engine::CycleOutcome {
    document
        .handle_client_event(ClientEvent::Activate {
            control: control.to_owned(),
        })
        .unwrap()
}

#[test]
fn initialization_computes_and_indexes() {
    let document = ready(order_form());
    assert!(document.is_ready());
    assert_eq!(document.evaluate("total").unwrap(), "3");
    assert_eq!(document.repeat_index("lines"), Some(1));
    assert_eq!(
        document.control("total").and_then(|control| control.value.as_deref()),
        Some("3")
    );
    assert!(document.full_update().unwrap().contains(&ClientUpdate::Control {
        id: "qty\u{b7}2".to_owned(),
        attributes: Vec::new(),
        value: Some("2".to_owned()),
    }));
}

#[test]
fn setting_an_equal_value_does_nothing() {
    let mut document = ready(order_form());
    document.tracker_mut().clear_history();

    let outcome = click(&mut document, "same");
    assert!(outcome.updates.is_empty());
    assert!(document.tracker().performed("order").is_empty());
    assert!(!document.model("order").unwrap().deferred().is_pending());
}

#[test]
fn value_change_runs_each_pending_phase_once() {
    let mut document = ready(order_form());
    document.tracker_mut().clear_history();

    let outcome = document
        .handle_client_event(ClientEvent::ValueChange {
            control: "qty\u{b7}1".to_owned(),
            value: "7".to_owned(),
        })
        .unwrap();
    assert_eq!(
        document.tracker().performed("order"),
        vec![Phase::Recalculate, Phase::Revalidate, Phase::Refresh]
    );
    assert_eq!(document.evaluate("total").unwrap(), "9");
    assert_eq!(outcome.value_changed, vec!["qty\u{b7}1".to_owned()]);
    // The edited control is echoed back, with the total it changed.
    assert!(outcome.updates.contains(&ClientUpdate::Control {
        id: "qty\u{b7}1".to_owned(),
        attributes: Vec::new(),
        value: Some("7".to_owned()),
    }));
}

#[test]
fn insert_copies_the_last_line_after_the_current_one() {
    let mut document = ready(order_form());
    let outcome = click(&mut document, "add");

    assert_eq!(document.evaluate("count(line)").unwrap(), "3");
    assert_eq!(document.evaluate("line[2]/qty").unwrap(), "2");
    assert_eq!(document.evaluate("total").unwrap(), "5");
    assert_eq!(document.repeat_index("lines"), Some(2));
    assert!(outcome.updates.contains(&ClientUpdate::CopyRepeatTemplate {
        id: "lines".to_owned(),
        parent_indexes: String::new(),
        start: 3,
        end: 3,
    }));
    assert!(outcome.updates.contains(&ClientUpdate::RepeatIndex {
        id: "lines".to_owned(),
        index: 2,
    }));
}

#[test]
fn delete_removes_the_current_line() {
    let mut document = ready(order_form());
    let outcome = click(&mut document, "remove");

    assert_eq!(document.evaluate("count(line)").unwrap(), "1");
    assert_eq!(document.evaluate("line/qty").unwrap(), "2");
    assert_eq!(document.repeat_index("lines"), Some(1));
    assert!(outcome.updates.contains(&ClientUpdate::DeleteRepeatElements {
        id: "lines".to_owned(),
        parent_indexes: String::new(),
        count: 1,
    }));
}

#[test]
fn setindex_past_the_end_scrolls_to_the_last_line() {
    let mut document = ready(order_form());
    click(&mut document, "last");

    assert_eq!(document.repeat_index("lines"), Some(2));
    assert_eq!(document.evaluate("note").unwrap(), "scrolled");
}

#[test]
fn iterate_runs_once_per_node() {
    let mut document = ready(order_form());
    click(&mut document, "tenfold");

    assert_eq!(document.evaluate("line[1]/qty").unwrap(), "10");
    assert_eq!(document.evaluate("line[2]/qty").unwrap(), "20");
    assert_eq!(document.evaluate("total").unwrap(), "30");
}

#[test]
fn load_expands_its_resource_template() {
    let mut document = ready(order_form());
    let outcome = click(&mut document, "go");
    assert_eq!(
        outcome.loads,
        vec![LoadRequest {
            resource: "https://example.com/rush".to_owned(),
            target: None,
            replace: true,
        }]
    );
}

#[test]
fn load_with_binding_and_resource_is_ignored() {
    let form = order_form().control(trigger("both")).handler(activate(
        "both",
        ActionElement::load("https://example.com/").bound("note"),
    ));
    let mut document = ready(form);
    assert!(click(&mut document, "both").loads.is_empty());
}

#[test]
fn load_without_target_fails_with_its_location() {
    let form = order_form().control(trigger("nowhere")).handler(activate(
        "nowhere",
        ActionElement::new(ActionKind::Load {
            resource: None,
            show: LoadShow::New,
            target: None,
        }),
    ));
    let mut document = ready(form);
    let error = document
        .handle_client_event(ClientEvent::Activate {
            control: "nowhere".to_owned(),
        })
        .unwrap_err();
    assert!(format!("{error:#}").contains("running action \"xforms:load\""));
    assert!(error.downcast_ref::<XFormsError>().is_some());
}

#[test]
fn reset_restores_the_ready_state() {
    let mut document = ready(order_form());
    click(&mut document, "add");
    assert_eq!(document.evaluate("count(line)").unwrap(), "3");

    document
        .handle_client_event(ClientEvent::Named {
            event: XFormsEvent::Reset,
            target: "order".to_owned(),
        })
        .unwrap();
    assert_eq!(document.evaluate("count(line)").unwrap(), "2");
    assert_eq!(document.evaluate("total").unwrap(), "3");
}

#[test]
fn value_change_on_a_readonly_control_is_dropped() {
    let mut document = ready(order_form());
    // `total` is calculated, hence read-only.
    let outcome = document
        .handle_client_event(ClientEvent::ValueChange {
            control: "total".to_owned(),
            value: "100".to_owned(),
        })
        .unwrap();
    assert!(outcome.value_changed.is_empty());
    assert_eq!(document.evaluate("total").unwrap(), "3");
}

#[test]
fn client_events_require_initialization() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut document = ContainingDocument::standalone(order_form(), EngineConfig::default());
    let result = document.handle_client_event(ClientEvent::Activate {
        control: "add".to_owned(),
    });
    assert!(result.is_err());
}

/// Two inputs summed into a total; editing `a` also overwrites `b`.
fn cascade_form() -> FormDefinition {
    FormDefinition::new()
        .model(
            ModelDescriptor::new("sums")
                .instance(InstanceDescriptor::inline("main", "<data><a>1</a><b>0</b><total/></data>"))
                .bind(Bind::new("total").calculate("../a + ../b")),
        )
        .control(ControlDescriptor::new(ControlKind::Input, "a").bound("a"))
        .control(ControlDescriptor::new(ControlKind::Input, "b").bound("b"))
        .control(ControlDescriptor::new(ControlKind::Output, "total").bound("total"))
        .handler(EventHandler::new(
            XFormsEvent::ValueChanged,
            "a",
            ActionElement::set_literal("../b", "100"),
        ))
}

#[test]
fn handlers_dirtying_a_model_during_refresh_settle_in_the_same_cycle() {
    let mut document = ready(cascade_form());
    assert_eq!(document.evaluate("total").unwrap(), "1");

    let outcome = document
        .handle_client_event(ClientEvent::ValueChange {
            control: "a".to_owned(),
            value: "5".to_owned(),
        })
        .unwrap();
    assert_eq!(document.evaluate("b").unwrap(), "100");
    assert_eq!(document.evaluate("total").unwrap(), "105");
    assert!(!document.is_pending());
    assert!(!document.model("sums").unwrap().deferred().is_pending());
    assert!(outcome.updates.contains(&ClientUpdate::Control {
        id: "total".to_owned(),
        attributes: Vec::new(),
        value: Some("105".to_owned()),
    }));
}

#[test]
fn handlers_that_never_settle_fail_the_cycle() {
    let form = cascade_form().handler(EventHandler::new(
        XFormsEvent::ValueChanged,
        "b",
        ActionElement::set_value(".", ". + 1"),
    ));
    let mut document = ready(form);
    let error = document
        .handle_client_event(ClientEvent::ValueChange {
            control: "b".to_owned(),
            value: "2".to_owned(),
        })
        .unwrap_err();
    assert!(format!("{error:#}").contains("settling passes"));
    assert!(error.downcast_ref::<XFormsError>().is_some());
}

#[test]
fn while_rebinds_its_nodeset_on_every_run() {
    let form = FormDefinition::new()
        .model(ModelDescriptor::new("order").instance(InstanceDescriptor::inline(
            "main",
            "<order><line><qty>1</qty></line><line><qty>2</qty></line>\
             <line><qty>3</qty></line><line><qty>4</qty></line></order>",
        )))
        .control(
            ControlDescriptor::new(ControlKind::Repeat, "lines")
                .bound("line")
                .child(ControlDescriptor::new(ControlKind::Input, "qty").bound("qty")),
        )
        .control(trigger("prune"))
        .handler(activate(
            "prune",
            ActionElement::delete("line", Some("1")).repeat_while("count(line) > 2"),
        ));
    let mut document = ready(form);
    click(&mut document, "prune");

    assert_eq!(document.evaluate("count(line)").unwrap(), "2");
    assert_eq!(document.evaluate("line[1]/qty").unwrap(), "3");
    assert_eq!(document.evaluate("line[2]/qty").unwrap(), "4");
}

#[test]
fn setindex_with_a_non_number_keeps_the_index() {
    let form = order_form()
        .control(trigger("second"))
        .control(trigger("bogus"))
        .handler(activate("second", ActionElement::set_index("lines", "2")))
        .handler(activate("bogus", ActionElement::set_index("lines", "'abc'")));
    let mut document = ready(form);
    click(&mut document, "second");
    assert_eq!(document.repeat_index("lines"), Some(2));

    let outcome = click(&mut document, "bogus");
    assert_eq!(document.repeat_index("lines"), Some(2));
    assert_eq!(document.evaluate("note").unwrap(), "rush");
    assert!(outcome.updates.is_empty());
}

#[test]
fn setindex_below_one_scrolls_to_the_first_line() {
    let form = order_form()
        .control(trigger("second"))
        .control(trigger("top"))
        .handler(activate("second", ActionElement::set_index("lines", "2")))
        .handler(activate("top", ActionElement::set_index("lines", "0")))
        .handler(EventHandler::new(
            XFormsEvent::ScrollFirst,
            "lines",
            ActionElement::set_literal("note", "first"),
        ));
    let mut document = ready(form);
    click(&mut document, "second");
    let outcome = click(&mut document, "top");

    assert_eq!(document.repeat_index("lines"), Some(1));
    assert_eq!(document.evaluate("note").unwrap(), "first");
    assert!(outcome.updates.contains(&ClientUpdate::RepeatIndex {
        id: "lines".to_owned(),
        index: 1,
    }));
}

#[test]
fn dispatch_to_a_missing_target_is_ignored() {
    let form = order_form()
        .control(trigger("ping"))
        .handler(activate("ping", ActionElement::dispatch(XFormsEvent::Rebuild, "nowhere")));
    let mut document = ready(form);
    let outcome = click(&mut document, "ping");
    assert!(outcome.updates.is_empty());
    assert!(!document.is_pending());
}

/// Orders holding lines, shown as a repeat nested in a repeat.
fn nested_form() -> FormDefinition {
    FormDefinition::new()
        .model(ModelDescriptor::new("orders").instance(InstanceDescriptor::inline(
            "main",
            "<orders><order><line>a</line><line>b</line></order>\
             <order><line>c</line><line>d</line><line>e</line></order></orders>",
        )))
        .control(
            ControlDescriptor::new(ControlKind::Repeat, "orders").bound("order").child(
                ControlDescriptor::new(ControlKind::Repeat, "lines")
                    .bound("line")
                    .child(ControlDescriptor::new(ControlKind::Input, "item").bound(".")),
            ),
        )
        .control(trigger("pick"))
        .control(trigger("next-order"))
        .control(trigger("add-order"))
        .control(trigger("drop-order"))
        .handler(activate("pick", ActionElement::set_index("lines", "2")))
        .handler(activate("next-order", ActionElement::set_index("orders", "2")))
        .handler(activate(
            "add-order",
            ActionElement::insert("order", Some("index('orders')"), InsertPlace::After),
        ))
        .handler(activate("drop-order", ActionElement::delete("order", Some("index('orders')"))))
}

#[test]
fn setindex_on_an_outer_repeat_restarts_the_inner_one() {
    let mut document = ready(nested_form());
    click(&mut document, "pick");
    assert_eq!(document.repeat_index("lines"), Some(2));

    click(&mut document, "next-order");
    assert_eq!(document.repeat_index("orders"), Some(2));
    assert_eq!(document.repeat_index("lines"), Some(1));
}

#[test]
fn inserting_an_outer_iteration_restarts_the_inner_repeat() {
    let mut document = ready(nested_form());
    click(&mut document, "pick");
    click(&mut document, "add-order");

    assert_eq!(document.evaluate("count(order)").unwrap(), "3");
    assert_eq!(document.repeat_index("orders"), Some(2));
    assert_eq!(document.repeat_index("lines"), Some(1));
}

#[test]
fn deleting_the_current_outer_iteration_restarts_the_inner_repeat() {
    let mut document = ready(nested_form());
    click(&mut document, "pick");
    click(&mut document, "drop-order");

    assert_eq!(document.evaluate("count(order)").unwrap(), "1");
    assert_eq!(document.evaluate("order[1]/line[1]").unwrap(), "c");
    assert_eq!(document.repeat_index("orders"), Some(1));
    assert_eq!(document.repeat_index("lines"), Some(1));
}

/// Items each carrying a view/edit switch.
fn switch_form() -> FormDefinition {
    FormDefinition::new()
        .model(ModelDescriptor::new("list").instance(InstanceDescriptor::inline(
            "main",
            "<list><item>a</item><item>b</item><item>c</item></list>",
        )))
        .control(
            ControlDescriptor::new(ControlKind::Repeat, "items").bound("item").child(
                ControlDescriptor::new(ControlKind::Switch, "details")
                    .child(ControlDescriptor::new(ControlKind::Case, "view"))
                    .child(ControlDescriptor::new(ControlKind::Case, "edit")),
            ),
        )
        .control(trigger("second"))
        .control(trigger("start-editing"))
        .control(trigger("prepend"))
        .handler(activate("second", ActionElement::set_index("items", "2")))
        .handler(activate("start-editing", ActionElement::toggle("edit")))
        .handler(activate("prepend", ActionElement::insert("item", Some("1"), InsertPlace::Before)))
}

#[test]
fn switch_selection_follows_its_item_across_an_insert() {
    let mut document = ready(switch_form());
    click(&mut document, "second");
    click(&mut document, "start-editing");
    assert_eq!(document.selected_case("details\u{b7}2"), Some("edit\u{b7}2"));

    click(&mut document, "prepend");
    assert_eq!(document.evaluate("count(item)").unwrap(), "4");
    assert_eq!(document.selected_case("details\u{b7}3"), Some("edit\u{b7}3"));
    assert_eq!(document.selected_case("details\u{b7}2"), Some("view\u{b7}2"));
}

#[test]
fn setindex_on_an_empty_repeat_leaves_it_empty() {
    let form = order_form()
        .control(trigger("top"))
        .handler(activate("top", ActionElement::set_index("lines", "0")));
    let mut document = ready(form);
    click(&mut document, "remove");
    click(&mut document, "remove");
    assert_eq!(document.evaluate("count(line)").unwrap(), "0");
    assert_eq!(document.repeat_index("lines"), Some(0));

    click(&mut document, "top");
    assert_eq!(document.repeat_index("lines"), Some(0));
}

#[test]
fn refresh_without_data_changes_keeps_the_controls() {
    let form = order_form()
        .control(trigger("redraw"))
        .handler(activate("redraw", ActionElement::new(ActionKind::Refresh { model: None })));
    let mut document = ready(form);
    let roots = document.controls().roots.as_ptr();
    document.tracker_mut().clear_history();

    let outcome = click(&mut document, "redraw");
    assert!(outcome.updates.is_empty());
    assert_eq!(document.tracker().performed("order"), vec![Phase::Refresh]);
    assert!(!document.tracker().is_stale("order", Phase::Refresh));
    assert_eq!(document.controls().roots.as_ptr(), roots);
}
