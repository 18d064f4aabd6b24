use arcade_runtime::renderer::{DrawCommand, RecordingRenderer};
use arcade_runtime::scripts::{InstanceState, ScriptError, VmHost};
use arcade_runtime::variant::{FunctionCall, Variant};
use glam::{Vec2, Vec4};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_script(contents: &str) -> NamedTempFile {
    let mut temp = NamedTempFile::new().expect("temp script");
    write!(temp, "{contents}").expect("write script");
    temp
}

fn started_host() -> VmHost {
    let mut host = VmHost::default();
    host.initialize().expect("init VM");
    host
}

const COUNTER_SCRIPT: &str = r#"
function init()
    counter = 0
end

function think(elapsed, delta)
    counter = counter + delta
end

function get_counter()
    return counter
end
"#;

#[test]
fn think_accumulates_instance_state() {
    let script = write_script(COUNTER_SCRIPT);
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    assert_eq!(instance.state(), InstanceState::Live);
    for _ in 0..3 {
        assert!(instance.think(1.0, 0.016));
    }
    let results = instance.invoke(&FunctionCall::new("get_counter")).expect("get_counter");
    let counter = results[0].to_f64().expect("numeric counter");
    assert!((counter - 0.048).abs() < 1e-9, "counter was {counter}");
    let field = instance.field("counter").expect("field").to_f64().expect("numeric field");
    assert!((field - 0.048).abs() < 1e-9);
}

#[test]
fn failing_think_does_not_poison_the_instance() {
    let script = write_script(
        r#"
function think(elapsed, delta)
    error("think exploded")
end

function reset()
    cleared = true
end
"#,
    );
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    assert!(!instance.think(0.0, 0.016));
    assert!(instance.reset());
    assert_eq!(instance.field("cleared").expect("field"), Variant::Boolean(true));
    assert_eq!(instance.state(), InstanceState::Live);
}

#[test]
fn absent_functions_are_reported_by_the_generic_call_only() {
    let script = write_script("function init() ready = 1 end");
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");

    assert!(!instance.call_function(&FunctionCall::new("missing").arg(1_i64)));
    let err = instance.invoke(&FunctionCall::new("missing")).expect_err("not defined");
    assert!(matches!(err, ScriptError::FunctionNotDefined(ref name) if name == "missing"));
    assert!(instance.think(0.0, 0.0), "missing lifecycle hooks are skipped");
    assert!(instance.reset());

    let mut renderer = RecordingRenderer::new(Vec2::new(8.0, 8.0));
    assert!(instance.render(&mut renderer));
    assert!(renderer.commands().is_empty());
    assert_eq!(instance.field("ready").expect("field"), Variant::SignedInt(1));
}

#[test]
fn generic_calls_marshal_arguments_in_order() {
    let script = write_script(
        r#"
function describe(flag, count, ratio, name, nothing)
    return type(flag), count * 2, ratio, name .. "!", nothing == nil
end
"#,
    );
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    let call = FunctionCall::new("describe").arg(true).arg(21_u64).arg(0.25).arg("ship").arg(Variant::None);
    let results = instance.invoke(&call).expect("describe");
    assert_eq!(
        results,
        vec![
            Variant::from("boolean"),
            Variant::SignedInt(42),
            Variant::Double(0.25),
            Variant::from("ship!"),
            Variant::Boolean(true),
        ]
    );
    assert!(instance.call_function(&call));
}

#[test]
fn instances_of_one_class_keep_separate_state() {
    let script = write_script(COUNTER_SCRIPT);
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let first = host.create_instance(&class).expect("first");
    let second = host.create_instance(&class).expect("second");
    assert_ne!(first.id(), second.id());

    first.think(0.0, 1.0);
    first.think(0.0, 1.0);
    second.think(0.0, 0.5);
    first.think(0.0, 1.0);

    assert_eq!(first.field("counter").expect("first").to_f64(), Some(3.0));
    assert_eq!(second.field("counter").expect("second").to_f64(), Some(0.5));
}

#[test]
fn game_refers_to_the_instance_table() {
    let script = write_script(
        r#"
function init()
    game.lives = 3
end

function lose()
    lives = lives - 1
    return game.lives
end
"#,
    );
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    let results = instance.invoke(&FunctionCall::new("lose")).expect("lose");
    assert_eq!(results, vec![Variant::SignedInt(2)]);
}

#[test]
fn instance_state_does_not_leak_into_globals() {
    let script = write_script("function init() score = 5 end\nfunction peek() return rawget(_G, 'score') end");
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    assert_eq!(instance.field("score").expect("field"), Variant::SignedInt(5));
    let results = instance.invoke(&FunctionCall::new("peek")).expect("peek");
    assert_eq!(results, vec![Variant::None]);
}

#[test]
fn render_binds_the_renderer_for_the_call_only() {
    let script = write_script(
        r#"
function draw()
    gfx.color(0, 1, 0)
    local w, h = renderer:viewport()
    gfx.rect(0, 0, w, h)
    renderer:line(0, 0, w, h, 2)
end

function draw_late()
    gfx.rect(0, 0, 1, 1)
end

function has_renderer()
    return renderer ~= nil
end
"#,
    );
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    let mut renderer = RecordingRenderer::new(Vec2::new(640.0, 360.0));

    assert!(instance.render(&mut renderer));
    let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
    assert_eq!(
        renderer.commands(),
        &[
            DrawCommand::rect(Vec2::ZERO, Vec2::new(640.0, 360.0), green),
            DrawCommand::line(Vec2::ZERO, Vec2::new(640.0, 360.0), 2.0, green),
        ]
    );

    assert_eq!(instance.invoke(&FunctionCall::new("has_renderer")).expect("has_renderer"), vec![Variant::Boolean(false)]);
    let err = instance.invoke(&FunctionCall::new("draw_late")).expect_err("no renderer outside render");
    assert!(err.to_string().contains("outside of render"), "{err}");
}

#[test]
fn failing_draw_reports_false_and_clears_binding() {
    let script = write_script(
        r#"
function draw()
    gfx.clear(0, 0, 0)
    error("draw failed")
end

function has_renderer()
    return renderer ~= nil
end
"#,
    );
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    let mut renderer = RecordingRenderer::new(Vec2::ONE);
    assert!(!instance.render(&mut renderer));
    assert_eq!(renderer.commands().len(), 1);
    assert_eq!(instance.invoke(&FunctionCall::new("has_renderer")).expect("has_renderer"), vec![Variant::Boolean(false)]);
}

#[test]
fn failing_init_still_creates_a_live_instance() {
    let script = write_script("function init() error('no init') end\nfunction ping() return 1 end");
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance despite init failure");
    assert_eq!(instance.state(), InstanceState::Live);
    assert!(instance.call_function(&FunctionCall::new("ping")));
}

#[test]
fn destroyed_instances_reject_calls() {
    let script = write_script(COUNTER_SCRIPT);
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let mut instance = host.create_instance(&class).expect("instance");
    instance.destroy();
    assert_eq!(instance.state(), InstanceState::Destroyed);
    assert!(!instance.think(0.0, 0.1));
    assert!(matches!(instance.invoke(&FunctionCall::new("get_counter")), Err(ScriptError::InstanceDestroyed)));
    instance.destroy();

    let other = host.create_instance(&class).expect("class still usable");
    host.destroy_instance(other);
}

#[test]
fn unloaded_classes_cannot_be_instantiated() {
    let script = write_script("function init() end\nvalue = 1\n");
    let mut host = started_host();
    assert!(host.load_or_get_class(script.path()).is_err());
    let class = host.cached_class(script.path()).expect("cached");
    assert!(matches!(host.create_instance(&class), Err(ScriptError::ClassNotLoaded(_))));
}

#[test]
fn shutdown_invalidates_live_instances() {
    let script = write_script(COUNTER_SCRIPT);
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    host.shutdown();
    assert!(!instance.think(0.0, 0.1));
    assert!(matches!(instance.invoke(&FunctionCall::new("get_counter")), Err(ScriptError::VmShutDown)));
}

#[test]
fn reload_refreshes_functions_and_keeps_state() {
    let script = write_script(COUNTER_SCRIPT);
    let mut host = started_host();
    let class = host.load_or_get_class(script.path()).expect("load");
    let instance = host.create_instance(&class).expect("instance");
    instance.think(0.0, 1.0);

    std::fs::write(
        script.path(),
        "function think(elapsed, delta) counter = counter + delta * 10 end\nfunction doubled() return counter * 2 end",
    )
    .expect("rewrite");
    assert!(class.reload_if_changed().expect("reload"));
    assert!(instance.think(0.0, 1.0));
    assert_eq!(instance.field("counter").expect("field").to_f64(), Some(11.0));
    assert_eq!(instance.invoke(&FunctionCall::new("doubled")).expect("new function"), vec![Variant::SignedInt(22)]);
    assert_eq!(instance.field("get_counter").expect("stale copy removed"), Variant::None);
}
