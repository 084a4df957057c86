use script_scene::domain::{ScriptDomain, WorldCommand};
use script_scene::Entity;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_script(contents: &str) -> NamedTempFile {
    let mut temp = NamedTempFile::new().expect("temp script");
    write!(temp, "{contents}").expect("write script");
    temp
}

fn loaded_domain(contents: &str) -> (NamedTempFile, ScriptDomain) {
    let script = write_script(contents);
    let mut domain = ScriptDomain::new();
    domain.load(script.path()).expect("assembly should load");
    (script, domain)
}

#[test]
fn absent_hooks_are_not_errors() {
    let (_script, mut domain) = loaded_domain(
        r#"
            const Idle = #{ base: "Component" };
        "#,
    );
    let handle = domain.create_object("Idle").expect("instantiate Idle");
    assert!(!domain.has_method(handle, "update", 1));
    assert!(!domain.try_call(handle, "update", (0.016_f64,)));
}

#[test]
fn hooks_match_on_name_and_exact_arity() {
    let (_script, mut domain) = loaded_domain(
        r#"
            fn greeter_speak() { this.spoke = true; }
            const Greeter = #{ base: "Component", spoke: false, speak: Fn("greeter_speak") };
        "#,
    );
    let handle = domain.create_object("Greeter").expect("instantiate Greeter");
    assert!(domain.has_method(handle, "speak", 0));
    assert!(!domain.has_method(handle, "speak", 1));

    assert!(domain.try_call(handle, "speak", ()));
    assert!(!domain.try_call(handle, "speak", (1.0_f64,)), "wrong arity is treated as absent");
}

#[test]
fn dangling_function_pointers_are_treated_as_absent() {
    let (_script, mut domain) = loaded_domain(
        r#"
            const Ghost = #{ base: "Component", update: Fn("no_such_fn") };
        "#,
    );
    let handle = domain.create_object("Ghost").expect("instantiate Ghost");
    assert!(!domain.has_method(handle, "update", 1));
    assert!(!domain.try_call(handle, "update", (0.016_f64,)));
}

#[test]
fn raised_errors_are_captured_and_reported_as_failure() {
    let (_script, mut domain) = loaded_domain(
        r#"
            fn bomb_tick() { throw "boom"; }
            const Bomb = #{ base: "Component", tick: Fn("bomb_tick") };
        "#,
    );
    let handle = domain.create_object("Bomb").expect("instantiate Bomb");
    assert!(domain.has_method(handle, "tick", 0));
    assert!(!domain.try_call(handle, "tick", ()));
    // The object is still alive and callable afterwards.
    assert!(!domain.try_call(handle, "tick", ()));
}

#[test]
fn unknown_classes_do_not_instantiate() {
    let (_script, mut domain) = loaded_domain(
        r#"
            const Known = #{ base: "Component" };
        "#,
    );
    assert!(domain.create_object("Unknown").is_none());
    assert_eq!(domain.live_objects(), 0);
}

#[test]
fn mirror_binding_exposes_entity_and_world_to_hooks() {
    let (_script, mut domain) = loaded_domain(
        r#"
            fn pinger_ping() {
                this.entity.universe.set_position(this.entity.native, 4.0, 5.0, 6.0);
            }
            const Pinger = #{ base: "Component", ping: Fn("pinger_ping") };
        "#,
    );
    let instance = domain.create_object("Pinger").expect("instantiate Pinger");
    let mirror = domain.create_entity_mirror(Entity(42));
    domain.bind_entity(instance, mirror);

    assert!(domain.try_call(instance, "ping", ()));
    let commands = domain.drain_commands();
    assert_eq!(commands.len(), 1);
    let WorldCommand::SetPosition { entity, position } = commands[0];
    assert_eq!(entity, Entity(42));
    assert_eq!((position.x, position.y, position.z), (4.0, 5.0, 6.0));

    assert!(domain.drain_commands().is_empty(), "commands drain exactly once");
}

#[test]
fn instance_state_survives_between_calls() {
    let (_script, mut domain) = loaded_domain(
        r#"
            fn counter_bump() { this.count += 1; this.count }
            const Counter = #{ base: "Component", count: 0, bump: Fn("counter_bump") };
        "#,
    );
    let a = domain.create_object("Counter").expect("instantiate Counter");
    let b = domain.create_object("Counter").expect("instantiate Counter");
    assert!(domain.try_call(a, "bump", ()));
    assert!(domain.try_call(a, "bump", ()));
    assert!(domain.try_call(b, "bump", ()));
    // Instances are independent clones of the class template; releasing one
    // leaves the other untouched.
    domain.release_object(a);
    assert!(domain.try_call(b, "bump", ()));
    assert_eq!(domain.live_objects(), 1);
}
