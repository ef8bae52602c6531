use super::common::{destroy_instance, registering_instancer, TestEnv};
use crate::plugin_system::{
    register_static_plugin, LoadState, StaticPluginRegistration, PLUGIN_VERSION,
};

#[test]
fn test_static_plugin_lifecycle_is_inert() {
    const IFACE: &str = "test.static.inert/1";
    register_static_plugin(StaticPluginRegistration {
        name: "static_inert",
        interface: IFACE,
        version: PLUGIN_VERSION,
        instancer: registering_instancer,
        metadata: "description=statically linked\n",
    });

    let env = TestEnv::new();
    let mut manager = env.manager(IFACE);
    assert!(manager.plugin_list().contains(&"static_inert".to_string()));
    assert_eq!(manager.load_state("static_inert"), LoadState::IsStatic);

    // Any sequence of load/unload/reload stays IsStatic and mutates
    // nothing.
    for _ in 0..3 {
        assert_eq!(manager.load("static_inert"), LoadState::IsStatic);
        assert_eq!(manager.unload("static_inert"), LoadState::IsStatic);
        assert_eq!(manager.reload("static_inert"), LoadState::IsStatic);
    }
}

#[test]
fn test_static_plugin_metadata_and_instances() {
    const IFACE: &str = "test.static.instances/1";
    register_static_plugin(StaticPluginRegistration {
        name: "static_instanced",
        interface: IFACE,
        version: PLUGIN_VERSION,
        instancer: registering_instancer,
        metadata: "depends=static_dep\nauthor=nobody\n",
    });

    let env = TestEnv::new();
    let mut manager = env.manager(IFACE);

    let metadata = manager.metadata("static_instanced").expect("metadata is present");
    assert_eq!(metadata.depends(), ["static_dep"]);
    assert_eq!(metadata.author(), Some("nobody"));

    // Instances of static plugins register like dynamic ones; unload stays
    // a no-op either way.
    let instance = manager
        .instantiate("static_instanced")
        .expect("instancer produces an instance");
    assert_eq!(manager.unload("static_instanced"), LoadState::IsStatic);
    destroy_instance(&manager, "static_instanced", instance);
    assert_eq!(manager.unload("static_instanced"), LoadState::IsStatic);
}

#[test]
fn test_static_registration_with_wrong_version_is_skipped() {
    const IFACE: &str = "test.static.version/1";
    register_static_plugin(StaticPluginRegistration {
        name: "static_wrong_version",
        interface: IFACE,
        version: PLUGIN_VERSION + 7,
        instancer: registering_instancer,
        metadata: "",
    });

    let env = TestEnv::new();
    let manager = env.manager(IFACE);
    assert!(!manager.plugin_list().contains(&"static_wrong_version".to_string()));
    assert_eq!(manager.load_state("static_wrong_version"), LoadState::NotFound);
}

#[test]
fn test_dynamic_name_collision_with_static_is_skipped() {
    const IFACE: &str = "test.static.collision/1";
    register_static_plugin(StaticPluginRegistration {
        name: "static_collider",
        interface: IFACE,
        version: PLUGIN_VERSION,
        instancer: registering_instancer,
        metadata: "",
    });

    let env = TestEnv::new();
    // A dynamic plugin of the same name sits in the directory.
    env.add_plugin("static_collider", IFACE, "description=dynamic impostor\n");

    let mut manager = env.manager(IFACE);
    assert_eq!(manager.load_state("static_collider"), LoadState::IsStatic);
    assert_eq!(manager.load("static_collider"), LoadState::IsStatic);
    let metadata = manager.metadata("static_collider").expect("metadata is present");
    assert_eq!(metadata.description(), None);
}

#[test]
fn test_static_record_survives_manager_drop() {
    const IFACE: &str = "test.static.survive/1";
    register_static_plugin(StaticPluginRegistration {
        name: "static_survivor",
        interface: IFACE,
        version: PLUGIN_VERSION,
        instancer: registering_instancer,
        metadata: "",
    });

    let env = TestEnv::new();
    {
        let manager = env.manager(IFACE);
        assert_eq!(manager.load_state("static_survivor"), LoadState::IsStatic);
    }
    // Records of static plugins persist for the process lifetime; the next
    // manager with the interface claims the record again.
    let manager = env.manager(IFACE);
    assert_eq!(manager.load_state("static_survivor"), LoadState::IsStatic);
    assert!(manager.plugin_list().contains(&"static_survivor".to_string()));
}
