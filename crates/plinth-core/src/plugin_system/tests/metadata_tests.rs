use crate::config::Configuration;
use crate::plugin_system::PluginMetadata;

#[test]
fn test_metadata_from_configuration() {
    let configuration = Configuration::from_text(
        "# plugin metadata\n\
         depends=first\n\
         depends=second\n\
         replaces=legacy\n\
         conflicts=enemy\n\
         description=A plugin that does things\n\
         author=Somebody\n\
         custom=untouched\n",
    );
    let metadata = PluginMetadata::from_configuration(&configuration);

    assert_eq!(metadata.depends(), ["first", "second"]);
    assert_eq!(metadata.replaces(), ["legacy"]);
    assert_eq!(metadata.conflicts(), ["enemy"]);
    assert_eq!(metadata.description(), Some("A plugin that does things"));
    assert_eq!(metadata.author(), Some("Somebody"));
}

#[test]
fn test_metadata_defaults() {
    let configuration = Configuration::from_text("");
    let metadata = PluginMetadata::from_configuration(&configuration);

    assert!(metadata.depends().is_empty());
    assert!(metadata.replaces().is_empty());
    assert!(metadata.conflicts().is_empty());
    assert_eq!(metadata.description(), None);
    assert_eq!(metadata.author(), None);
}
