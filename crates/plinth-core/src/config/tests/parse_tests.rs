use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use crate::config::{Configuration, ConfigurationFlags};

const PARSE_CONF: &str = "\
# Test configuration file

key=value
key2=value2

[group]
a=1
b=2

[group]
c=value4
c=value5

[empty_group]

[third_group]
x=yes
";

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("Failed to write fixture");
    path
}

#[test]
fn test_parse_structure() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = write_fixture(&dir, "parse.conf", PARSE_CONF);

    let conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.is_valid());

    // Groups
    assert_eq!(conf.group_count(), 4);
    assert_eq!(conf.group_count_of("group"), 2);
    assert_eq!(conf.group_count_of("empty_group"), 1);
    assert!(!conf.group_exists("group_inexistent"));
    assert_eq!(conf.groups("group").len(), 2);

    // Keys
    assert_eq!(conf.get::<String>("key"), "value");
    let second = conf.group_at("group", 1).expect("second group is present");
    assert_eq!(second.raw("c", 1), Some("value5"));
    assert_eq!(second.values::<String>("c"), vec!["value4", "value5"]);

    assert!(conf.key_exists("key"));
    assert!(!conf.key_exists("key_inexistent"));
}

#[test]
fn test_unmodified_round_trip_is_byte_exact() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = write_fixture(&dir, "parse.conf", PARSE_CONF);

    let conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.is_valid());
    assert!(conf.save());

    let resaved = fs::read_to_string(&path).expect("Failed to read saved file");
    assert_eq!(resaved, PARSE_CONF);
}

#[test]
fn test_modified_save() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = write_fixture(&dir, "parse.conf", PARSE_CONF);

    let mut conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.add_value("new", &String::from("value"), Default::default()));
    assert!(conf.remove_all_groups("group"));
    assert!(conf.group_mut("third_group").expect("third_group is present").clear());
    assert!(conf.remove_group("empty_group", 0));
    assert!(conf.add_group("new_group").is_some());
    assert!(conf
        .group_mut("new_group")
        .expect("new_group was just added")
        .add_value("another", &String::from("value"), Default::default()));
    assert!(conf.remove_all_values("key"));
    assert!(conf.save());

    let expected = "\
# Test configuration file

key2=value2

new=value
[third_group]
[new_group]
another=value
";
    let actual = fs::read_to_string(&path).expect("Failed to read saved file");
    assert_eq!(actual, expected);
}

#[test]
fn test_write_idempotence() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = write_fixture(&dir, "parse.conf", PARSE_CONF);

    let mut conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.set_value("key", &String::from("changed"), 0, Default::default()));
    assert!(conf.add_group("appended").is_some());
    assert!(conf
        .group_mut("appended")
        .expect("appended was just added")
        .add_value("k", &7i32, Default::default()));
    assert!(conf.save());
    let first = fs::read_to_string(&path).expect("Failed to read saved file");

    // Parsing the saved output and saving again must not change a byte.
    let conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.save());
    let second = fs::read_to_string(&path).expect("Failed to read saved file");
    assert_eq!(first, second);
}

#[test]
fn test_missing_file_is_valid_and_created_on_save() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("new.conf");

    let mut conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.is_valid());
    assert!(conf.save());
    assert!(path.exists());

    assert!(conf.add_value("key", &String::from("value"), Default::default()));
    assert!(conf.save());
    assert_eq!(
        fs::read_to_string(&path).expect("Failed to read saved file"),
        "key=value\n"
    );
}

#[test]
fn test_whitespace_around_equals_is_preserved() {
    let dir = tempdir().expect("Failed to create temp directory");
    let contents = "key = value\nspaced   =   wide\n";
    let path = write_fixture(&dir, "whitespace.conf", contents);

    let conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.is_valid());
    assert_eq!(conf.get::<String>("key"), "value");
    assert_eq!(conf.get::<String>("spaced"), "wide");
    assert!(conf.save());
    assert_eq!(
        fs::read_to_string(&path).expect("Failed to read saved file"),
        contents
    );
}

#[test]
fn test_no_final_newline_round_trip() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = write_fixture(&dir, "nonl.conf", "key=value");

    let conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(conf.is_valid());
    assert!(conf.save());
    assert_eq!(
        fs::read_to_string(&path).expect("Failed to read saved file"),
        "key=value"
    );
}

#[test]
fn test_in_memory_source_is_read_only() {
    let conf = Configuration::from_text("[group]\nkey=value");
    assert!(conf.is_valid());
    assert_eq!(
        conf.group("group").expect("group is present").get::<String>("key"),
        "value"
    );

    let mut conf = conf;
    assert!(!conf.add_value("key2", &String::from("value2"), Default::default()));
    assert!(conf.add_group("another").is_none());
    assert!(!conf.save());
}

#[test]
fn test_quoted_values() {
    let conf = Configuration::from_text("quotes=\" value \"\nescaped=\"a \\\"b\\\" c\"\nplain=  spaced out  ");
    assert!(conf.is_valid());
    assert_eq!(conf.get::<String>("quotes"), " value ");
    assert_eq!(conf.get::<String>("escaped"), "a \"b\" c");
    // Unquoted values lose surrounding whitespace only.
    assert_eq!(conf.get::<String>("plain"), "spaced out");
}

#[test]
fn test_unparseable_line_drops_group_and_invalidates() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = write_fixture(&dir, "invalid.conf", "[group]\nkey=value\n]\n[other]\na=1\n");

    let mut conf = Configuration::open(&path, ConfigurationFlags::empty());
    assert!(!conf.is_valid());
    let error = conf.parse_error().expect("parse error is recorded");
    assert_eq!(error.line, 3);

    // The whole enclosing group is dropped, later groups survive.
    assert_eq!(conf.group_count_of("group"), 0);
    assert_eq!(conf.group_count_of("other"), 1);

    // Everything mutating is disabled.
    assert!(conf.add_group("new").is_none());
    assert!(!conf.remove_all_groups("other"));
    assert!(!conf.add_value("new", &String::from("value"), Default::default()));
    assert!(!conf.save());
}

#[test]
fn test_unreadable_file_is_invalid_and_empty() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("inexistent.conf");

    let conf = Configuration::open(&path, ConfigurationFlags::READ_ONLY);
    assert!(!conf.is_valid());
    assert_eq!(conf.group_count(), 0);
    assert_eq!(conf.get::<String>("anything"), "");
    assert!(!conf.save());
}
