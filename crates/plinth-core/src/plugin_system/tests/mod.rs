mod common;
mod metadata_tests;
mod static_tests;
