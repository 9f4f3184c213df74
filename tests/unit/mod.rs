mod admission_tests;
mod common;
mod config_tests;
mod lookup_tests;
mod snapshot_restore_tests;
