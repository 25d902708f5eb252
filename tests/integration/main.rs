mod fixture;

mod apply_tests;
mod migration_tests;
mod replay_tests;
mod uninstall_tests;
