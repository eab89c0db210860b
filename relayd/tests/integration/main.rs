mod cli_tests;
mod common;
mod server_tests;
mod update_tests;
