mod support;

mod init_data_tests;
mod terminal_tests;
