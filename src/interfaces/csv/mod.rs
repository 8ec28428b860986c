pub mod cart_writer;
pub mod script_reader;
pub mod script_runner;
