pub mod service_process;
pub mod table;
pub mod types;
