pub mod cli;
pub mod config;
pub mod launcher;
pub mod parser;
pub mod probe;
pub mod validator;

pub fn get_version() -> String {
    "0.1.0".to_string()
}
