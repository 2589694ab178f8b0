pub mod ports;
pub mod validate_use_case;
