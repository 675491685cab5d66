pub mod earthengine;
pub mod global_variables;
