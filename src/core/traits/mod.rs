pub mod interpreter;
pub mod invoker;
