/// Invokers that run submissions as sandboxed child processes:
/// Node for JavaScript/TypeScript and a bootstrapped CPython for Python.
pub mod node;
pub mod python;
pub mod sandbox;
