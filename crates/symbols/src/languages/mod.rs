mod ecma;
mod python;
mod rust;

pub use ecma::EcmaExtractor;
pub use python::PythonExtractor;
pub use rust::RustExtractor;
