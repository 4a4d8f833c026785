pub mod binary;
pub mod digest;
pub mod json;
pub mod sanitizer;
pub mod serializer;
pub mod value;
