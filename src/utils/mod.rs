pub mod content_guard;
pub mod document_intelligence;
pub mod extract;
pub mod url_validator;
