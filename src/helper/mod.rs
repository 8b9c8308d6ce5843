pub mod content_helpers;
pub mod email_helpers;
pub mod form_helpers;
pub mod sanitization_helpers;
pub mod slug_helpers;
pub mod validation_helpers;
