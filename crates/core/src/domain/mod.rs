pub mod dispatch;
pub mod quotation;
pub mod score;
pub mod session;
pub mod template;
pub mod vendor;
